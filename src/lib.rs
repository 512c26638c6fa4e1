pub mod cli;
pub mod config_manager;
pub mod controller;
pub mod device;
pub mod error;
pub mod locator;
pub mod recipients;
pub mod reporter;
pub mod schema;
pub mod selectors;
pub mod ui_tree;
