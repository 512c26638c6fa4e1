pub mod adb;
pub mod simulator;

use async_trait::async_trait;
use thiserror::Error;

use crate::error::AgentError;
use crate::schema::DeviceAction;
use crate::ui_tree::UiTree;

pub use adb::{AdbConnector, AdbSession};
pub use simulator::{SimFaults, SimulatedDevice, SimulatorConnector};

#[derive(Error, Debug)]
pub enum DeviceError {
    /// The device is gone; nothing further can be done on it.
    #[error("device disconnected: {0}")]
    Disconnected(String),

    #[error("command `{command}` failed: {detail}")]
    CommandFailed { command: String, detail: String },

    #[error("command `{command}` timed out after {timeout_ms}ms")]
    TimedOut { command: String, timeout_ms: u64 },

    #[error("failed to spawn adb: {0}")]
    Spawn(#[from] std::io::Error),
}

impl DeviceError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, DeviceError::Disconnected(_) | DeviceError::Spawn(_))
    }
}

/// One connected device. Owned by the navigator for the whole run.
#[async_trait]
pub trait DeviceSession: Send {
    fn serial(&self) -> &str;

    async fn execute(&mut self, action: &DeviceAction) -> Result<(), DeviceError>;

    async fn dump_ui(&mut self) -> Result<UiTree, DeviceError>;
}

#[async_trait]
pub trait Connector: Sync {
    type Session: DeviceSession;

    /// Open a session to `serial`, or the only attached device when `None`.
    async fn connect(&self, serial: Option<&str>) -> Result<Self::Session, AgentError>;
}
