use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Device connection error: {0}")]
    Connection(String),

    #[error("Input error: {0}")]
    Input(#[from] InputError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Problems with the numbers/content files. Each maps to its own exit code.
#[derive(Error, Debug)]
pub enum InputError {
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no valid phone numbers in {}", .0.display())]
    NoValidNumbers(PathBuf),

    #[error("content file is empty: {}", .0.display())]
    EmptyContent(PathBuf),
}

impl InputError {
    pub fn exit_code(&self) -> u8 {
        match self {
            InputError::FileNotFound(_) | InputError::Read { .. } => 1,
            InputError::NoValidNumbers(_) => 2,
            InputError::EmptyContent(_) => 3,
        }
    }
}

pub type Result<T> = std::result::Result<T, AgentError>;
