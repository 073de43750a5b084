//! Error types for the daemon.

use cangw_gateway::ControlError;

/// Errors that can occur while bringing up or running the daemon.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("unknown device name: {0}")]
    UnknownDevice(String),
    #[error("control error: {0}")]
    Control(#[from] ControlError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
