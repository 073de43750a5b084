//! Gateway error types.

use cangw_core::error::WireError;

/// Errors surfaced by the delivery backend.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("receive registration failed: {0}")]
    Register(&'static str),

    #[error("send failed on interface {0}")]
    Send(u32),
}

/// The job table is at capacity.
#[derive(Debug, thiserror::Error)]
#[error("job table full: capacity {0}")]
pub struct TableFull(pub usize);

/// Errors returned to the configuration channel.
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error("protocol family {0} not supported")]
    ProtocolFamilyNotSupported(u16),

    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    #[error(transparent)]
    OutOfMemory(#[from] TableFull),

    #[error("no device with interface index {0}")]
    NoSuchDevice(u32),

    #[error("interface index {0} is not a CAN device")]
    NotACanDevice(u32),

    #[error(transparent)]
    Wire(#[from] WireError),

    #[error("dump buffer too small for next record")]
    DumpBufferFull,

    #[error(transparent)]
    Delivery(#[from] DeliveryError),
}
