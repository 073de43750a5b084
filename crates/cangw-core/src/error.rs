//! Error types for frame construction and the configuration wire format.

/// Errors constructing CAN frame values.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("payload too long: {0} bytes (classical CAN carries at most 8)")]
    PayloadTooLong(usize),
}

/// Errors decoding configuration channel messages.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("message too small: need {min} bytes, got {actual}")]
    MessageTooSmall { min: usize, actual: usize },

    #[error("truncated attribute: header says {claimed} payload bytes but {remaining} remain")]
    TruncatedAttribute { claimed: usize, remaining: usize },
}
