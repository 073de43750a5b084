//! CAN frame and receive filter value types.

use crate::constants::CAN_MAX_DLEN;
use crate::error::FrameError;

/// A classical CAN frame: identifier word, data-length code, and an
/// 8-byte payload of which the low `can_dlc` bytes are significant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CanFrame {
    /// Identifier plus format/flag bits in the upper part of the word.
    pub can_id: u32,
    /// Data-length code, 0..=8.
    pub can_dlc: u8,
    /// Payload storage. Bytes past `can_dlc` are kept zeroed.
    pub data: [u8; CAN_MAX_DLEN],
}

impl CanFrame {
    /// Build a frame from an identifier and payload slice.
    pub fn new(can_id: u32, payload: &[u8]) -> Result<Self, FrameError> {
        if payload.len() > CAN_MAX_DLEN {
            return Err(FrameError::PayloadTooLong(payload.len()));
        }
        let mut data = [0u8; CAN_MAX_DLEN];
        data[..payload.len()].copy_from_slice(payload);
        Ok(Self {
            can_id,
            can_dlc: payload.len() as u8,
            data,
        })
    }

    /// The payload as a single 64-bit word, `data[0]` in the most
    /// significant byte. Bitwise modification operators work on whole
    /// words; the mapping is symmetric so byte lanes never mix.
    #[must_use]
    pub fn data_u64(&self) -> u64 {
        u64::from_be_bytes(self.data)
    }

    /// Store a 64-bit word back into the payload, `data[0]` from the most
    /// significant byte.
    pub fn set_data_u64(&mut self, word: u64) {
        self.data = word.to_be_bytes();
    }
}

/// A receive filter: a frame matches if its masked identifier equals the
/// masked filter identifier. The all-zero filter matches every frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CanFilter {
    pub can_id: u32,
    pub can_mask: u32,
}

impl CanFilter {
    pub const fn new(can_id: u32, can_mask: u32) -> Self {
        Self { can_id, can_mask }
    }

    /// Filter match under receive-list semantics.
    #[must_use]
    pub fn matches(&self, frame: &CanFrame) -> bool {
        (frame.can_id & self.can_mask) == (self.can_id & self.can_mask)
    }

    /// True for the default match-everything filter.
    #[must_use]
    pub fn is_match_all(&self) -> bool {
        self.can_id == 0 && self.can_mask == 0
    }
}
