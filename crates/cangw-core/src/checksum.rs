//! Payload checksum recomputation.
//!
//! A job may carry an XOR and/or a CRC8 checksum spec; after a non-empty
//! modification program ran, the enabled specs recompute a checksum byte
//! over a payload range and store it back into the payload.
//!
//! Range indices are signed: `0..=7` address the payload absolutely,
//! `-8..=-1` are relative to the received frame's DLC (`-1` is the last
//! significant byte). The walk is inclusive over `[min, max]` of the two
//! resolved endpoints; equal endpoints cover a single byte. A resolved
//! index outside the payload skips the update for that frame.

use crate::constants::CAN_MAX_DLEN;
use crate::frame::CanFrame;

/// Sentinel in `from_idx` marking a checksum spec as disabled.
pub const CS_DISABLED: i8 = 42;

/// Validate the signed index range of a checksum spec at install time.
#[must_use]
pub fn indices_valid(from: i8, to: i8, result: i8) -> bool {
    let in_range = |i: i8| (-8..8).contains(&i);
    in_range(from) && in_range(to) && in_range(result)
}

/// Resolve a signed index against the frame's DLC.
///
/// Returns `None` when the resolved position falls outside the payload
/// (possible for DLC-relative indices on short frames).
#[must_use]
pub fn resolve_idx(idx: i8, dlc: u8) -> Option<usize> {
    let pos = if idx < 0 {
        i16::from(dlc) + i16::from(idx)
    } else {
        i16::from(idx)
    };
    (0..CAN_MAX_DLEN as i16)
        .contains(&pos)
        .then_some(pos as usize)
}

/// XOR checksum spec: fold `init ^ data[from..=to]` into `data[result]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XorChecksum {
    pub from_idx: i8,
    pub to_idx: i8,
    pub result_idx: i8,
    pub init_xor_val: u8,
}

impl XorChecksum {
    #[must_use]
    pub fn enabled(&self) -> bool {
        self.from_idx != CS_DISABLED
    }

    /// Recompute the checksum byte over the frame's payload.
    pub fn apply(&self, cf: &mut CanFrame) {
        let (Some(from), Some(to), Some(result)) = (
            resolve_idx(self.from_idx, cf.can_dlc),
            resolve_idx(self.to_idx, cf.can_dlc),
            resolve_idx(self.result_idx, cf.can_dlc),
        ) else {
            return;
        };
        let (lo, hi) = (from.min(to), from.max(to));
        let mut acc = self.init_xor_val;
        for byte in &cf.data[lo..=hi] {
            acc ^= byte;
        }
        cf.data[result] = acc;
    }
}

impl Default for XorChecksum {
    fn default() -> Self {
        Self {
            from_idx: CS_DISABLED,
            to_idx: 0,
            result_idx: 0,
            init_xor_val: 0,
        }
    }
}

/// CRC8 profile: an optional extension folded into the running CRC
/// before the payload walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Crc8Profile {
    /// No extension.
    Unspec,
    /// XOR a configured byte into the running CRC.
    XorValue(u8),
    /// XOR the frame's DLC into the running CRC.
    XorDlc,
}

/// Table-driven CRC8 spec over a payload range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Crc8Checksum {
    pub from_idx: i8,
    pub to_idx: i8,
    pub result_idx: i8,
    pub init_crc_val: u8,
    pub final_xor_val: u8,
    pub crctab: [u8; 256],
    pub profile: Crc8Profile,
}

impl Crc8Checksum {
    #[must_use]
    pub fn enabled(&self) -> bool {
        self.from_idx != CS_DISABLED
    }

    /// Recompute the CRC byte over the frame's payload.
    pub fn apply(&self, cf: &mut CanFrame) {
        let (Some(from), Some(to), Some(result)) = (
            resolve_idx(self.from_idx, cf.can_dlc),
            resolve_idx(self.to_idx, cf.can_dlc),
            resolve_idx(self.result_idx, cf.can_dlc),
        ) else {
            return;
        };
        let mut crc = self.init_crc_val;
        match self.profile {
            Crc8Profile::Unspec => {}
            Crc8Profile::XorValue(v) => crc ^= v,
            Crc8Profile::XorDlc => crc ^= cf.can_dlc,
        }
        let (lo, hi) = (from.min(to), from.max(to));
        for &byte in &cf.data[lo..=hi] {
            crc = self.crctab[usize::from(crc ^ byte)];
        }
        cf.data[result] = crc ^ self.final_xor_val;
    }
}

impl Default for Crc8Checksum {
    fn default() -> Self {
        Self {
            from_idx: CS_DISABLED,
            to_idx: 0,
            result_idx: 0,
            init_crc_val: 0,
            final_xor_val: 0,
            crctab: [0; 256],
            profile: Crc8Profile::Unspec,
        }
    }
}

/// The pair of independently enabled checksum specs carried by a job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChecksumSpecs {
    pub xor: XorChecksum,
    pub crc8: Crc8Checksum,
}

/// Generate the lookup table for a CRC8 polynomial (MSB-first).
#[must_use]
pub fn crc8_table(poly: u8) -> [u8; 256] {
    let mut tab = [0u8; 256];
    for (i, entry) in tab.iter_mut().enumerate() {
        let mut crc = i as u8;
        for _ in 0..8 {
            crc = if crc & 0x80 != 0 {
                (crc << 1) ^ poly
            } else {
                crc << 1
            };
        }
        *entry = crc;
    }
    tab
}
