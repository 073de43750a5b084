//! Binary wire format of the gateway configuration channel.
//!
//! A configuration message is a fixed header followed by a sequence of
//! type-length-value attributes:
//!
//! ```text
//! head:  family(2, BE) || gwtype(1) || pad(1) || flags(2, BE)
//! attr:  tag(1) || length(2, BE) || payload
//! ```
//!
//! Attributes with an unexpected payload length are skipped by typed
//! decoders (they return `None`), matching the tolerant attribute handling
//! of the configuration channel; truncated TLV framing is a hard error.

use crate::checksum::{Crc8Checksum, Crc8Profile, XorChecksum};
use crate::error::WireError;
use crate::frame::{CanFilter, CanFrame};

/// Address family of the CAN routing channel.
pub const AF_CAN: u16 = 29;

/// The only defined gateway type: CAN frames routed to CAN.
pub const GWTYPE_CAN_CAN: u8 = 1;

/// Job flag: request echo of sent frames on the destination interface.
pub const FLAG_ECHO: u16 = 0x0001;

/// Job flag: preserve the receive timestamp on forwarded frames.
pub const FLAG_SRC_TSTAMP: u16 = 0x0002;

/// Payload length of a modification attribute:
/// `modtype(1) || can_id(4) || can_dlc(1) || data(8)`.
pub const MOD_ATTR_LEN: usize = 14;

/// Payload length of an XOR checksum attribute.
pub const CS_XOR_LEN: usize = 4;

/// Payload length of a CRC8 checksum attribute:
/// indices(3) + init(1) + final_xor(1) + table(256) + profile(1) + profile_data(1).
pub const CS_CRC8_LEN: usize = 263;

/// Payload length of a filter attribute.
pub const FILTER_LEN: usize = 8;

/// Attribute tags of the configuration channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AttrTag {
    ModAnd = 1,
    ModOr = 2,
    ModXor = 3,
    ModSet = 4,
    CsumXor = 5,
    CsumCrc8 = 6,
    Filter = 7,
    SrcIf = 8,
    DstIf = 9,
    Handled = 10,
    Dropped = 11,
}

impl AttrTag {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(AttrTag::ModAnd),
            2 => Some(AttrTag::ModOr),
            3 => Some(AttrTag::ModXor),
            4 => Some(AttrTag::ModSet),
            5 => Some(AttrTag::CsumXor),
            6 => Some(AttrTag::CsumCrc8),
            7 => Some(AttrTag::Filter),
            8 => Some(AttrTag::SrcIf),
            9 => Some(AttrTag::DstIf),
            10 => Some(AttrTag::Handled),
            11 => Some(AttrTag::Dropped),
            _ => None,
        }
    }
}

/// The fixed message header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GwMsgHead {
    pub family: u16,
    pub gwtype: u8,
    pub flags: u16,
}

impl GwMsgHead {
    /// Header length on the wire (includes one pad byte).
    pub const LEN: usize = 6;

    /// A CAN-to-CAN header with the given flag bits.
    pub const fn can_can(flags: u16) -> Self {
        Self {
            family: AF_CAN,
            gwtype: GWTYPE_CAN_CAN,
            flags,
        }
    }

    pub fn pack(&self) -> [u8; Self::LEN] {
        let fam = self.family.to_be_bytes();
        let flags = self.flags.to_be_bytes();
        [fam[0], fam[1], self.gwtype, 0, flags[0], flags[1]]
    }

    pub fn unpack(data: &[u8]) -> Result<Self, WireError> {
        if data.len() < Self::LEN {
            return Err(WireError::MessageTooSmall {
                min: Self::LEN,
                actual: data.len(),
            });
        }
        Ok(Self {
            family: u16::from_be_bytes([data[0], data[1]]),
            gwtype: data[2],
            flags: u16::from_be_bytes([data[4], data[5]]),
        })
    }
}

/// Split a message into its header and attribute region.
pub fn parse_head(msg: &[u8]) -> Result<(GwMsgHead, &[u8]), WireError> {
    let head = GwMsgHead::unpack(msg)?;
    Ok((head, &msg[GwMsgHead::LEN..]))
}

/// A raw attribute: tag byte and payload slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawAttr<'a> {
    pub tag: u8,
    pub payload: &'a [u8],
}

/// Iterator over the TLV attribute region of a message.
#[derive(Debug, Clone)]
pub struct Attrs<'a> {
    rest: &'a [u8],
}

impl<'a> Attrs<'a> {
    pub fn new(region: &'a [u8]) -> Self {
        Self { rest: region }
    }
}

impl<'a> Iterator for Attrs<'a> {
    type Item = Result<RawAttr<'a>, WireError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.rest.is_empty() {
            return None;
        }
        if self.rest.len() < 3 {
            let err = WireError::TruncatedAttribute {
                claimed: 3,
                remaining: self.rest.len(),
            };
            self.rest = &[];
            return Some(Err(err));
        }
        let tag = self.rest[0];
        let len = usize::from(u16::from_be_bytes([self.rest[1], self.rest[2]]));
        let body = &self.rest[3..];
        if body.len() < len {
            let err = WireError::TruncatedAttribute {
                claimed: len,
                remaining: body.len(),
            };
            self.rest = &[];
            return Some(Err(err));
        }
        let payload = &body[..len];
        self.rest = &body[len..];
        Some(Ok(RawAttr { tag, payload }))
    }
}

// ---------------------------------------------------------------------------
// Typed payload decoders. `None` means "wrong shape, skip the attribute".
// ---------------------------------------------------------------------------

/// Decode a modification attribute into its field mask byte and template.
pub fn decode_mod(payload: &[u8]) -> Option<(u8, CanFrame)> {
    if payload.len() != MOD_ATTR_LEN {
        return None;
    }
    let modtype = payload[0];
    let can_id = u32::from_be_bytes([payload[1], payload[2], payload[3], payload[4]]);
    let can_dlc = payload[5];
    let mut data = [0u8; 8];
    data.copy_from_slice(&payload[6..14]);
    // Copy the three fields explicitly; nothing else from the message
    // reaches the template.
    Some((
        modtype,
        CanFrame {
            can_id,
            can_dlc,
            data,
        },
    ))
}

pub fn decode_csum_xor(payload: &[u8]) -> Option<XorChecksum> {
    if payload.len() != CS_XOR_LEN {
        return None;
    }
    Some(XorChecksum {
        from_idx: payload[0] as i8,
        to_idx: payload[1] as i8,
        result_idx: payload[2] as i8,
        init_xor_val: payload[3],
    })
}

pub fn decode_csum_crc8(payload: &[u8]) -> Option<Crc8Checksum> {
    if payload.len() != CS_CRC8_LEN {
        return None;
    }
    let mut crctab = [0u8; 256];
    crctab.copy_from_slice(&payload[5..261]);
    Some(Crc8Checksum {
        from_idx: payload[0] as i8,
        to_idx: payload[1] as i8,
        result_idx: payload[2] as i8,
        init_crc_val: payload[3],
        final_xor_val: payload[4],
        crctab,
        profile: decode_profile(payload[261], payload[262]),
    })
}

/// Unknown profile selectors behave as "no extension".
fn decode_profile(selector: u8, data: u8) -> Crc8Profile {
    match selector {
        1 => Crc8Profile::XorValue(data),
        2 => Crc8Profile::XorDlc,
        _ => Crc8Profile::Unspec,
    }
}

fn encode_profile(profile: Crc8Profile) -> (u8, u8) {
    match profile {
        Crc8Profile::Unspec => (0, 0),
        Crc8Profile::XorValue(v) => (1, v),
        Crc8Profile::XorDlc => (2, 0),
    }
}

pub fn decode_filter(payload: &[u8]) -> Option<CanFilter> {
    if payload.len() != FILTER_LEN {
        return None;
    }
    Some(CanFilter {
        can_id: u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]),
        can_mask: u32::from_be_bytes([payload[4], payload[5], payload[6], payload[7]]),
    })
}

pub fn decode_u32(payload: &[u8]) -> Option<u32> {
    let bytes: [u8; 4] = payload.try_into().ok()?;
    Some(u32::from_be_bytes(bytes))
}

// ---------------------------------------------------------------------------
// Message construction.
// ---------------------------------------------------------------------------

/// Builder assembling a header plus attributes into wire bytes.
#[derive(Debug, Clone)]
pub struct GwMessageBuilder {
    buf: Vec<u8>,
}

impl GwMessageBuilder {
    pub fn new(head: GwMsgHead) -> Self {
        let mut buf = Vec::with_capacity(64);
        buf.extend_from_slice(&head.pack());
        Self { buf }
    }

    fn attr(mut self, tag: AttrTag, payload: &[u8]) -> Self {
        self.buf.push(tag as u8);
        self.buf
            .extend_from_slice(&(payload.len() as u16).to_be_bytes());
        self.buf.extend_from_slice(payload);
        self
    }

    /// Append a modification attribute for one operator slot.
    pub fn mod_slot(self, tag: AttrTag, modtype: u8, frame: &CanFrame) -> Self {
        let mut payload = [0u8; MOD_ATTR_LEN];
        payload[0] = modtype;
        payload[1..5].copy_from_slice(&frame.can_id.to_be_bytes());
        payload[5] = frame.can_dlc;
        payload[6..14].copy_from_slice(&frame.data);
        self.attr(tag, &payload)
    }

    pub fn csum_xor(self, spec: &XorChecksum) -> Self {
        let payload = [
            spec.from_idx as u8,
            spec.to_idx as u8,
            spec.result_idx as u8,
            spec.init_xor_val,
        ];
        self.attr(AttrTag::CsumXor, &payload)
    }

    pub fn csum_crc8(self, spec: &Crc8Checksum) -> Self {
        let mut payload = [0u8; CS_CRC8_LEN];
        payload[0] = spec.from_idx as u8;
        payload[1] = spec.to_idx as u8;
        payload[2] = spec.result_idx as u8;
        payload[3] = spec.init_crc_val;
        payload[4] = spec.final_xor_val;
        payload[5..261].copy_from_slice(&spec.crctab);
        let (selector, data) = encode_profile(spec.profile);
        payload[261] = selector;
        payload[262] = data;
        self.attr(AttrTag::CsumCrc8, &payload)
    }

    pub fn filter(self, filter: &CanFilter) -> Self {
        let mut payload = [0u8; FILTER_LEN];
        payload[..4].copy_from_slice(&filter.can_id.to_be_bytes());
        payload[4..].copy_from_slice(&filter.can_mask.to_be_bytes());
        self.attr(AttrTag::Filter, &payload)
    }

    pub fn src_if(self, index: u32) -> Self {
        self.attr(AttrTag::SrcIf, &index.to_be_bytes())
    }

    pub fn dst_if(self, index: u32) -> Self {
        self.attr(AttrTag::DstIf, &index.to_be_bytes())
    }

    pub fn handled(self, count: u32) -> Self {
        self.attr(AttrTag::Handled, &count.to_be_bytes())
    }

    pub fn dropped(self, count: u32) -> Self {
        self.attr(AttrTag::Dropped, &count.to_be_bytes())
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}
