//! Core value types and pure algorithms for the CAN frame gateway.
//!
//! This crate defines the CAN frame and filter model, the frame
//! modification pipeline, payload checksum recomputation, and the binary
//! wire format of the gateway configuration channel. Everything here is
//! synchronous and allocation-light; the routing engine lives in
//! `cangw-gateway`.

pub mod checksum;
pub mod constants;
pub mod error;
pub mod frame;
pub mod modify;
pub mod wire;

pub use checksum::{ChecksumSpecs, Crc8Checksum, Crc8Profile, XorChecksum};
pub use error::{FrameError, WireError};
pub use frame::{CanFilter, CanFrame};
pub use modify::{
    FrameModification, ModFieldMask, ModInstruction, ModOp, ModParams, ModSlot, ModTarget,
};
pub use wire::{AttrTag, GwMessageBuilder, GwMsgHead};
