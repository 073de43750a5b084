//! Frame modification pipeline.
//!
//! Four operator slots (AND, OR, XOR, SET) each carry a template frame and
//! a field mask selecting which of identifier, DLC, and payload the
//! operator touches. At job creation the active slots are compiled, in the
//! fixed operator order, into a flat program of tagged instructions; the
//! receive path executes the program with a plain match per instruction.

use crate::checksum::ChecksumSpecs;
use crate::frame::CanFrame;

/// Field selector bit: the identifier word.
pub const MOD_ID: u8 = 0x01;
/// Field selector bit: the data-length code.
pub const MOD_DLC: u8 = 0x02;
/// Field selector bit: the payload as one 64-bit word.
pub const MOD_DATA: u8 = 0x04;

/// Upper bound on compiled program length: four slots times three fields.
pub const MAX_MOD_INSTRUCTIONS: usize = 12;

/// Bitset over the three modifiable frame fields.
///
/// The raw byte is preserved as configured (including any unassigned high
/// bits) so that a job re-emitted on a dump reproduces its request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModFieldMask(u8);

impl ModFieldMask {
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    #[must_use]
    pub const fn id(self) -> bool {
        self.0 & MOD_ID != 0
    }

    #[must_use]
    pub const fn dlc(self) -> bool {
        self.0 & MOD_DLC != 0
    }

    #[must_use]
    pub const fn data(self) -> bool {
        self.0 & MOD_DATA != 0
    }

    /// A slot with an empty mask is inactive.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 & (MOD_ID | MOD_DLC | MOD_DATA) == 0
    }
}

/// The four modification operators, in their fixed application order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModOp {
    And,
    Or,
    Xor,
    Set,
}

/// One operator slot: a field mask and the template frame supplying the
/// operand for each selected field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModSlot {
    pub mask: ModFieldMask,
    pub frame: CanFrame,
}

impl ModSlot {
    pub const fn new(mask: ModFieldMask, frame: CanFrame) -> Self {
        Self { mask, frame }
    }
}

/// Target field of a compiled instruction, carrying the template operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModTarget {
    Id(u32),
    Dlc(u8),
    Data(u64),
}

/// One compiled field-level operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModInstruction {
    pub op: ModOp,
    pub target: ModTarget,
}

impl ModInstruction {
    /// Apply this operation to the frame. Touches only the targeted field.
    pub fn apply(&self, cf: &mut CanFrame) {
        match (self.op, self.target) {
            (ModOp::And, ModTarget::Id(v)) => cf.can_id &= v,
            (ModOp::And, ModTarget::Dlc(v)) => cf.can_dlc &= v,
            (ModOp::And, ModTarget::Data(v)) => cf.set_data_u64(cf.data_u64() & v),
            (ModOp::Or, ModTarget::Id(v)) => cf.can_id |= v,
            (ModOp::Or, ModTarget::Dlc(v)) => cf.can_dlc |= v,
            (ModOp::Or, ModTarget::Data(v)) => cf.set_data_u64(cf.data_u64() | v),
            (ModOp::Xor, ModTarget::Id(v)) => cf.can_id ^= v,
            (ModOp::Xor, ModTarget::Dlc(v)) => cf.can_dlc ^= v,
            (ModOp::Xor, ModTarget::Data(v)) => cf.set_data_u64(cf.data_u64() ^ v),
            (ModOp::Set, ModTarget::Id(v)) => cf.can_id = v,
            (ModOp::Set, ModTarget::Dlc(v)) => cf.can_dlc = v,
            (ModOp::Set, ModTarget::Data(v)) => cf.set_data_u64(v),
        }
    }
}

/// Slot and checksum configuration for [`FrameModification::from_params`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModParams {
    pub and: ModSlot,
    pub or: ModSlot,
    pub xor: ModSlot,
    pub set: ModSlot,
    pub csum: ChecksumSpecs,
}

/// The complete modification state of a gateway job: the four operator
/// slots, the checksum specs, and the program compiled from the slots.
///
/// Equality compares slots and checksum specs; the program is a pure
/// function of the slots, so two modifications with equal configuration
/// always compare equal. This is the predicate removal requests match on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameModification {
    and: ModSlot,
    or: ModSlot,
    xor: ModSlot,
    set: ModSlot,
    csum: ChecksumSpecs,
    program: Vec<ModInstruction>,
}

impl FrameModification {
    /// Compile the slot configuration into an executable program.
    pub fn from_params(params: ModParams) -> Self {
        let mut program = Vec::with_capacity(MAX_MOD_INSTRUCTIONS);
        for (op, slot) in [
            (ModOp::And, &params.and),
            (ModOp::Or, &params.or),
            (ModOp::Xor, &params.xor),
            (ModOp::Set, &params.set),
        ] {
            if slot.mask.id() {
                program.push(ModInstruction {
                    op,
                    target: ModTarget::Id(slot.frame.can_id),
                });
            }
            if slot.mask.dlc() {
                program.push(ModInstruction {
                    op,
                    target: ModTarget::Dlc(slot.frame.can_dlc),
                });
            }
            if slot.mask.data() {
                program.push(ModInstruction {
                    op,
                    target: ModTarget::Data(slot.frame.data_u64()),
                });
            }
        }
        Self {
            and: params.and,
            or: params.or,
            xor: params.xor,
            set: params.set,
            csum: params.csum,
            program,
        }
    }

    /// A modification with no active slots and no enabled checksums.
    pub fn identity() -> Self {
        Self::from_params(ModParams::default())
    }

    pub fn and(&self) -> &ModSlot {
        &self.and
    }

    pub fn or(&self) -> &ModSlot {
        &self.or
    }

    pub fn xor(&self) -> &ModSlot {
        &self.xor
    }

    pub fn set(&self) -> &ModSlot {
        &self.set
    }

    pub fn csum(&self) -> &ChecksumSpecs {
        &self.csum
    }

    pub fn program(&self) -> &[ModInstruction] {
        &self.program
    }

    /// True when the program performs no work (pure forwarding).
    #[must_use]
    pub fn is_identity(&self) -> bool {
        self.program.is_empty()
    }

    /// Run the compiled program over the frame, in order. Never allocates
    /// and never fails.
    pub fn apply(&self, cf: &mut CanFrame) {
        for ins in &self.program {
            ins.apply(cf);
        }
    }
}

impl Default for FrameModification {
    fn default() -> Self {
        Self::identity()
    }
}
