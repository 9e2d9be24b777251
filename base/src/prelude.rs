//! The prelude exports the types most users of the base crate need
//! for describing the machine.
pub use super::clockmode::{ClockMode, ClockSelect, RCFAST_FREQUENCY, RCSLOW_FREQUENCY};
pub use super::condition::Condition;
pub use super::image::{BootHeader, ImageError, BOOT_FRAME, HEADER_LENGTH, MAX_IMAGE_LENGTH};
pub use super::instruction::{Effects, HubOp, Instruction, Opcode};
pub use super::registers::{
    SpecialRegister, COG_REGISTER_COUNT, INTERPRETER_COGID_REGISTER, SPECIAL_REGISTER_BASE,
    UNDECODED_REGISTER_VALUE,
};
