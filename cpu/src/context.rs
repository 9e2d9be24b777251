//! This module manages the context in which the emulator is
//! constructed.
//!
//! The emulator has no global state.  Everything a component needs
//! to know about how it is being run is held in a [`Context`] which
//! the caller builds once and passes by reference to each
//! component's constructor.
use base::prelude::RCFAST_FREQUENCY;

/// Maximum number of hub ticks [`crate::Propeller::step_instruction`]
/// will run while waiting for a cog to reach an instruction
/// boundary.  Loading a cog takes a little under 4096 ticks, so this
/// is enough to get from a cog start to its first instruction.
pub const DEFAULT_STEP_INSTRUCTION_LIMIT: u32 = 0x2000;

#[derive(Debug, Clone, PartialEq)]
pub struct Context {
    /// System clock frequency (in Hz) used before a boot image says
    /// otherwise.  The chip starts on its internal RC oscillator.
    pub boot_frequency: u32,

    /// Ceiling on the number of ticks taken by a single-instruction
    /// step.
    pub step_instruction_limit: u32,
}

impl Context {
    #[must_use]
    pub fn new(boot_frequency: u32, step_instruction_limit: u32) -> Context {
        Context {
            boot_frequency,
            step_instruction_limit,
        }
    }
}

impl Default for Context {
    fn default() -> Context {
        Context::new(RCFAST_FREQUENCY, DEFAULT_STEP_INSTRUCTION_LIMIT)
    }
}
