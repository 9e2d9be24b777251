//! This crate emulates the Parallax Propeller (P8X32A).  It models
//! the eight cogs, the hub which arbitrates their access to shared
//! memory, the counter modules with their PLLs and the video
//! generators.
//!
//! The emulation is cycle-based: [`Propeller::step`] advances the
//! whole chip by one system clock tick.
#![crate_name = "cpu"]

mod clock;
mod cog;
mod context;
mod freqgen;
mod hub;
mod memory;
mod observer;
mod pll;
mod propeller;
mod rom;
mod video;

pub use clock::ClockSource;
pub use cog::{Cog, CogRunState, CogStatus, COG_PROGRAM_LONGS};
pub use context::{Context, DEFAULT_STEP_INSTRUCTION_LIMIT};
pub use freqgen::{CounterMode, FreqGenerator};
pub use hub::{decode_coginit, ClockConfig, LockBank, COG_COUNT, LOCK_COUNT};
pub use memory::{HubCursor, HUB_MEMORY_SIZE, ROM_BASE};
pub use observer::{ClockObserver, ObserverId, PinObserver, PinState};
pub use pll::{PllClocked, PllGroup};
pub use propeller::{Propeller, StartCogError, StepInstructionOutcome, BOOT_PARAMETER};
pub use rom::{ANTILOG_TABLE, INTERPRETER_ADDRESS, LOG_TABLE, SINE_TABLE, STOP_ROUTINE};
pub use video::{VideoGenerator, VideoMode};
