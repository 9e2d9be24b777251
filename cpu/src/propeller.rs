//! The chip as a whole.
//!
//! [`Propeller`] owns the hub memory, the eight cog slots, the system
//! counter, the locks, the clock configuration and the pins.  Each
//! call to [`Propeller::step`] is one tick of the system clock:
//!
//! 1. CNT is incremented.
//! 2. Every running cog performs its part of the tick, in order of
//!    cog id.
//! 3. The hub is granted to the cog owning the current slot of the
//!    round-robin rotation (if that cog is running), and the rotation
//!    moves on.
//! 4. The pins are recomputed from the cogs' outputs and the external
//!    stimulus.
//! 5. Observers are notified.
//!
//! Cog starts, cog stops and clock changes requested by a cog are
//! carried out as soon as that cog's step (or hub access) is
//! finished.
use std::array;
use std::error::Error;
use std::fmt::{self, Display, Formatter};

use serde::Serialize;
use tracing::{event, span, Level};

use base::prelude::*;

use super::cog::{Cog, CogStatus};
use super::context::Context;
use super::hub::{ClockConfig, CogRequest, HubBus, LockBank, COG_COUNT};
use super::memory::HubCursor;
use super::observer::{ClockObserver, ObserverId, Observers, PinObserver, PinState};
use super::rom::{self, INTERPRETER_ADDRESS};

#[cfg(test)]
mod tests;

/// Hub address of the parameter block handed to the interpreter
/// started at reset (it lies inside the image header).
pub const BOOT_PARAMETER: u32 = 0x0004;

/// Address of the image header's local frame word.
const LOCAL_FRAME_POINTER: u32 = 0x000A;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartCogError {
    NoFreeCog,
}

impl Display for StartCogError {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            StartCogError::NoFreeCog => f.write_str("all eight cogs are running"),
        }
    }
}

impl Error for StartCogError {}

/// How [`Propeller::step_instruction`] finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StepInstructionOutcome {
    /// The cog has reached its next instruction boundary.
    Boundary,
    /// [`Propeller::step`] returned false on the way (a breakpoint
    /// was reached, or no cog is left).
    Halted,
    /// The tick limit ran out first.
    Ceiling,
    /// The cog is not running (or stopped on the way).
    NoSuchCog,
}

#[derive(Debug)]
pub struct Propeller {
    ctx: Context,
    bus: HubBus,
    cogs: [Option<Cog>; COG_COUNT],
    /// The hub slot which is granted next.
    ring: usize,
    last_grant: Option<usize>,
    /// Emulated time, in seconds.
    time: f64,
    external_pins: u64,
    pins: PinState,
    observers: Observers,
}

impl Propeller {
    /// Creates a chip with empty RAM, ROM in place and no cogs
    /// running.  Call [`Propeller::initialize`] to boot an image.
    #[must_use]
    pub fn new(ctx: &Context) -> Propeller {
        let mut bus = HubBus::new(ClockConfig {
            mode: ClockMode::new(0),
            crystal: 0,
            frequency: ctx.boot_frequency,
        });
        rom::populate(&mut bus.memory);
        Propeller {
            ctx: ctx.clone(),
            bus,
            cogs: Default::default(),
            ring: 0,
            last_grant: None,
            time: 0.0,
            external_pins: 0,
            pins: PinState::default(),
            observers: Observers::default(),
        }
    }

    /// Loads a boot image into RAM and resets the chip.  The image is
    /// loaded even if its header is malformed (as the chip's boot
    /// loader would); the returned value reports any problem with
    /// it.
    pub fn initialize(&mut self, image: &[u8]) -> Result<BootHeader, ImageError> {
        self.bus.memory.clear_ram();
        let loaded = self.bus.memory.load_ram(image);
        if loaded < image.len() {
            event!(
                Level::WARN,
                "boot image is {} bytes long; only the first {} were loaded",
                image.len(),
                loaded
            );
        }
        let header = BootHeader::verify(image);
        match &header {
            Ok(h) => event!(
                Level::DEBUG,
                "loaded {} byte image: clock {} Hz, mode {}, entry {:#06x}",
                loaded,
                h.clock_frequency,
                h.clock_mode,
                h.entry_pc
            ),
            Err(e) => event!(Level::WARN, "boot image problem: {}", e),
        }
        self.reset();
        header
    }

    /// Stops every cog, clears the counter, locks and pins, and
    /// boots the image in RAM: the boot call frame is written below
    /// the image's local frame, the clock is set from the header and
    /// cog 0 is started running the interpreter.
    pub fn reset(&mut self) {
        event!(Level::DEBUG, "resetting");
        for slot in self.cogs.iter_mut() {
            if let Some(mut cog) = slot.take() {
                cog.detach_video_hooks();
            }
        }
        self.bus.release_all_cogs();
        self.bus.counter = 0;
        self.bus.locks = LockBank::default();
        self.bus.pins_in = 0;
        self.ring = 0;
        self.last_grant = None;
        self.time = 0.0;
        self.pins = PinState {
            external: self.external_pins,
            ..PinState::default()
        };
        rom::populate(&mut self.bus.memory);

        let local_frame = u32::from(self.bus.memory.read_word(LOCAL_FRAME_POINTER));
        for (offset, byte) in (0_u32..).zip(BOOT_FRAME) {
            let address = local_frame.wrapping_sub(8).wrapping_add(offset);
            self.bus.memory.write_byte(address, byte);
        }

        let frequency = match self.bus.memory.read_long(0) {
            0 => self.ctx.boot_frequency,
            f => f,
        };
        let mode = ClockMode::new(self.bus.memory.read_byte(4));
        self.bus.clock = ClockConfig {
            mode,
            crystal: mode.crystal_frequency(frequency).unwrap_or(0),
            frequency,
        };
        event!(
            Level::DEBUG,
            "clock mode {} at {} Hz",
            self.bus.clock.mode,
            self.bus.clock.frequency
        );

        self.bus.start_cog(INTERPRETER_ADDRESS, BOOT_PARAMETER, Some(0));
        self.apply_requests();
        self.update_pins();
    }

    /// Performs one tick.  Returns false if, during this tick, a cog
    /// arrived at an instruction boundary at its breakpoint, or if no
    /// cog is left running.
    ///
    /// Only arrival counts: a cog which already sits at its
    /// breakpoint when the tick starts (for example because the
    /// breakpoint was set there while it was stopped) executes that
    /// instruction and does not halt until it comes back.
    pub fn step(&mut self) -> bool {
        let tick_span = span!(Level::TRACE, "tick", counter = self.bus.counter);
        let _enter = tick_span.enter();

        self.bus.counter = self.bus.counter.wrapping_add(1);
        let was_at_boundary: [bool; COG_COUNT] = array::from_fn(|id| {
            self.cogs[id]
                .as_ref()
                .map_or(false, Cog::at_instruction_boundary)
        });

        for id in 0..COG_COUNT {
            if let Some(cog) = self.cogs[id].as_mut() {
                cog.step(&mut self.bus);
                self.apply_requests();
            }
        }

        let slot = self.ring;
        self.ring = (self.ring + 1) % COG_COUNT;
        self.last_grant = match self.cogs[slot].as_mut() {
            Some(cog) => {
                cog.hub_access(&mut self.bus);
                Some(slot)
            }
            None => None,
        };
        self.apply_requests();

        self.update_pins();
        if self.bus.clock.frequency > 0 {
            self.time += 1.0 / f64::from(self.bus.clock.frequency);
        }
        self.observers.notify_clock(self.time, self.bus.counter);

        if self.cogs.iter().all(Option::is_none) {
            event!(Level::INFO, "no cogs are running");
            return false;
        }
        for (id, cog) in self.cogs.iter().enumerate() {
            if let Some(cog) = cog {
                if !was_at_boundary[id]
                    && cog.at_instruction_boundary()
                    && cog.breakpoint() == Some(cog.program_cursor())
                {
                    event!(
                        Level::INFO,
                        "cog {} reached its breakpoint at {:#06x}",
                        id,
                        cog.program_cursor()
                    );
                    return false;
                }
            }
        }
        true
    }

    /// Runs ticks until cog `id` has left its current instruction
    /// boundary and reached the next one, or until the tick limit in
    /// the [`Context`] runs out.
    pub fn step_instruction(&mut self, id: usize) -> StepInstructionOutcome {
        if self.cog(id).is_none() {
            return StepInstructionOutcome::NoSuchCog;
        }
        let mut left_boundary = false;
        for _ in 0..self.ctx.step_instruction_limit {
            if !self.step() {
                return StepInstructionOutcome::Halted;
            }
            match self.cog(id) {
                None => return StepInstructionOutcome::NoSuchCog,
                Some(cog) if cog.at_instruction_boundary() => {
                    if left_boundary {
                        return StepInstructionOutcome::Boundary;
                    }
                }
                Some(_) => left_boundary = true,
            }
        }
        StepInstructionOutcome::Ceiling
    }

    /// Starts a cog running the program at hub address `program`
    /// with PAR set from hub address `param`.  A program address of
    /// 0xF004 starts the bytecode interpreter.
    pub fn start_cog(&mut self, program: u32, param: u32) -> Result<usize, StartCogError> {
        let id = self
            .bus
            .start_cog(program, param, None)
            .ok_or(StartCogError::NoFreeCog)?;
        self.apply_requests();
        Ok(id)
    }

    pub fn stop_cog(&mut self, id: usize) {
        if id < COG_COUNT {
            self.bus.stop_cog(id);
            self.apply_requests();
        }
    }

    #[must_use]
    pub fn cog(&self, id: usize) -> Option<&Cog> {
        self.cogs.get(id)?.as_ref()
    }

    pub fn cog_mut(&mut self, id: usize) -> Option<&mut Cog> {
        self.cogs.get_mut(id)?.as_mut()
    }

    pub fn cogs(&self) -> impl Iterator<Item = &Cog> {
        self.cogs.iter().flatten()
    }

    #[must_use]
    pub fn cog_statuses(&self) -> Vec<CogStatus> {
        self.cogs().map(Cog::status).collect()
    }

    #[must_use]
    pub fn direct_read_byte(&self, address: u32) -> u8 {
        self.bus.memory.read_byte(address)
    }

    #[must_use]
    pub fn direct_read_word(&self, address: u32) -> u16 {
        self.bus.memory.read_word(address)
    }

    #[must_use]
    pub fn direct_read_long(&self, address: u32) -> u32 {
        self.bus.memory.read_long(address)
    }

    /// A cursor for walking hub memory from `address`, bypassing the
    /// hub.
    pub fn cursor(&mut self, address: u32) -> HubCursor<'_> {
        HubCursor::new(&mut self.bus.memory, address)
    }

    /// Writes hub memory, including ROM, bypassing the hub.
    pub fn direct_write_byte(&mut self, address: u32, value: u8) {
        self.bus.memory.direct_write_byte(address, value);
    }

    pub fn direct_write_word(&mut self, address: u32, value: u16) {
        self.bus.memory.direct_write_word(address, value);
    }

    pub fn direct_write_long(&mut self, address: u32, value: u32) {
        self.bus.memory.direct_write_long(address, value);
    }

    /// Applies external levels to the pins.  A level is only seen on
    /// pins which no cog drives.
    pub fn drive_pins(&mut self, levels: u64) {
        self.external_pins = levels;
        self.update_pins();
    }

    #[must_use]
    pub fn pins(&self) -> PinState {
        self.pins
    }

    pub fn add_pin_observer(&mut self, observer: Box<dyn PinObserver>) -> ObserverId {
        self.observers.add_pin(observer)
    }

    pub fn add_clock_observer(&mut self, observer: Box<dyn ClockObserver>) -> ObserverId {
        self.observers.add_clock(observer)
    }

    /// Removes an observer.  Returns false if there was no such
    /// observer.
    pub fn remove_observer(&mut self, id: ObserverId) -> bool {
        self.observers.remove(id)
    }

    /// The value of the system counter, CNT.
    #[must_use]
    pub fn counter(&self) -> u32 {
        self.bus.counter
    }

    /// Emulated time since reset, in seconds.
    #[must_use]
    pub fn time(&self) -> f64 {
        self.time
    }

    #[must_use]
    pub fn clock(&self) -> ClockConfig {
        self.bus.clock
    }

    #[must_use]
    pub fn locks(&self) -> &LockBank {
        &self.bus.locks
    }

    /// The cog granted the hub during the most recent tick, if the
    /// cog owning that slot was running.
    #[must_use]
    pub fn last_grant(&self) -> Option<usize> {
        self.last_grant
    }

    fn apply_requests(&mut self) {
        for request in self.bus.take_requests() {
            match request {
                CogRequest::Start { id, program, param } => {
                    if let Some(mut old) = self.cogs[id].take() {
                        event!(Level::DEBUG, "cog {} restarted", id);
                        old.detach_video_hooks();
                    }
                    self.cogs[id] = Some(Cog::new(
                        &self.ctx,
                        id,
                        program,
                        param,
                        self.bus.clock.frequency,
                    ));
                }
                CogRequest::Stop(id) => {
                    if let Some(mut cog) = self.cogs[id].take() {
                        event!(Level::DEBUG, "cog {} stopped", id);
                        cog.detach_video_hooks();
                    }
                }
                CogRequest::SetClock(mode) if mode.reset() => {
                    event!(Level::INFO, "clock mode {} requests a chip reset", mode);
                    self.reset();
                    return;
                }
                CogRequest::SetClock(mode) => self.set_clock_mode(mode),
            }
        }
    }

    fn set_clock_mode(&mut self, mode: ClockMode) {
        let frequency = match mode.system_frequency(self.bus.clock.crystal) {
            0 => {
                event!(
                    Level::WARN,
                    "clock mode {} needs a crystal frequency, which is not known; keeping {} Hz",
                    mode,
                    self.bus.clock.frequency
                );
                self.bus.clock.frequency
            }
            f => f,
        };
        self.bus.clock.mode = mode;
        self.bus.clock.frequency = frequency;
        event!(Level::DEBUG, "clock mode set to {} ({} Hz)", mode, frequency);
        for cog in self.cogs.iter_mut().flatten() {
            cog.set_clock(frequency);
        }
    }

    fn update_pins(&mut self) {
        let (output, direction, driven) = self.cogs().fold(
            (0_u64, 0_u64, 0_u64),
            |(output, direction, driven), cog| {
                let (out, dir) = (cog.out(), cog.dir());
                (output | out, direction | dir, driven | (out & dir))
            },
        );
        let pins = PinState {
            input: driven | (self.external_pins & !direction),
            output,
            direction,
            external: self.external_pins,
        };
        self.bus.pins_in = pins.input;
        if pins != self.pins {
            self.pins = pins;
            self.observers.notify_pins(&pins);
        }
    }
}
