//! Notifications for things which watch the emulation (displays,
//! logic analysers and the like).
//!
//! Pin observers are told about the pins whenever their state
//! changes.  Clock observers are told about every tick.
use std::fmt::{self, Debug, Formatter};

use serde::Serialize;

/// The state of all 64 pins.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct PinState {
    /// Levels seen by the cogs (INA and INB).
    pub input: u64,
    /// Combined output of every cog.
    pub output: u64,
    /// Combined direction registers of every cog; a set bit means
    /// some cog drives the pin.
    pub direction: u64,
    /// Levels applied from outside the chip.  They are visible only
    /// on pins no cog drives.
    pub external: u64,
}

pub trait PinObserver {
    fn pins_changed(&mut self, pins: &PinState);
}

pub trait ClockObserver {
    /// Called at the end of every tick with the emulated time in
    /// seconds and the value of the system counter.
    fn tick(&mut self, time: f64, counter: u32);
}

/// Identifies a registered observer, for removing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ObserverId(u64);

#[derive(Default)]
pub(crate) struct Observers {
    next_id: u64,
    pin: Vec<(ObserverId, Box<dyn PinObserver>)>,
    clock: Vec<(ObserverId, Box<dyn ClockObserver>)>,
}

impl Debug for Observers {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        f.debug_struct("Observers")
            .field("pin", &self.pin.len())
            .field("clock", &self.clock.len())
            .finish()
    }
}

impl Observers {
    fn allocate_id(&mut self) -> ObserverId {
        let id = ObserverId(self.next_id);
        self.next_id += 1;
        id
    }

    pub(crate) fn add_pin(&mut self, observer: Box<dyn PinObserver>) -> ObserverId {
        let id = self.allocate_id();
        self.pin.push((id, observer));
        id
    }

    pub(crate) fn add_clock(&mut self, observer: Box<dyn ClockObserver>) -> ObserverId {
        let id = self.allocate_id();
        self.clock.push((id, observer));
        id
    }

    /// Removes an observer.  Returns false if there was no such
    /// observer.
    pub(crate) fn remove(&mut self, id: ObserverId) -> bool {
        let before = self.pin.len() + self.clock.len();
        self.pin.retain(|(oid, _)| *oid != id);
        self.clock.retain(|(oid, _)| *oid != id);
        self.pin.len() + self.clock.len() != before
    }

    pub(crate) fn notify_pins(&mut self, pins: &PinState) {
        for (_, observer) in self.pin.iter_mut() {
            observer.pins_changed(pins);
        }
    }

    pub(crate) fn notify_clock(&mut self, time: f64, counter: u32) {
        for (_, observer) in self.clock.iter_mut() {
            observer.tick(time, counter);
        }
    }
}
