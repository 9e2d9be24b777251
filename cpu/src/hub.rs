//! State which cogs share through the hub.
//!
//! During a tick each cog is given mutable access to the [`HubBus`].
//! Things a cog cannot do by itself (starting or stopping cogs,
//! changing the system clock) are queued as [`CogRequest`]s which the
//! [`crate::Propeller`] carries out as soon as the cog has finished
//! its part of the tick.
use base::prelude::ClockMode;
use serde::Serialize;
use tracing::{event, Level};

use super::memory::HubMemory;

pub const COG_COUNT: usize = 8;
pub const LOCK_COUNT: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CogRequest {
    Start {
        id: usize,
        program: u32,
        param: u32,
    },
    Stop(usize),
    SetClock(ClockMode),
}

/// Decodes the destination operand of COGINIT into the program
/// address, the parameter address and the cog to start (`None` meaning
/// any free cog).
#[must_use]
pub fn decode_coginit(d: u32) -> (u32, u32, Option<usize>) {
    let param = (d >> 16) & 0xFFFC;
    let program = (d >> 2) & 0xFFFC;
    let target = if d & 8 != 0 {
        None
    } else {
        Some((d & 7) as usize)
    };
    (program, param, target)
}

/// The eight hardware semaphores.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct LockBank {
    allocated: [bool; LOCK_COUNT],
    state: [bool; LOCK_COUNT],
}

impl LockBank {
    /// Allocates a free lock (LOCKNEW).
    pub fn allocate(&mut self) -> Option<u32> {
        let id = self.allocated.iter().position(|a| !a)?;
        self.allocated[id] = true;
        Some(id as u32)
    }

    /// Returns a lock to the free pool (LOCKRET).
    pub fn release(&mut self, id: u32) {
        self.allocated[(id & 7) as usize] = false;
    }

    /// Sets a lock, returning its previous state (LOCKSET).
    pub fn set(&mut self, id: u32) -> bool {
        std::mem::replace(&mut self.state[(id & 7) as usize], true)
    }

    /// Clears a lock, returning its previous state (LOCKCLR).
    pub fn clear(&mut self, id: u32) -> bool {
        std::mem::replace(&mut self.state[(id & 7) as usize], false)
    }

    #[must_use]
    pub fn is_set(&self, id: u32) -> bool {
        self.state[(id & 7) as usize]
    }

    #[must_use]
    pub fn any_free(&self) -> bool {
        self.allocated.iter().any(|a| !a)
    }
}

/// The system clock configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClockConfig {
    pub mode: ClockMode,
    /// Frequency of the crystal or external clock on XI.
    pub crystal: u32,
    /// The resulting system clock frequency.
    pub frequency: u32,
}

#[derive(Debug)]
pub(crate) struct HubBus {
    pub(crate) memory: HubMemory,
    /// The system counter, CNT.
    pub(crate) counter: u32,
    /// The state of all 64 pins as seen by the cogs (INA and INB).
    pub(crate) pins_in: u64,
    pub(crate) locks: LockBank,
    pub(crate) clock: ClockConfig,
    occupied: [bool; COG_COUNT],
    requests: Vec<CogRequest>,
}

impl HubBus {
    pub(crate) fn new(clock: ClockConfig) -> HubBus {
        HubBus {
            memory: HubMemory::new(),
            counter: 0,
            pins_in: 0,
            locks: LockBank::default(),
            clock,
            occupied: [false; COG_COUNT],
            requests: Vec::new(),
        }
    }

    /// Reserves a cog and queues its start.  With `target` set, that
    /// cog is (re)started whether or not it is running.  Otherwise
    /// the lowest-numbered free cog is used, and `None` is returned if
    /// there is none.
    pub(crate) fn start_cog(
        &mut self,
        program: u32,
        param: u32,
        target: Option<usize>,
    ) -> Option<usize> {
        let id = match target {
            Some(id) => id & 7,
            None => self.occupied.iter().position(|o| !o)?,
        };
        self.occupied[id] = true;
        event!(
            Level::DEBUG,
            "queueing start of cog {} (program {:#06x}, parameter {:#06x})",
            id,
            program,
            param
        );
        self.requests.push(CogRequest::Start { id, program, param });
        Some(id)
    }

    pub(crate) fn stop_cog(&mut self, id: usize) {
        let id = id & 7;
        self.occupied[id] = false;
        self.requests.push(CogRequest::Stop(id));
    }

    pub(crate) fn set_clock_mode(&mut self, mode: ClockMode) {
        self.requests.push(CogRequest::SetClock(mode));
    }

    pub(crate) fn take_requests(&mut self) -> Vec<CogRequest> {
        std::mem::take(&mut self.requests)
    }

    pub(crate) fn release_all_cogs(&mut self) {
        self.occupied = [false; COG_COUNT];
        self.requests.clear();
    }
}

#[test]
fn test_decode_coginit() {
    // Parameter 0x1234 (the low bits are dropped), program 0x0100,
    // start any free cog.
    let d = (0x1234 << 16) | (0x0100 << 2) | 8;
    assert_eq!(decode_coginit(d), (0x0100, 0x1234, None));
    assert_eq!(decode_coginit((0x0040 << 2) | 5), (0x0040, 0, Some(5)));
}

#[test]
fn test_lock_allocation() {
    let mut locks = LockBank::default();
    for expected in 0..8 {
        assert_eq!(locks.allocate(), Some(expected));
    }
    assert_eq!(locks.allocate(), None);
    assert!(!locks.any_free());
    locks.release(3);
    assert_eq!(locks.allocate(), Some(3));
}

#[test]
fn test_lock_set_and_clear_report_previous_state() {
    let mut locks = LockBank::default();
    assert!(!locks.set(2));
    assert!(locks.set(2));
    assert!(locks.is_set(2));
    assert!(locks.clear(2));
    assert!(!locks.clear(2));
    // Lock ids wrap.
    assert!(!locks.set(10));
    assert!(locks.is_set(2));
}

#[test]
fn test_start_cog_picks_lowest_free() {
    let clock = ClockConfig {
        mode: ClockMode::new(0),
        crystal: 0,
        frequency: 12_000_000,
    };
    let mut bus = HubBus::new(clock);
    assert_eq!(bus.start_cog(0, 0, None), Some(0));
    assert_eq!(bus.start_cog(0, 0, Some(2)), Some(2));
    assert_eq!(bus.start_cog(0, 0, None), Some(1));
    bus.stop_cog(0);
    assert_eq!(bus.start_cog(0, 0, None), Some(0));
    for _ in 3..8 {
        assert!(bus.start_cog(0, 0, None).is_some());
    }
    assert_eq!(bus.start_cog(0, 0, None), None);
    assert_eq!(bus.take_requests().len(), 10);
    assert!(bus.take_requests().is_empty());
}
