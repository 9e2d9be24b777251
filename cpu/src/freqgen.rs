//! Counter modules ("frequency generators").
//!
//! Each cog has two counters, A and B.  A counter has three
//! registers:
//!
//! - CTR selects the mode (bits 30..26), the PLL divider (bits
//!   25..23), pin B (bits 14..9) and pin A (bits 5..0).
//! - FRQ is added to PHS whenever the mode's condition holds.
//! - PHS is the phase accumulator.
//!
//! The cog reaches these registers through its special registers
//! (CTRA, FRQA, PHSA and so on); nothing else writes them.
use serde::Serialize;
use tracing::{event, Level};

use super::context::Context;

/// The counter mode, decoded from CTR bits 30..26.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CounterMode {
    Off,
    PllInternal,
    PllSingleEnded,
    PllDifferential,
    NcoSingleEnded,
    NcoDifferential,
    DutySingleEnded,
    DutyDifferential,
    /// Accumulates while pin A is high.  With feedback, pin B
    /// outputs the inverse of pin A.
    PositiveDetector { feedback: bool },
    /// Accumulates on each rising edge of pin A.
    PositiveEdgeDetector { feedback: bool },
    NegativeDetector { feedback: bool },
    NegativeEdgeDetector { feedback: bool },
    /// Accumulates when bit `A + 2B` of the four-bit truth table is
    /// set.
    Logic(u8),
}

impl CounterMode {
    #[must_use]
    pub fn from_bits(mode: u32) -> CounterMode {
        let feedback = mode & 1 != 0;
        match mode & 0x1F {
            0 => CounterMode::Off,
            1 => CounterMode::PllInternal,
            2 => CounterMode::PllSingleEnded,
            3 => CounterMode::PllDifferential,
            4 => CounterMode::NcoSingleEnded,
            5 => CounterMode::NcoDifferential,
            6 => CounterMode::DutySingleEnded,
            7 => CounterMode::DutyDifferential,
            8 | 9 => CounterMode::PositiveDetector { feedback },
            10 | 11 => CounterMode::PositiveEdgeDetector { feedback },
            12 | 13 => CounterMode::NegativeDetector { feedback },
            14 | 15 => CounterMode::NegativeEdgeDetector { feedback },
            n => CounterMode::Logic((n & 0xF) as u8),
        }
    }

    #[must_use]
    pub fn is_pll(&self) -> bool {
        matches!(
            self,
            CounterMode::PllInternal | CounterMode::PllSingleEnded | CounterMode::PllDifferential
        )
    }
}

fn pin_bit(pin: u32, level: bool) -> u64 {
    if level {
        1_u64 << pin
    } else {
        0
    }
}

#[derive(Debug, Clone)]
pub struct FreqGenerator {
    control: u32,
    frequency: u32,
    phase: u32,
    /// Phase of the PLL output, in cycles; only the fractional part
    /// matters.
    pll_phase: f64,
    system_frequency: u32,
    // Pin inputs are sampled through a two-stage delay.
    a1: bool,
    a2: bool,
    b1: bool,
    output: u64,
}

impl FreqGenerator {
    #[must_use]
    pub fn new(ctx: &Context) -> FreqGenerator {
        FreqGenerator {
            control: 0,
            frequency: 0,
            phase: 0,
            pll_phase: 0.0,
            system_frequency: ctx.boot_frequency,
            a1: false,
            a2: false,
            b1: false,
            output: 0,
        }
    }

    #[must_use]
    pub fn mode(&self) -> CounterMode {
        CounterMode::from_bits(self.control >> 26)
    }

    #[must_use]
    pub fn pin_a(&self) -> u32 {
        self.control & 0x3F
    }

    #[must_use]
    pub fn pin_b(&self) -> u32 {
        (self.control >> 9) & 0x3F
    }

    #[must_use]
    pub fn pll_divider(&self) -> u32 {
        (self.control >> 23) & 7
    }

    pub(crate) fn control(&self) -> u32 {
        self.control
    }

    pub(crate) fn set_control(&mut self, value: u32) {
        let old_mode = self.mode();
        self.control = value;
        let new_mode = self.mode();
        if old_mode != new_mode {
            event!(Level::TRACE, "counter mode {:?} -> {:?}", old_mode, new_mode);
        }
        self.update_output_pins();
    }

    pub(crate) fn frequency(&self) -> u32 {
        self.frequency
    }

    pub(crate) fn set_frequency(&mut self, value: u32) {
        self.frequency = value;
    }

    pub(crate) fn phase(&self) -> u32 {
        self.phase
    }

    pub(crate) fn set_phase(&mut self, value: u32) {
        self.phase = value;
        self.update_output_pins();
    }

    /// Changes the system clock frequency.  The registers are not
    /// changed; only the real-time rate of the PLL output is.
    pub fn set_clock(&mut self, system_frequency: u32) {
        self.system_frequency = system_frequency;
    }

    /// The pins currently driven high by this counter.
    #[must_use]
    pub fn output(&self) -> u64 {
        self.output
    }

    /// Frequency in Hz of the PLL output in the PLL modes; zero in
    /// every other mode.
    ///
    /// The NCO frequency (system clock * FRQ / 2^32) is multiplied
    /// by 16 by the VCO and then divided by 2^(7 - PLLDIV).
    #[must_use]
    pub fn pll_frequency(&self) -> f64 {
        if !self.mode().is_pll() {
            return 0.0;
        }
        let nco = f64::from(self.system_frequency) * f64::from(self.frequency) / 4_294_967_296.0;
        let divisor = f64::from(1_u32 << (7 - self.pll_divider()));
        nco * 16.0 / divisor
    }

    /// Advances the counter by one system clock, with `pins` being
    /// the current value of the input pins.
    pub fn tick(&mut self, pins: u64) {
        let a = (pins >> self.pin_a()) & 1 != 0;
        let b = (pins >> self.pin_b()) & 1 != 0;
        let (a1, a2, b1) = (self.a1, self.a2, self.b1);
        self.a2 = self.a1;
        self.a1 = a;
        self.b1 = b;

        match self.mode() {
            CounterMode::Off => {}
            CounterMode::PllInternal
            | CounterMode::PllSingleEnded
            | CounterMode::PllDifferential => {
                self.phase = self.phase.wrapping_add(self.frequency);
                if self.system_frequency > 0 {
                    let cycles = self.pll_frequency() / f64::from(self.system_frequency);
                    self.pll_phase = (self.pll_phase + cycles).fract();
                }
            }
            CounterMode::NcoSingleEnded | CounterMode::NcoDifferential => {
                self.phase = self.phase.wrapping_add(self.frequency);
            }
            CounterMode::DutySingleEnded | CounterMode::DutyDifferential => {
                let (sum, carry) = self.phase.overflowing_add(self.frequency);
                self.phase = sum;
                self.set_levels(carry);
                return;
            }
            CounterMode::PositiveDetector { .. } => self.accumulate_if(a1),
            CounterMode::PositiveEdgeDetector { .. } => self.accumulate_if(a1 && !a2),
            CounterMode::NegativeDetector { .. } => self.accumulate_if(!a1),
            CounterMode::NegativeEdgeDetector { .. } => self.accumulate_if(!a1 && a2),
            CounterMode::Logic(table) => {
                let selector = u8::from(a1) + 2 * u8::from(b1);
                self.accumulate_if((table >> selector) & 1 != 0);
            }
        }
        self.update_output_pins();
    }

    fn accumulate_if(&mut self, condition: bool) {
        if condition {
            self.phase = self.phase.wrapping_add(self.frequency);
        }
    }

    fn update_output_pins(&mut self) {
        let level = match self.mode() {
            CounterMode::PllInternal | CounterMode::PllSingleEnded | CounterMode::PllDifferential => {
                self.pll_phase >= 0.5
            }
            CounterMode::NcoSingleEnded | CounterMode::NcoDifferential => self.phase >> 31 != 0,
            // The carry is only known during a tick.
            CounterMode::DutySingleEnded | CounterMode::DutyDifferential => false,
            // The detectors drive only their feedback pin.
            _ => self.a1,
        };
        self.set_levels(level);
    }

    /// Drives the output pins for the current mode given the level of
    /// the A output.
    fn set_levels(&mut self, level: bool) {
        let a = self.pin_a();
        let b = self.pin_b();
        self.output = match self.mode() {
            CounterMode::Off
            | CounterMode::PllInternal
            | CounterMode::Logic(_)
            | CounterMode::PositiveDetector { feedback: false }
            | CounterMode::PositiveEdgeDetector { feedback: false }
            | CounterMode::NegativeDetector { feedback: false }
            | CounterMode::NegativeEdgeDetector { feedback: false } => 0,
            CounterMode::PllSingleEnded
            | CounterMode::NcoSingleEnded
            | CounterMode::DutySingleEnded => pin_bit(a, level),
            CounterMode::PllDifferential
            | CounterMode::NcoDifferential
            | CounterMode::DutyDifferential => pin_bit(a, level) | pin_bit(b, !level),
            CounterMode::PositiveDetector { feedback: true }
            | CounterMode::PositiveEdgeDetector { feedback: true }
            | CounterMode::NegativeDetector { feedback: true }
            | CounterMode::NegativeEdgeDetector { feedback: true } => pin_bit(b, !level),
        };
    }
}
