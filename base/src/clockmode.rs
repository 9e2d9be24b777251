//! The CLK register, which selects the system clock source.
//!
//! | bit  | name   | meaning                                   |
//! | ---- | ------ | ----------------------------------------- |
//! | 7    | RESET  | writing 1 reboots the chip                |
//! | 6    | PLLENA | enable the clock PLL                      |
//! | 5    | OSCENA | enable the crystal oscillator             |
//! | 4..3 | OSCM   | oscillator gain and load capacitance      |
//! | 2..0 | CLKSEL | clock source                              |
use std::fmt::{self, Display, Formatter};

use serde::Serialize;

/// Frequency of the internal fast RC oscillator, nominally 12MHz.
pub const RCFAST_FREQUENCY: u32 = 12_000_000;

/// Frequency of the internal slow RC oscillator, nominally 20kHz.
pub const RCSLOW_FREQUENCY: u32 = 20_000;

/// The source selected by the CLKSEL field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ClockSelect {
    RcFast,
    RcSlow,
    XInput,
    /// The crystal input multiplied by the PLL.  The value is the
    /// multiplier (1, 2, 4, 8 or 16).
    XInputPll(u32),
}

impl Display for ClockSelect {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            ClockSelect::RcFast => f.write_str("RCFAST"),
            ClockSelect::RcSlow => f.write_str("RCSLOW"),
            ClockSelect::XInput => f.write_str("XINPUT"),
            ClockSelect::XInputPll(m) => write!(f, "PLL{m}X"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct ClockMode(u8);

impl ClockMode {
    #[must_use]
    pub const fn new(bits: u8) -> ClockMode {
        ClockMode(bits)
    }

    #[must_use]
    pub const fn bits(&self) -> u8 {
        self.0
    }

    #[must_use]
    pub const fn reset(&self) -> bool {
        self.0 & 0x80 != 0
    }

    #[must_use]
    pub const fn pll_enabled(&self) -> bool {
        self.0 & 0x40 != 0
    }

    #[must_use]
    pub const fn oscillator_enabled(&self) -> bool {
        self.0 & 0x20 != 0
    }

    /// The OSCM field, 0 (XINPUT) to 3 (XTAL3).
    #[must_use]
    pub const fn oscillator_mode(&self) -> u8 {
        (self.0 >> 3) & 3
    }

    #[must_use]
    pub fn clock_select(&self) -> ClockSelect {
        match self.0 & 7 {
            0 => ClockSelect::RcFast,
            1 => ClockSelect::RcSlow,
            2 => ClockSelect::XInput,
            n => ClockSelect::XInputPll(1 << (n - 3)),
        }
    }

    /// Computes the system clock frequency this mode produces from a
    /// crystal (or external clock) of frequency `xin`.
    #[must_use]
    pub fn system_frequency(&self, xin: u32) -> u32 {
        match self.clock_select() {
            ClockSelect::RcFast => RCFAST_FREQUENCY,
            ClockSelect::RcSlow => RCSLOW_FREQUENCY,
            ClockSelect::XInput => xin,
            ClockSelect::XInputPll(multiplier) => xin.saturating_mul(multiplier),
        }
    }

    /// Infers the crystal frequency from the system frequency this
    /// mode is known to produce.  Returns `None` for the RC
    /// oscillators, which do not use the crystal.
    #[must_use]
    pub fn crystal_frequency(&self, system_frequency: u32) -> Option<u32> {
        match self.clock_select() {
            ClockSelect::RcFast | ClockSelect::RcSlow => None,
            ClockSelect::XInput => Some(system_frequency),
            ClockSelect::XInputPll(multiplier) => Some(system_frequency / multiplier),
        }
    }
}

impl Display for ClockMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "{:#04x} ({})", self.0, self.clock_select())
    }
}

#[test]
fn test_xtal1_pll16x() {
    // XTAL1 + PLL16X, the usual setting for a 5MHz crystal.
    let mode = ClockMode::new(0x6F);
    assert!(mode.pll_enabled());
    assert!(mode.oscillator_enabled());
    assert_eq!(mode.oscillator_mode(), 1);
    assert_eq!(mode.clock_select(), ClockSelect::XInputPll(16));
    assert_eq!(mode.system_frequency(5_000_000), 80_000_000);
    assert_eq!(mode.crystal_frequency(80_000_000), Some(5_000_000));
    assert_eq!(mode.to_string(), "0x6f (PLL16X)");
}

#[test]
fn test_rc_modes_ignore_crystal() {
    assert_eq!(ClockMode::new(0).system_frequency(5_000_000), RCFAST_FREQUENCY);
    assert_eq!(ClockMode::new(1).system_frequency(5_000_000), RCSLOW_FREQUENCY);
    assert_eq!(ClockMode::new(0).crystal_frequency(80_000_000), None);
}

#[test]
fn test_reset_bit() {
    assert!(ClockMode::new(0x80).reset());
    assert!(!ClockMode::new(0x6F).reset());
}
