//! Cog register addresses.
//!
//! Each cog has 512 longs of register memory.  The last sixteen
//! (0x1F0 to 0x1FF) are not storage but are wired to the cog's I/O
//! hardware.
use std::fmt::{self, Display, Formatter};

use serde::Serialize;

/// Number of longs in a cog's register file.
pub const COG_REGISTER_COUNT: usize = 0x200;

/// First address of the special-register block.
pub const SPECIAL_REGISTER_BASE: u32 = 0x1F0;

/// The bytecode interpreter keeps its cog id in this register; the
/// ROM's stop routine pushes it before stopping the cog.
pub const INTERPRETER_COGID_REGISTER: u32 = 0x1E9;

/// Value read from any register address beyond the end of the
/// register file.  The hardware does not fully decode addresses.
pub const UNDECODED_REGISTER_VALUE: u32 = 0x55;

#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum SpecialRegister {
    PAR = 0x1F0,
    CNT = 0x1F1,
    INA = 0x1F2,
    INB = 0x1F3,
    OUTA = 0x1F4,
    OUTB = 0x1F5,
    DIRA = 0x1F6,
    DIRB = 0x1F7,
    CTRA = 0x1F8,
    CTRB = 0x1F9,
    FRQA = 0x1FA,
    FRQB = 0x1FB,
    PHSA = 0x1FC,
    PHSB = 0x1FD,
    VCFG = 0x1FE,
    VSCL = 0x1FF,
}

const ALL_SPECIAL_REGISTERS: [SpecialRegister; 16] = [
    SpecialRegister::PAR,
    SpecialRegister::CNT,
    SpecialRegister::INA,
    SpecialRegister::INB,
    SpecialRegister::OUTA,
    SpecialRegister::OUTB,
    SpecialRegister::DIRA,
    SpecialRegister::DIRB,
    SpecialRegister::CTRA,
    SpecialRegister::CTRB,
    SpecialRegister::FRQA,
    SpecialRegister::FRQB,
    SpecialRegister::PHSA,
    SpecialRegister::PHSB,
    SpecialRegister::VCFG,
    SpecialRegister::VSCL,
];

impl SpecialRegister {
    /// Identifies the special register at `address`, if there is one.
    #[must_use]
    pub fn from_address(address: u32) -> Option<SpecialRegister> {
        if (SPECIAL_REGISTER_BASE..SPECIAL_REGISTER_BASE + 16).contains(&address) {
            let index = (address - SPECIAL_REGISTER_BASE) as usize;
            Some(ALL_SPECIAL_REGISTERS[index])
        } else {
            None
        }
    }

    #[must_use]
    pub fn address(&self) -> u32 {
        *self as u32
    }

    /// PAR, CNT, INA and INB cannot be changed by the cog which owns
    /// them.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        matches!(
            self,
            SpecialRegister::PAR
                | SpecialRegister::CNT
                | SpecialRegister::INA
                | SpecialRegister::INB
        )
    }

    pub fn all() -> impl Iterator<Item = SpecialRegister> {
        ALL_SPECIAL_REGISTERS.iter().copied()
    }
}

impl Display for SpecialRegister {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        fmt::Debug::fmt(self, f)
    }
}

#[test]
fn test_address_round_trip() {
    for reg in SpecialRegister::all() {
        assert_eq!(SpecialRegister::from_address(reg.address()), Some(reg));
    }
    assert_eq!(SpecialRegister::from_address(0x1EF), None);
    assert_eq!(SpecialRegister::from_address(0x200), None);
}

#[test]
fn test_read_only_set() {
    let read_only: Vec<SpecialRegister> =
        SpecialRegister::all().filter(|r| r.is_read_only()).collect();
    assert_eq!(
        read_only,
        vec![
            SpecialRegister::PAR,
            SpecialRegister::CNT,
            SpecialRegister::INA,
            SpecialRegister::INB
        ]
    );
}
