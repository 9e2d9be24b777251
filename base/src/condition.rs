//! Instruction condition codes.
//!
//! Every cog instruction carries a four-bit condition field.  The
//! instruction only executes if the condition holds for the current
//! values of the Z (zero) and C (carry) flags.  The assembler accepts
//! many spellings for the same condition; for example `IF_NC_AND_NZ`,
//! `IF_NZ_AND_NC` and `IF_A` all assemble to the same bit pattern, and
//! so they compare equal here.
//!
//! The hardware evaluates the condition by using the flags to select
//! one of the four bits of the field: bit `Z + 2C`.  That is what
//! [`Condition::evaluate`] does.
use std::fmt::{self, Display, Formatter};

use serde::Serialize;

#[cfg(test)]
use test_strategy::proptest;

/// A four-bit condition code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Condition(u8);

impl Condition {
    pub const IF_NEVER: Condition = Condition(0x0);
    pub const IF_A: Condition = Condition(0x1);
    pub const IF_NC_AND_NZ: Condition = Condition(0x1);
    pub const IF_NZ_AND_NC: Condition = Condition(0x1);
    pub const IF_NC_AND_Z: Condition = Condition(0x2);
    pub const IF_Z_AND_NC: Condition = Condition(0x2);
    pub const IF_NC: Condition = Condition(0x3);
    pub const IF_AE: Condition = Condition(0x3);
    pub const IF_NZ_AND_C: Condition = Condition(0x4);
    pub const IF_C_AND_NZ: Condition = Condition(0x4);
    pub const IF_NZ: Condition = Condition(0x5);
    pub const IF_NE: Condition = Condition(0x5);
    pub const IF_C_NE_Z: Condition = Condition(0x6);
    pub const IF_Z_NE_C: Condition = Condition(0x6);
    pub const IF_NC_OR_NZ: Condition = Condition(0x7);
    pub const IF_NZ_OR_NC: Condition = Condition(0x7);
    pub const IF_C_AND_Z: Condition = Condition(0x8);
    pub const IF_Z_AND_C: Condition = Condition(0x8);
    pub const IF_C_EQ_Z: Condition = Condition(0x9);
    pub const IF_Z_EQ_C: Condition = Condition(0x9);
    pub const IF_E: Condition = Condition(0xA);
    pub const IF_Z: Condition = Condition(0xA);
    pub const IF_NC_OR_Z: Condition = Condition(0xB);
    pub const IF_Z_OR_NC: Condition = Condition(0xB);
    pub const IF_B: Condition = Condition(0xC);
    pub const IF_C: Condition = Condition(0xC);
    pub const IF_NZ_OR_C: Condition = Condition(0xD);
    pub const IF_C_OR_NZ: Condition = Condition(0xD);
    pub const IF_Z_OR_C: Condition = Condition(0xE);
    pub const IF_BE: Condition = Condition(0xE);
    pub const IF_C_OR_Z: Condition = Condition(0xE);
    pub const IF_ALWAYS: Condition = Condition(0xF);

    /// Extracts a condition from the low four bits of `bits`; the
    /// other bits are ignored.
    #[must_use]
    pub const fn from_bits(bits: u32) -> Condition {
        Condition((bits & 0xF) as u8)
    }

    #[must_use]
    pub const fn bits(&self) -> u8 {
        self.0
    }

    /// Returns true when an instruction carrying this condition
    /// executes, given the current state of the zero and carry
    /// flags.
    #[must_use]
    pub const fn evaluate(&self, zero: bool, carry: bool) -> bool {
        let selector = (zero as u8) + 2 * (carry as u8);
        (self.0 >> selector) & 1 != 0
    }

    /// The conventional assembler spelling of this condition.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self.0 {
            0x0 => "if_never",
            0x1 => "if_nc_and_nz",
            0x2 => "if_nc_and_z",
            0x3 => "if_nc",
            0x4 => "if_c_and_nz",
            0x5 => "if_nz",
            0x6 => "if_c_ne_z",
            0x7 => "if_nc_or_nz",
            0x8 => "if_c_and_z",
            0x9 => "if_c_eq_z",
            0xA => "if_z",
            0xB => "if_nc_or_z",
            0xC => "if_c",
            0xD => "if_c_or_nz",
            0xE => "if_c_or_z",
            _ => "if_always",
        }
    }
}

impl Display for Condition {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        f.write_str(self.name())
    }
}

/// The architecture's truth table, one row per encoding, written out
/// longhand.  The four columns are the outcomes for (Z, C) =
/// (0,0), (1,0), (0,1), (1,1).
#[cfg(test)]
const TRUTH_TABLE: [(Condition, [bool; 4]); 16] = [
    (Condition::IF_NEVER, [false, false, false, false]),
    (Condition::IF_NC_AND_NZ, [true, false, false, false]),
    (Condition::IF_NC_AND_Z, [false, true, false, false]),
    (Condition::IF_NC, [true, true, false, false]),
    (Condition::IF_C_AND_NZ, [false, false, true, false]),
    (Condition::IF_NZ, [true, false, true, false]),
    (Condition::IF_C_NE_Z, [false, true, true, false]),
    (Condition::IF_NC_OR_NZ, [true, true, true, false]),
    (Condition::IF_C_AND_Z, [false, false, false, true]),
    (Condition::IF_C_EQ_Z, [true, false, false, true]),
    (Condition::IF_Z, [false, true, false, true]),
    (Condition::IF_NC_OR_Z, [true, true, false, true]),
    (Condition::IF_C, [false, false, true, true]),
    (Condition::IF_C_OR_NZ, [true, false, true, true]),
    (Condition::IF_C_OR_Z, [false, true, true, true]),
    (Condition::IF_ALWAYS, [true, true, true, true]),
];

#[test]
fn test_truth_table() {
    for (condition, outcomes) in TRUTH_TABLE.iter() {
        for (column, expected) in outcomes.iter().enumerate() {
            let zero = column & 1 != 0;
            let carry = column & 2 != 0;
            assert_eq!(
                condition.evaluate(zero, carry),
                *expected,
                "{condition} with Z={zero} C={carry}"
            );
        }
    }
}

#[test]
fn test_table_rows_are_in_encoding_order() {
    for (encoding, (condition, _)) in TRUTH_TABLE.iter().enumerate() {
        assert_eq!(usize::from(condition.bits()), encoding);
    }
}

#[test]
fn test_synonyms_share_encoding() {
    let synonym_sets: &[&[Condition]] = &[
        &[
            Condition::IF_A,
            Condition::IF_NC_AND_NZ,
            Condition::IF_NZ_AND_NC,
        ],
        &[Condition::IF_NC_AND_Z, Condition::IF_Z_AND_NC],
        &[Condition::IF_NC, Condition::IF_AE],
        &[Condition::IF_NZ_AND_C, Condition::IF_C_AND_NZ],
        &[Condition::IF_NZ, Condition::IF_NE],
        &[Condition::IF_C_NE_Z, Condition::IF_Z_NE_C],
        &[Condition::IF_NC_OR_NZ, Condition::IF_NZ_OR_NC],
        &[Condition::IF_C_AND_Z, Condition::IF_Z_AND_C],
        &[Condition::IF_C_EQ_Z, Condition::IF_Z_EQ_C],
        &[Condition::IF_E, Condition::IF_Z],
        &[Condition::IF_NC_OR_Z, Condition::IF_Z_OR_NC],
        &[Condition::IF_B, Condition::IF_C],
        &[Condition::IF_NZ_OR_C, Condition::IF_C_OR_NZ],
        &[Condition::IF_Z_OR_C, Condition::IF_BE, Condition::IF_C_OR_Z],
    ];
    for synonyms in synonym_sets {
        let first = synonyms[0];
        for other in synonyms.iter() {
            assert_eq!(first, *other);
            for column in 0..4 {
                let (zero, carry) = (column & 1 != 0, column & 2 != 0);
                assert_eq!(first.evaluate(zero, carry), other.evaluate(zero, carry));
            }
        }
    }
}

#[cfg(test)]
#[proptest]
fn from_bits_ignores_upper_bits(bits: u32, zero: bool, carry: bool) {
    let low = Condition::from_bits(bits & 0xF);
    let full = Condition::from_bits(bits);
    assert_eq!(low, full);
    assert_eq!(low.evaluate(zero, carry), full.evaluate(zero, carry));
}
