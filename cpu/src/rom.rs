//! Contents of the hub ROM.
//!
//! Only the parts of the ROM which emulated software can observe and
//! which we can generate are provided: the math tables and the short
//! bytecode routine which stops a cog when its top-level method
//! returns.  The font and the bytecode interpreter's machine code are
//! not present (the interpreter is emulated directly).
use std::f64::consts::FRAC_PI_2;

use conv::*;

use super::memory::HubMemory;

/// Base-2 logarithm table: 2048 words covering the mantissa range
/// [1, 2).
pub const LOG_TABLE: u32 = 0xC000;

/// Anti-log table: 2048 words.
pub const ANTILOG_TABLE: u32 = 0xD000;

/// Sine table: 2049 words covering the first quadrant, inclusive of
/// both ends.
pub const SINE_TABLE: u32 = 0xE000;

/// Program address which selects the bytecode interpreter when a cog
/// is started.
pub const INTERPRETER_ADDRESS: u32 = 0xF004;

/// Address of the bytecode routine that the boot call frame returns
/// to.  It stops the current cog.
pub const STOP_ROUTINE: u32 = 0xFFF9;

/// `REGPUSH $1E9` (the interpreter's cog id register), `COGSTOP`.
const STOP_ROUTINE_CODE: [u8; 3] = [0x3F, 0x89, 0x21];

fn table_word(value: f64) -> u16 {
    <u16 as ApproxFrom<f64>>::approx_from(value.round()).unwrap_or(u16::MAX)
}

fn fraction(i: u32, steps: u32) -> f64 {
    f64::value_from(i).unwrap_or(f64::MAX) / f64::value_from(steps).unwrap_or(f64::MAX)
}

/// Writes the ROM contents into `memory`.
pub(crate) fn populate(memory: &mut HubMemory) {
    for i in 0..2048_u32 {
        let x = fraction(i, 2048);
        let log = (1.0 + x).log2() * 65536.0;
        memory.direct_write_word(LOG_TABLE + 2 * i, table_word(log));
        let antilog = (2.0_f64.powf(x) - 1.0) * 65536.0;
        memory.direct_write_word(ANTILOG_TABLE + 2 * i, table_word(antilog));
    }
    for i in 0..=2048_u32 {
        let angle = fraction(i, 2048) * FRAC_PI_2;
        memory.direct_write_word(SINE_TABLE + 2 * i, table_word(angle.sin() * 65535.0));
    }
    for (offset, byte) in (0_u32..).zip(STOP_ROUTINE_CODE) {
        memory.direct_write_byte(STOP_ROUTINE + offset, byte);
    }
}

#[test]
fn test_table_end_points() {
    let mut mem = HubMemory::new();
    populate(&mut mem);
    assert_eq!(mem.read_word(LOG_TABLE), 0);
    assert_eq!(mem.read_word(ANTILOG_TABLE), 0);
    assert_eq!(mem.read_word(SINE_TABLE), 0);
    assert_eq!(mem.read_word(SINE_TABLE + 2 * 2048), 0xFFFF);
    // sin(45 degrees) * 65535 is 46340.45...
    assert_eq!(mem.read_word(SINE_TABLE + 2 * 1024), 46340);
}

#[test]
fn test_log_and_antilog_are_monotonic() {
    let mut mem = HubMemory::new();
    populate(&mut mem);
    for i in 1..2048 {
        assert!(mem.read_word(LOG_TABLE + 2 * i) >= mem.read_word(LOG_TABLE + 2 * (i - 1)));
        assert!(mem.read_word(ANTILOG_TABLE + 2 * i) >= mem.read_word(ANTILOG_TABLE + 2 * (i - 1)));
    }
}

#[test]
fn test_stop_routine() {
    let mut mem = HubMemory::new();
    populate(&mut mem);
    assert_eq!(mem.read_byte(STOP_ROUTINE), 0x3F);
    assert_eq!(mem.read_byte(STOP_ROUTINE + 1), 0x89);
    assert_eq!(mem.read_byte(STOP_ROUTINE + 2), 0x21);
}
