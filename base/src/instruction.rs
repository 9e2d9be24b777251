//! Cog instruction words.
//!
//! Every cog instruction is a single 32-bit long:
//!
//! | bits   | field | meaning                                       |
//! | ------ | ----- | --------------------------------------------- |
//! | 31..26 | INSTR | opcode                                        |
//! | 25     | Z     | write the zero flag                           |
//! | 24     | C     | write the carry flag                          |
//! | 23     | R     | write the result to the destination register  |
//! | 22     | I     | the source field is an immediate value        |
//! | 21..18 | CON   | condition code, see [`Condition`]             |
//! | 17..9  | DEST  | destination register                          |
//! | 8..0   | SRC   | source register or 9-bit immediate            |
//!
//! Several assembler mnemonics share an opcode and differ only in
//! the R bit.  For example `WRLONG` is `RDLONG` with R clear, `CMP` is
//! `SUB` with R clear and `JMP` is `JMPRET` with R clear.
use std::fmt::{self, Debug, Display, Formatter};

use serde::Serialize;

#[cfg(test)]
use test_strategy::proptest;

use super::condition::Condition;

/// The 6-bit instruction opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[repr(u8)]
pub enum Opcode {
    Rdbyte = 0,
    Rdword,
    Rdlong,
    Hubop,
    // Opcodes 4 to 7 were reserved for instructions which the chip
    // does not implement.
    Mul,
    Muls,
    Enc,
    Ones,
    Ror,
    Rol,
    Shr,
    Shl,
    Rcr,
    Rcl,
    Sar,
    Rev,
    Mins,
    Maxs,
    Min,
    Max,
    Movs,
    Movd,
    Movi,
    Jmpret,
    And,
    Andn,
    Or,
    Xor,
    Muxc,
    Muxnc,
    Muxz,
    Muxnz,
    Add,
    Sub,
    Addabs,
    Subabs,
    Sumc,
    Sumnc,
    Sumz,
    Sumnz,
    Mov,
    Neg,
    Abs,
    Absneg,
    Negc,
    Negnc,
    Negz,
    Negnz,
    Cmps,
    Cmpsx,
    Addx,
    Subx,
    Adds,
    Subs,
    Addsx,
    Subsx,
    Cmpsub,
    Djnz,
    Tjnz,
    Tjz,
    Waitpeq,
    Waitpne,
    Waitcnt,
    Waitvid,
}

const OPCODES: [Opcode; 64] = [
    Opcode::Rdbyte,
    Opcode::Rdword,
    Opcode::Rdlong,
    Opcode::Hubop,
    Opcode::Mul,
    Opcode::Muls,
    Opcode::Enc,
    Opcode::Ones,
    Opcode::Ror,
    Opcode::Rol,
    Opcode::Shr,
    Opcode::Shl,
    Opcode::Rcr,
    Opcode::Rcl,
    Opcode::Sar,
    Opcode::Rev,
    Opcode::Mins,
    Opcode::Maxs,
    Opcode::Min,
    Opcode::Max,
    Opcode::Movs,
    Opcode::Movd,
    Opcode::Movi,
    Opcode::Jmpret,
    Opcode::And,
    Opcode::Andn,
    Opcode::Or,
    Opcode::Xor,
    Opcode::Muxc,
    Opcode::Muxnc,
    Opcode::Muxz,
    Opcode::Muxnz,
    Opcode::Add,
    Opcode::Sub,
    Opcode::Addabs,
    Opcode::Subabs,
    Opcode::Sumc,
    Opcode::Sumnc,
    Opcode::Sumz,
    Opcode::Sumnz,
    Opcode::Mov,
    Opcode::Neg,
    Opcode::Abs,
    Opcode::Absneg,
    Opcode::Negc,
    Opcode::Negnc,
    Opcode::Negz,
    Opcode::Negnz,
    Opcode::Cmps,
    Opcode::Cmpsx,
    Opcode::Addx,
    Opcode::Subx,
    Opcode::Adds,
    Opcode::Subs,
    Opcode::Addsx,
    Opcode::Subsx,
    Opcode::Cmpsub,
    Opcode::Djnz,
    Opcode::Tjnz,
    Opcode::Tjz,
    Opcode::Waitpeq,
    Opcode::Waitpne,
    Opcode::Waitcnt,
    Opcode::Waitvid,
];

impl Opcode {
    /// Decodes the low six bits of `bits`.
    #[must_use]
    pub fn from_bits(bits: u32) -> Opcode {
        OPCODES[(bits & 0x3F) as usize]
    }

    #[must_use]
    pub fn number(&self) -> u8 {
        *self as u8
    }

    /// Returns the assembler mnemonic, which for some opcodes depends
    /// on whether the result is written.
    #[must_use]
    pub fn mnemonic(&self, write_result: bool) -> &'static str {
        match (self, write_result) {
            (Opcode::Rdbyte, true) => "rdbyte",
            (Opcode::Rdbyte, false) => "wrbyte",
            (Opcode::Rdword, true) => "rdword",
            (Opcode::Rdword, false) => "wrword",
            (Opcode::Rdlong, true) => "rdlong",
            (Opcode::Rdlong, false) => "wrlong",
            (Opcode::Hubop, _) => "hubop",
            (Opcode::Mul, _) => "mul",
            (Opcode::Muls, _) => "muls",
            (Opcode::Enc, _) => "enc",
            (Opcode::Ones, _) => "ones",
            (Opcode::Ror, _) => "ror",
            (Opcode::Rol, _) => "rol",
            (Opcode::Shr, _) => "shr",
            (Opcode::Shl, _) => "shl",
            (Opcode::Rcr, _) => "rcr",
            (Opcode::Rcl, _) => "rcl",
            (Opcode::Sar, _) => "sar",
            (Opcode::Rev, _) => "rev",
            (Opcode::Mins, _) => "mins",
            (Opcode::Maxs, _) => "maxs",
            (Opcode::Min, _) => "min",
            (Opcode::Max, _) => "max",
            (Opcode::Movs, _) => "movs",
            (Opcode::Movd, _) => "movd",
            (Opcode::Movi, _) => "movi",
            (Opcode::Jmpret, true) => "jmpret",
            (Opcode::Jmpret, false) => "jmp",
            (Opcode::And, true) => "and",
            (Opcode::And, false) => "test",
            (Opcode::Andn, true) => "andn",
            (Opcode::Andn, false) => "testn",
            (Opcode::Or, _) => "or",
            (Opcode::Xor, _) => "xor",
            (Opcode::Muxc, _) => "muxc",
            (Opcode::Muxnc, _) => "muxnc",
            (Opcode::Muxz, _) => "muxz",
            (Opcode::Muxnz, _) => "muxnz",
            (Opcode::Add, _) => "add",
            (Opcode::Sub, true) => "sub",
            (Opcode::Sub, false) => "cmp",
            (Opcode::Addabs, _) => "addabs",
            (Opcode::Subabs, _) => "subabs",
            (Opcode::Sumc, _) => "sumc",
            (Opcode::Sumnc, _) => "sumnc",
            (Opcode::Sumz, _) => "sumz",
            (Opcode::Sumnz, _) => "sumnz",
            (Opcode::Mov, _) => "mov",
            (Opcode::Neg, _) => "neg",
            (Opcode::Abs, _) => "abs",
            (Opcode::Absneg, _) => "absneg",
            (Opcode::Negc, _) => "negc",
            (Opcode::Negnc, _) => "negnc",
            (Opcode::Negz, _) => "negz",
            (Opcode::Negnz, _) => "negnz",
            (Opcode::Cmps, _) => "cmps",
            (Opcode::Cmpsx, _) => "cmpsx",
            (Opcode::Addx, _) => "addx",
            (Opcode::Subx, true) => "subx",
            (Opcode::Subx, false) => "cmpx",
            (Opcode::Adds, _) => "adds",
            (Opcode::Subs, _) => "subs",
            (Opcode::Addsx, _) => "addsx",
            (Opcode::Subsx, _) => "subsx",
            (Opcode::Cmpsub, _) => "cmpsub",
            (Opcode::Djnz, _) => "djnz",
            (Opcode::Tjnz, _) => "tjnz",
            (Opcode::Tjz, _) => "tjz",
            (Opcode::Waitpeq, _) => "waitpeq",
            (Opcode::Waitpne, _) => "waitpne",
            (Opcode::Waitcnt, _) => "waitcnt",
            (Opcode::Waitvid, _) => "waitvid",
        }
    }
}

/// The operations performed by the HUBOP instruction, selected by
/// the low three bits of its source operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum HubOp {
    Clkset,
    Cogid,
    Coginit,
    Cogstop,
    Locknew,
    Lockret,
    Lockset,
    Lockclr,
}

impl HubOp {
    #[must_use]
    pub fn from_bits(bits: u32) -> HubOp {
        match bits & 7 {
            0 => HubOp::Clkset,
            1 => HubOp::Cogid,
            2 => HubOp::Coginit,
            3 => HubOp::Cogstop,
            4 => HubOp::Locknew,
            5 => HubOp::Lockret,
            6 => HubOp::Lockset,
            _ => HubOp::Lockclr,
        }
    }

    #[must_use]
    pub fn mnemonic(&self) -> &'static str {
        match self {
            HubOp::Clkset => "clkset",
            HubOp::Cogid => "cogid",
            HubOp::Coginit => "coginit",
            HubOp::Cogstop => "cogstop",
            HubOp::Locknew => "locknew",
            HubOp::Lockret => "lockret",
            HubOp::Lockset => "lockset",
            HubOp::Lockclr => "lockclr",
        }
    }
}

/// A cog instruction word.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Instruction(u32);

impl Instruction {
    #[must_use]
    pub const fn new(bits: u32) -> Instruction {
        Instruction(bits)
    }

    /// Assembles an instruction from its fields.  Out-of-range field
    /// values are truncated to the width of the field.
    #[must_use]
    pub fn assemble(
        opcode: Opcode,
        effects: Effects,
        condition: Condition,
        dest: u32,
        src: u32,
    ) -> Instruction {
        let mut bits: u32 = u32::from(opcode.number()) << 26;
        if effects.write_zero {
            bits |= 1 << 25;
        }
        if effects.write_carry {
            bits |= 1 << 24;
        }
        if effects.write_result {
            bits |= 1 << 23;
        }
        if effects.immediate {
            bits |= 1 << 22;
        }
        bits |= u32::from(condition.bits()) << 18;
        bits |= (dest & 0x1FF) << 9;
        bits |= src & 0x1FF;
        Instruction(bits)
    }

    #[must_use]
    pub const fn bits(&self) -> u32 {
        self.0
    }

    #[must_use]
    pub fn opcode(&self) -> Opcode {
        Opcode::from_bits(self.0 >> 26)
    }

    #[must_use]
    pub const fn write_zero(&self) -> bool {
        self.0 & (1 << 25) != 0
    }

    #[must_use]
    pub const fn write_carry(&self) -> bool {
        self.0 & (1 << 24) != 0
    }

    #[must_use]
    pub const fn write_result(&self) -> bool {
        self.0 & (1 << 23) != 0
    }

    #[must_use]
    pub const fn immediate(&self) -> bool {
        self.0 & (1 << 22) != 0
    }

    #[must_use]
    pub const fn condition(&self) -> Condition {
        Condition::from_bits(self.0 >> 18)
    }

    #[must_use]
    pub const fn dest(&self) -> u32 {
        (self.0 >> 9) & 0x1FF
    }

    #[must_use]
    pub const fn src(&self) -> u32 {
        self.0 & 0x1FF
    }

    #[must_use]
    pub fn effects(&self) -> Effects {
        Effects {
            write_zero: self.write_zero(),
            write_carry: self.write_carry(),
            write_result: self.write_result(),
            immediate: self.immediate(),
        }
    }
}

/// The ZCRI bits of an instruction.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Effects {
    pub write_zero: bool,
    pub write_carry: bool,
    pub write_result: bool,
    pub immediate: bool,
}

impl Effects {
    /// Effects for an instruction which writes its result, which is
    /// the default for most mnemonics.
    #[must_use]
    pub fn wr() -> Effects {
        Effects {
            write_result: true,
            ..Effects::default()
        }
    }

    #[must_use]
    pub fn nr() -> Effects {
        Effects::default()
    }

    #[must_use]
    pub fn with_immediate(self) -> Effects {
        Effects {
            immediate: true,
            ..self
        }
    }

    #[must_use]
    pub fn with_wz(self) -> Effects {
        Effects {
            write_zero: true,
            ..self
        }
    }

    #[must_use]
    pub fn with_wc(self) -> Effects {
        Effects {
            write_carry: true,
            ..self
        }
    }
}

impl Debug for Instruction {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "Instruction({:#010x} {})", self.0, self)
    }
}

impl Display for Instruction {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        let condition = self.condition();
        if condition != Condition::IF_ALWAYS {
            write!(f, "{condition} ")?;
        }
        let opcode = self.opcode();
        if opcode == Opcode::Hubop && self.immediate() {
            let op = HubOp::from_bits(self.src());
            write!(f, "{} {:#05x}", op.mnemonic(), self.dest())?;
        } else {
            let hash = if self.immediate() { "#" } else { "" };
            write!(
                f,
                "{} {:#05x}, {hash}{:#05x}",
                opcode.mnemonic(self.write_result()),
                self.dest(),
                self.src()
            )?;
        }
        if self.write_zero() {
            f.write_str(" wz")?;
        }
        if self.write_carry() {
            f.write_str(" wc")?;
        }
        Ok(())
    }
}

#[test]
fn test_field_extraction() {
    // if_z add $010, #4 wc
    let inst = Instruction::new(0x81E8_2004);
    assert_eq!(inst.opcode(), Opcode::Add);
    assert!(inst.write_carry());
    assert!(inst.write_result());
    assert!(inst.immediate());
    assert_eq!(inst.condition(), Condition::IF_Z);
    assert_eq!(inst.dest(), 0x010);
    assert_eq!(inst.src(), 0x004);
}

#[test]
fn test_display() {
    let inst = Instruction::assemble(
        Opcode::Sub,
        Effects::nr().with_immediate().with_wz(),
        Condition::IF_ALWAYS,
        0x12,
        3,
    );
    assert_eq!(inst.to_string(), "cmp 0x012, #0x003 wz");
    let cogid = Instruction::assemble(
        Opcode::Hubop,
        Effects::wr().with_immediate(),
        Condition::IF_NC,
        0x20,
        1,
    );
    assert_eq!(cogid.to_string(), "if_nc cogid 0x020");
}

#[cfg(test)]
#[proptest]
fn assembled_fields_are_recovered(
    #[strategy(0u32..64)] opcode: u32,
    #[strategy(0u32..16)] condition: u32,
    #[strategy(0u32..0x200)] dest: u32,
    #[strategy(0u32..0x200)] src: u32,
    zero: bool,
    carry: bool,
    result: bool,
    immediate: bool,
) {
    let effects = Effects {
        write_zero: zero,
        write_carry: carry,
        write_result: result,
        immediate,
    };
    let inst = Instruction::assemble(
        Opcode::from_bits(opcode),
        effects,
        Condition::from_bits(condition),
        dest,
        src,
    );
    assert_eq!(inst.bits() >> 26, opcode);
    assert_eq!(inst.effects(), effects);
    assert_eq!(u32::from(inst.condition().bits()), condition);
    assert_eq!(inst.dest(), dest);
    assert_eq!(inst.src(), src);
}
