//! Interprets Spin bytecode.
//!
//! A cog started at the interpreter's ROM address runs this engine
//! instead of native code.  It executes one bytecode each time the
//! cog is granted the hub.  The interpreter's registers are:
//!
//! - `pbase`: base of the current object's code,
//! - `vbase`: base of the current object's variables,
//! - `dbase`: base of the current method's local variables (the
//!   method's RESULT long),
//! - `dcurr`: the top of the stack,
//! - `dcall`: the most recently dropped call anchor,
//!
//! and the program cursor, held by the cog.
//!
//! A call frame starts with an eight-byte header, the words
//! `pbase | flags`, `vbase`, `dbase` and the return address, followed
//! by the RESULT long, the parameters and the local variables.  Flag
//! bit 0 discards the method's return value and bit 1 makes the
//! frame catch aborts.  The boot frame at the top of the stack
//! returns to a ROM routine which stops the cog.
//!
//! A variable access can be a "using" access: the next byte is an
//! assignment operator applied to the variable in place, optionally
//! pushing the result.  The operators are plain assignment, the
//! counting step of `repeat ... from ... to`, sign extension, the
//! post-clear and post-set forms, increment and decrement, and every
//! math operator in its assignment form.
//!
//! Bytecodes this interpreter does not implement (for example the
//! random number operators) stop the cog with a warning.
use tracing::{event, Level};

use base::prelude::*;

use super::{CogCore, CogRunState, ExecutionEngine, WaitCondition};
use crate::hub::HubBus;

/// Ticks between the end of loading and the first bytecode fetch.
const BOOT_TICKS: u32 = 32;

/// Ticks between executing one bytecode and fetching the next.
const BYTECODE_TICKS: u32 = 32;

/// Frames unwound by a single abort before it is considered runaway.
const MAX_UNWIND: usize = 256;

const TRUE: u32 = u32::MAX;

fn truth(value: bool) -> u32 {
    if value {
        TRUE
    } else {
        0
    }
}

fn isqrt(value: u32) -> u32 {
    let mut root: u32 = 0;
    let mut bit: u32 = 1 << 15;
    while bit != 0 {
        let candidate = root | bit;
        if u64::from(candidate) * u64::from(candidate) <= u64::from(value) {
            root = candidate;
        }
        bit >>= 1;
    }
    root
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Width {
    Byte,
    Word,
    Long,
}

impl Width {
    fn from_bits(bits: u8) -> Width {
        match bits & 3 {
            0 => Width::Byte,
            1 => Width::Word,
            _ => Width::Long,
        }
    }

    fn shift(self) -> u32 {
        match self {
            Width::Byte => 0,
            Width::Word => 1,
            Width::Long => 2,
        }
    }

    fn mask(self) -> u32 {
        match self {
            Width::Byte => 0xFF,
            Width::Word => 0xFFFF,
            Width::Long => u32::MAX,
        }
    }
}

/// The variable an assignment operator works on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Variable {
    Hub(Width, u32),
    Register(u32),
}

impl Variable {
    fn width(self) -> Width {
        match self {
            Variable::Hub(width, _) => width,
            Variable::Register(_) => Width::Long,
        }
    }

    fn load(self, core: &CogCore, bus: &HubBus) -> u32 {
        match self {
            Variable::Hub(width, address) => read(bus, width, address),
            Variable::Register(register) => core.read_register(register),
        }
    }

    fn store(self, core: &mut CogCore, bus: &mut HubBus, value: u32) {
        match self {
            Variable::Hub(width, address) => write(bus, width, address, value),
            Variable::Register(register) => core.write_register(register, value),
        }
    }
}

fn is_unary(op: u8) -> bool {
    matches!(op, 0xE6 | 0xE7 | 0xE9 | 0xF1 | 0xF3 | 0xF8 | 0xFF)
}

/// What a bytecode did, apart from its effect on memory and the
/// interpreter registers.
#[derive(Debug, PartialEq, Eq)]
enum Outcome {
    Continue,
    /// The cog has entered a wait state.
    Waiting,
    /// The bytecode is not implemented.
    Unsupported,
}

#[derive(Debug, Default)]
pub(crate) struct Interpreter {
    pbase: u32,
    vbase: u32,
    dbase: u32,
    dcurr: u32,
    dcall: u32,
    /// Set once the cog has spent a whole tick ready to fetch.  A
    /// bytecode is not fetched during the tick in which the cog
    /// becomes ready, so that every fetch happens at a visible
    /// instruction boundary.
    fetch_ready: bool,
}

fn read(bus: &HubBus, width: Width, address: u32) -> u32 {
    match width {
        Width::Byte => u32::from(bus.memory.read_byte(address)),
        Width::Word => u32::from(bus.memory.read_word(address)),
        Width::Long => bus.memory.read_long(address),
    }
}

fn write(bus: &mut HubBus, width: Width, address: u32, value: u32) {
    match width {
        Width::Byte => bus.memory.write_byte(address, (value & 0xFF) as u8),
        Width::Word => bus.memory.write_word(address, (value & 0xFFFF) as u16),
        Width::Long => bus.memory.write_long(address, value),
    }
}

impl Interpreter {
    fn push(&mut self, bus: &mut HubBus, value: u32) {
        bus.memory.write_long(self.dcurr, value);
        self.dcurr = (self.dcurr + 4) & 0xFFFF;
    }

    fn pop(&mut self, bus: &HubBus) -> u32 {
        self.dcurr = self.dcurr.wrapping_sub(4) & 0xFFFF;
        bus.memory.read_long(self.dcurr)
    }

    fn fetch(core: &mut CogCore, bus: &HubBus) -> u8 {
        let value = bus.memory.read_byte(core.pc);
        core.pc = (core.pc + 1) & 0xFFFF;
        value
    }

    /// Fetches an unsigned offset: one byte, or two if the first has
    /// its top bit set.
    fn fetch_offset(core: &mut CogCore, bus: &HubBus) -> u32 {
        let first = u32::from(Self::fetch(core, bus));
        if first & 0x80 == 0 {
            first
        } else {
            ((first & 0x7F) << 8) | u32::from(Self::fetch(core, bus))
        }
    }

    /// Fetches a signed jump displacement, encoded like
    /// `fetch_offset` with the result sign-extended from 7 or 15 bits.
    fn fetch_displacement(core: &mut CogCore, bus: &HubBus) -> i32 {
        let first = Self::fetch(core, bus);
        if first & 0x80 == 0 {
            (i32::from(first) << 25) >> 25
        } else {
            let value = (i32::from(first & 0x7F) << 8) | i32::from(Self::fetch(core, bus));
            (value << 17) >> 17
        }
    }

    fn jump(core: &mut CogCore, displacement: i32) {
        core.pc = core.pc.wrapping_add_signed(displacement) & 0xFFFF;
    }

    fn drop_anchor(&mut self, bus: &mut HubBus, flags: u32) {
        let frame = self.dcurr;
        bus.memory.write_word(frame, ((self.pbase | flags) & 0xFFFF) as u16);
        bus.memory.write_word(frame + 2, (self.vbase & 0xFFFF) as u16);
        bus.memory.write_word(frame + 4, (self.dbase & 0xFFFF) as u16);
        bus.memory.write_word(frame + 6, (self.dcall & 0xFFFF) as u16);
        self.dcall = frame;
        self.dcurr = (frame + 8) & 0xFFFF;
        // RESULT
        self.push(bus, 0);
    }

    /// Calls method `index` of the object at `pbase`.  The arguments
    /// have already been pushed on top of the most recent anchor.
    fn call(
        &mut self,
        core: &mut CogCore,
        bus: &mut HubBus,
        pbase: u32,
        vbase: u32,
        index: u32,
    ) {
        let frame = self.dcall;
        self.dcall = u32::from(bus.memory.read_word(frame + 6));
        bus.memory.write_word(frame + 6, (core.pc & 0xFFFF) as u16);
        self.dbase = (frame + 8) & 0xFFFF;
        self.pbase = pbase & 0xFFFF;
        self.vbase = vbase & 0xFFFF;
        let entry = bus.memory.read_long(self.pbase + 4 * index);
        core.pc = (self.pbase + (entry & 0xFFFF)) & 0xFFFF;
        self.dcurr = (self.dcurr + (entry >> 16)) & 0xFFFF;
    }

    /// Returns from the current method.  An abort keeps unwinding
    /// until it reaches a frame which catches aborts.
    fn unwind(
        &mut self,
        core: &mut CogCore,
        bus: &mut HubBus,
        value: u32,
        abort: bool,
    ) -> Outcome {
        for _ in 0..MAX_UNWIND {
            let frame = self.dbase.wrapping_sub(8) & 0xFFFF;
            let flags = u32::from(bus.memory.read_word(frame));
            self.pbase = flags & !3;
            self.vbase = u32::from(bus.memory.read_word(frame + 2));
            self.dbase = u32::from(bus.memory.read_word(frame + 4));
            core.pc = u32::from(bus.memory.read_word(frame + 6));
            self.dcurr = frame;
            if !abort || flags & 2 != 0 {
                if flags & 1 == 0 {
                    self.push(bus, value);
                }
                return Outcome::Continue;
            }
        }
        event!(
            Level::WARN,
            "cog {}: abort did not reach a catching frame",
            core.id
        );
        Outcome::Unsupported
    }

    fn access(
        &mut self,
        core: &mut CogCore,
        bus: &mut HubBus,
        width: Width,
        address: u32,
        action: u8,
    ) -> Outcome {
        match action & 3 {
            0 => {
                let value = read(bus, width, address);
                self.push(bus, value);
            }
            1 => {
                let value = self.pop(bus);
                write(bus, width, address, value);
            }
            2 => return self.assign(core, bus, Variable::Hub(width, address)),
            _ => self.push(bus, address & 0xFFFF),
        }
        Outcome::Continue
    }

    /// Applies the assignment operator which follows a "using"
    /// access.  Bit 7 of the operator asks for the result to be
    /// pushed.
    fn assign(&mut self, core: &mut CogCore, bus: &mut HubBus, variable: Variable) -> Outcome {
        let operator = Self::fetch(core, bus);
        let push = operator & 0x80 != 0;
        let op = operator & 0x7F;
        let current = variable.load(core, bus);
        let (stored, result) = match op {
            0x00 => {
                let value = self.pop(bus);
                (value, value)
            }
            0x02 | 0x06 => {
                let value = self.repeat_step(core, bus, current, op == 0x06);
                (value, value)
            }
            0x10 => {
                let value = i32::from(current as u8 as i8) as u32;
                (value, value)
            }
            0x14 => {
                let value = i32::from(current as u16 as i16) as u32;
                (value, value)
            }
            0x18 => (0, current),
            0x1C => (TRUE, current),
            0x20..=0x3F => {
                // Bits 2..1 give the width the count wraps at; zero
                // means the variable's own width.
                let mask = match (op >> 1) & 3 {
                    0 => variable.width().mask(),
                    bits => Width::from_bits(bits - 1).mask(),
                };
                let counted = mask
                    & if op & 0x10 == 0 {
                        current.wrapping_add(1)
                    } else {
                        current.wrapping_sub(1)
                    };
                if op & 0x08 == 0 {
                    (counted, counted)
                } else {
                    (counted, current)
                }
            }
            0x40..=0x5F => {
                let math = 0xE0 | (op & 0x1F);
                let value = if is_unary(math) {
                    Self::unary(math, current)
                } else {
                    let b = self.pop(bus);
                    Self::binary(math, current, b)
                };
                (value, value)
            }
            _ => return Outcome::Unsupported,
        };
        variable.store(core, bus, stored);
        if push {
            self.push(bus, result);
        }
        Outcome::Continue
    }

    /// The counting step of `repeat var from a to b [step s]`: the
    /// stack holds the start, the end and (if `has_step`) the step.
    /// The variable moves towards the end by the step and the loop
    /// jumps back while it stays within the range.
    fn repeat_step(
        &mut self,
        core: &mut CogCore,
        bus: &mut HubBus,
        current: u32,
        has_step: bool,
    ) -> u32 {
        let step = if has_step { self.pop(bus) as i32 } else { 1 };
        let to = self.pop(bus) as i32;
        let from = self.pop(bus) as i32;
        let displacement = Self::fetch_displacement(core, bus);
        let current = current as i32;
        let next = if from <= to {
            current.wrapping_add(step)
        } else {
            current.wrapping_sub(step)
        };
        if from.min(to) <= next && next <= from.max(to) {
            Self::jump(core, displacement);
        }
        next as u32
    }

    fn memory_op(&mut self, core: &mut CogCore, bus: &mut HubBus, op: u8) -> Outcome {
        let width = Width::from_bits(op >> 5);
        let base = (op >> 2) & 3;
        let mut address = match base {
            0 => 0,
            1 => self.pbase + Self::fetch_offset(core, bus),
            2 => self.vbase + Self::fetch_offset(core, bus),
            _ => self.dbase + Self::fetch_offset(core, bus),
        };
        if op & 0x10 != 0 {
            let index = self.pop(bus);
            address = address.wrapping_add(index << width.shift());
        }
        if base == 0 {
            address = address.wrapping_add(self.pop(bus));
        }
        self.access(core, bus, width, address & 0xFFFF, op)
    }

    fn register_op(&mut self, core: &mut CogCore, bus: &mut HubBus) -> Outcome {
        let operand = Self::fetch(core, bus);
        let register = 0x1E0 + u32::from(operand & 0x1F);
        match (operand >> 5) & 3 {
            0 => {
                let value = core.read_register(register);
                self.push(bus, value);
            }
            1 => {
                let value = self.pop(bus);
                core.write_register(register, value);
            }
            2 => return self.assign(core, bus, Variable::Register(register)),
            _ => return Outcome::Unsupported,
        }
        Outcome::Continue
    }

    fn string_size(bus: &HubBus, address: u32) -> u32 {
        (0..0x1_0000)
            .find(|&i| bus.memory.read_byte(address.wrapping_add(i)) == 0)
            .unwrap_or(0x1_0000)
    }

    fn strings_equal(bus: &HubBus, a: u32, b: u32) -> bool {
        for i in 0..0x1_0000 {
            let x = bus.memory.read_byte(a.wrapping_add(i));
            let y = bus.memory.read_byte(b.wrapping_add(i));
            if x != y {
                return false;
            }
            if x == 0 {
                return true;
            }
        }
        true
    }

    fn fill(&mut self, bus: &mut HubBus, width: Width) {
        let count = self.pop(bus);
        let value = self.pop(bus);
        let address = self.pop(bus);
        let step = 1 << width.shift();
        for i in 0..count.min(0x1_0000) {
            write(bus, width, address.wrapping_add(i * step), value);
        }
    }

    fn copy(&mut self, bus: &mut HubBus, width: Width) {
        let count = self.pop(bus);
        let source = self.pop(bus);
        let dest = self.pop(bus);
        let step = 1 << width.shift();
        let values: Vec<u32> = (0..count.min(0x1_0000))
            .map(|i| read(bus, width, source.wrapping_add(i * step)))
            .collect();
        for (i, value) in (0_u32..).zip(values) {
            write(bus, width, dest.wrapping_add(i * step), value);
        }
    }

    fn wait_for_pins(
        &mut self,
        core: &mut CogCore,
        bus: &HubBus,
        state: CogRunState,
    ) -> Outcome {
        let port = self.pop(bus);
        let mask = self.pop(bus);
        let value = self.pop(bus);
        core.wait = WaitCondition::Pins {
            value,
            mask,
            port_b: port & 1 != 0,
        };
        core.state = state;
        Outcome::Waiting
    }

    fn binary(op: u8, a: u32, b: u32) -> u32 {
        let (sa, sb) = (a as i32, b as i32);
        match op {
            0xE0 => a.rotate_right(b & 0x1F),
            0xE1 => a.rotate_left(b & 0x1F),
            0xE2 => a >> (b & 0x1F),
            0xE3 => a << (b & 0x1F),
            0xE4 => sa.max(sb) as u32,
            0xE5 => sa.min(sb) as u32,
            0xE8 => a & b,
            0xEA => a | b,
            0xEB => a ^ b,
            0xEC => a.wrapping_add(b),
            0xED => a.wrapping_sub(b),
            0xEE => (sa >> (b & 0x1F)) as u32,
            0xEF => match b.min(32) {
                0 => 0,
                n => a.reverse_bits() >> (32 - n),
            },
            0xF0 => truth(a != 0 && b != 0),
            0xF2 => truth(a != 0 || b != 0),
            0xF4 => sa.wrapping_mul(sb) as u32,
            0xF5 => ((i64::from(sa) * i64::from(sb)) >> 32) as u32,
            0xF6 => {
                if b == 0 {
                    0
                } else {
                    sa.wrapping_div(sb) as u32
                }
            }
            0xF7 => {
                if b == 0 {
                    0
                } else {
                    sa.wrapping_rem(sb) as u32
                }
            }
            0xF9 => truth(sa < sb),
            0xFA => truth(sa > sb),
            0xFB => truth(a != b),
            0xFC => truth(a == b),
            0xFD => truth(sa <= sb),
            _ => truth(sa >= sb),
        }
    }

    fn unary(op: u8, a: u32) -> u32 {
        match op {
            0xE6 => a.wrapping_neg(),
            0xE7 => !a,
            0xE9 => (a as i32).wrapping_abs() as u32,
            0xF1 => 32 - a.leading_zeros(),
            0xF3 => 1 << (a & 0x1F),
            0xF8 => isqrt(a),
            _ => truth(a == 0),
        }
    }

    fn math_op(&mut self, bus: &mut HubBus, op: u8) {
        if is_unary(op) {
            let a = self.pop(bus);
            self.push(bus, Self::unary(op, a));
        } else {
            let b = self.pop(bus);
            let a = self.pop(bus);
            self.push(bus, Self::binary(op, a, b));
        }
    }

    /// Pushes `result` unless `op` is the non-pushing form of a
    /// system call (bit 2 set).
    fn push_result(&mut self, bus: &mut HubBus, op: u8, result: u32) {
        if op & 4 == 0 {
            self.push(bus, result);
        }
    }

    fn execute(&mut self, core: &mut CogCore, bus: &mut HubBus, op: u8) -> Outcome {
        match op {
            0x00..=0x03 => self.drop_anchor(bus, u32::from(op)),
            0x04 => {
                let displacement = Self::fetch_displacement(core, bus);
                Self::jump(core, displacement);
            }
            0x05 => {
                let index = u32::from(Self::fetch(core, bus));
                self.call(core, bus, self.pbase, self.vbase, index);
            }
            0x06 => {
                let object = u32::from(Self::fetch(core, bus));
                let index = u32::from(Self::fetch(core, bus));
                let entry = bus.memory.read_long(self.pbase + 4 * object);
                let pbase = self.pbase + (entry & 0xFFFF);
                let vbase = self.vbase + (entry >> 16);
                self.call(core, bus, pbase, vbase, index);
            }
            0x08 => {
                let displacement = Self::fetch_displacement(core, bus);
                let top = self.pop(bus);
                if top == 0 {
                    Self::jump(core, displacement);
                } else {
                    self.push(bus, top);
                }
            }
            0x09 => {
                let displacement = Self::fetch_displacement(core, bus);
                let count = self.pop(bus).wrapping_sub(1);
                if count != 0 {
                    self.push(bus, count);
                    Self::jump(core, displacement);
                }
            }
            0x0A | 0x0B => {
                let displacement = Self::fetch_displacement(core, bus);
                let value = self.pop(bus);
                if (value == 0) == (op == 0x0A) {
                    Self::jump(core, displacement);
                }
            }
            0x14 => {
                let bytes = self.pop(bus);
                self.dcurr = self.dcurr.wrapping_sub(bytes) & 0xFFFF;
            }
            0x16 => {
                let address = self.pop(bus);
                let size = Self::string_size(bus, address);
                self.push(bus, size);
            }
            0x17 => {
                let b = self.pop(bus);
                let a = self.pop(bus);
                self.push(bus, truth(Self::strings_equal(bus, a, b)));
            }
            0x18..=0x1A => self.fill(bus, Width::from_bits(op - 0x18)),
            0x1B => return self.wait_for_pins(core, bus, CogRunState::WaitPeq),
            0x1C..=0x1E => self.copy(bus, Width::from_bits(op - 0x1C)),
            0x1F => return self.wait_for_pins(core, bus, CogRunState::WaitPne),
            0x20 => {
                let frequency = self.pop(bus);
                let mode = self.pop(bus);
                bus.memory.write_long(0, frequency);
                bus.memory.write_byte(4, (mode & 0xFF) as u8);
                bus.set_clock_mode(ClockMode::new((mode & 0xFF) as u8));
            }
            0x21 => {
                let id = self.pop(bus);
                bus.stop_cog((id & 7) as usize);
            }
            0x22 => {
                let id = self.pop(bus);
                bus.locks.release(id);
            }
            0x23 => {
                let target = self.pop(bus);
                core.wait = WaitCondition::Count(target);
                core.state = CogRunState::WaitCnt;
                return Outcome::Waiting;
            }
            0x28 | 0x2C => {
                let param = self.pop(bus);
                let program = self.pop(bus);
                let id = self.pop(bus);
                let target = if id < 8 { Some(id as usize) } else { None };
                let started = bus.start_cog(program & 0xFFFC, param & 0xFFFC, target);
                let result = started.map_or(TRUE, |id| id as u32);
                self.push_result(bus, op, result);
            }
            0x29 | 0x2D => {
                let result = bus.locks.allocate().unwrap_or(TRUE);
                self.push_result(bus, op, result);
            }
            0x2A | 0x2E => {
                let id = self.pop(bus);
                let previous = bus.locks.set(id);
                self.push_result(bus, op, truth(previous));
            }
            0x2B | 0x2F => {
                let id = self.pop(bus);
                let previous = bus.locks.clear(id);
                self.push_result(bus, op, truth(previous));
            }
            0x30 | 0x32 => {
                let result = bus.memory.read_long(self.dbase);
                return self.unwind(core, bus, result, op == 0x30);
            }
            0x31 | 0x33 => {
                let value = self.pop(bus);
                return self.unwind(core, bus, value, op == 0x31);
            }
            0x34..=0x36 => {
                let value = u32::from(op).wrapping_sub(0x35);
                self.push(bus, value);
            }
            0x37 => {
                let operand = Self::fetch(core, bus);
                let mut value = 2_u32 << (operand & 0x1F);
                if operand & 0x20 != 0 {
                    value = value.wrapping_sub(1);
                }
                if operand & 0x40 != 0 {
                    value = !value;
                }
                self.push(bus, value);
            }
            0x38..=0x3B => {
                let mut value = 0;
                for _ in 0x37..op {
                    value = (value << 8) | u32::from(Self::fetch(core, bus));
                }
                self.push(bus, value);
            }
            0x3F => return self.register_op(core, bus),
            0x40..=0x7F => {
                let base = if op & 0x20 != 0 {
                    self.dbase
                } else {
                    self.vbase
                };
                let address = base + u32::from(op & 0x1C);
                return self.access(core, bus, Width::Long, address, op);
            }
            0x80..=0xDF => return self.memory_op(core, bus, op),
            0xE0..=0xFF => self.math_op(bus, op),
            _ => return Outcome::Unsupported,
        }
        Outcome::Continue
    }
}

impl ExecutionEngine for Interpreter {
    fn boot(&mut self, core: &mut CogCore, bus: &mut HubBus) {
        let param = core.param_address;
        let word = |offset: u32| u32::from(bus.memory.read_word(param + offset));
        self.pbase = word(2);
        self.vbase = word(4);
        self.dbase = word(6);
        core.pc = word(8);
        self.dcurr = word(10);
        self.dcall = 0;
        self.fetch_ready = false;
        core.write_register(INTERPRETER_COGID_REGISTER, core.id as u32);
        event!(
            Level::DEBUG,
            "cog {}: interpreter booting with pbase={:#06x} vbase={:#06x} dbase={:#06x} pcurr={:#06x} dcurr={:#06x}",
            core.id,
            self.pbase,
            self.vbase,
            self.dbase,
            core.pc,
            self.dcurr
        );
        core.state = CogRunState::BootInterpreter;
        core.state_count = BOOT_TICKS;
    }

    fn do_instruction(&mut self, core: &mut CogCore, bus: &mut HubBus) {
        match core.state {
            CogRunState::BootInterpreter | CogRunState::WaitInterpreter => {
                core.count_down(CogRunState::ExecInterpreter);
            }
            CogRunState::ExecInterpreter => self.fetch_ready = true,
            CogRunState::WaitPeq | CogRunState::WaitPne | CogRunState::WaitCnt => {
                if core.wait_satisfied(bus) {
                    core.wait = WaitCondition::Nothing;
                    core.state = CogRunState::ExecInterpreter;
                }
            }
            _ => {}
        }
    }

    fn hub_access(&mut self, core: &mut CogCore, bus: &mut HubBus) {
        if core.state != CogRunState::ExecInterpreter || !self.fetch_ready {
            return;
        }
        self.fetch_ready = false;
        let address = core.pc;
        let op = Self::fetch(core, bus);
        match self.execute(core, bus, op) {
            Outcome::Continue => {
                core.state = CogRunState::WaitInterpreter;
                core.state_count = BYTECODE_TICKS;
            }
            Outcome::Waiting => {}
            Outcome::Unsupported => {
                event!(
                    Level::WARN,
                    "cog {}: unsupported bytecode {:#04x} at {:#06x}; stopping the cog",
                    core.id,
                    op,
                    address
                );
                bus.stop_cog(core.id);
            }
        }
    }
}
