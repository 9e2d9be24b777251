//! Executes native cog instructions.
//!
//! An ordinary instruction executes on the first tick of the
//! `Execute` state and then spends the rest of its four cycles in
//! `WaitCycles`.  Hub instructions (RDBYTE, RDWORD, RDLONG, their
//! write forms and HUBOP) wait in one of the `Hub*` states until the
//! cog is granted the hub, and complete then.  WAITPEQ, WAITPNE,
//! WAITCNT and WAITVID go through `WaitPrewait` before waiting for
//! their condition.
use tracing::{event, Level};

use base::prelude::*;

use super::{CogCore, CogRunState, ExecutionEngine, WaitCondition};
use crate::hub::{decode_coginit, HubBus};

/// Cycles taken by an ordinary instruction, and by one whose
/// condition is false.
const INSTRUCTION_CYCLES: u32 = 4;

/// Cycles taken by DJNZ, TJNZ and TJZ when they do not jump.
const JUMP_NOT_TAKEN_CYCLES: u32 = 8;

/// Ticks a hub instruction takes after the cog has been granted the
/// hub.
const HUB_COMPLETION_TICKS: u32 = 7;

/// Cycles spent in `WaitPrewait` before a wait instruction begins
/// checking its condition.
const PREWAIT_CYCLES: u32 = 4;

#[derive(Debug, Clone, Copy)]
struct PendingHubOp {
    instruction: Instruction,
    dest: u32,
    src: u32,
}

#[derive(Debug, Default)]
pub(crate) struct NativeEngine {
    zero: bool,
    carry: bool,
    pending: Option<PendingHubOp>,
}

fn parity(value: u32) -> bool {
    value.count_ones() & 1 != 0
}

fn sign_bit(value: u32) -> bool {
    value & 0x8000_0000 != 0
}

impl NativeEngine {
    fn write_back(
        &mut self,
        core: &mut CogCore,
        instruction: Instruction,
        result: u32,
        zero: bool,
        carry: bool,
    ) {
        if instruction.write_result() {
            core.write_register(instruction.dest(), result);
        }
        if instruction.write_zero() {
            self.zero = zero;
        }
        if instruction.write_carry() {
            self.carry = carry;
        }
    }

    fn execute(&mut self, core: &mut CogCore) {
        let instruction = Instruction::new(core.read_register(core.pc));
        core.pc = (core.pc + 1) & 0x1FF;
        if !instruction.condition().evaluate(self.zero, self.carry) {
            core.wait_cycles(INSTRUCTION_CYCLES);
            return;
        }
        let dest = core.read_register(instruction.dest());
        let src = if instruction.immediate() {
            instruction.src()
        } else {
            core.read_register(instruction.src())
        };
        let opcode = instruction.opcode();
        match opcode {
            Opcode::Rdbyte | Opcode::Rdword | Opcode::Rdlong | Opcode::Hubop => {
                self.pending = Some(PendingHubOp {
                    instruction,
                    dest,
                    src,
                });
                core.state = match opcode {
                    Opcode::Rdbyte => CogRunState::HubRdbyte,
                    Opcode::Rdword => CogRunState::HubRdword,
                    Opcode::Rdlong => CogRunState::HubRdlong,
                    _ => CogRunState::HubHubop,
                };
            }
            Opcode::Mul | Opcode::Muls | Opcode::Enc | Opcode::Ones => {
                event!(
                    Level::WARN,
                    "cog {}: {} is not implemented by the hardware; treating it as NOP",
                    core.id,
                    opcode.mnemonic(instruction.write_result())
                );
                core.wait_cycles(INSTRUCTION_CYCLES);
            }
            Opcode::Jmpret => {
                let result = (dest & !0x1FF) | core.pc;
                core.pc = src & 0x1FF;
                self.write_back(core, instruction, result, result == 0, self.carry);
                core.wait_cycles(INSTRUCTION_CYCLES);
            }
            Opcode::Djnz => {
                let result = dest.wrapping_sub(1);
                self.write_back(core, instruction, result, result == 0, dest == 0);
                self.conditional_jump(core, result != 0, src);
            }
            Opcode::Tjnz | Opcode::Tjz => {
                self.write_back(core, instruction, dest, dest == 0, false);
                let jump = (dest != 0) == (opcode == Opcode::Tjnz);
                self.conditional_jump(core, jump, src);
            }
            Opcode::Waitpeq | Opcode::Waitpne => {
                // The C effect bit selects port B; the flags are not
                // written.
                if instruction.write_result() {
                    core.write_register(instruction.dest(), dest);
                }
                core.wait = WaitCondition::Pins {
                    value: dest,
                    mask: src,
                    port_b: instruction.write_carry(),
                };
                let next = if opcode == Opcode::Waitpeq {
                    CogRunState::WaitPeq
                } else {
                    CogRunState::WaitPne
                };
                core.prewait(PREWAIT_CYCLES, next);
            }
            Opcode::Waitcnt => {
                let (result, carry) = dest.overflowing_add(src);
                self.write_back(core, instruction, result, result == 0, carry);
                core.wait = WaitCondition::Count(dest);
                core.prewait(PREWAIT_CYCLES, CogRunState::WaitCnt);
            }
            Opcode::Waitvid => {
                self.write_back(core, instruction, dest, dest == 0, false);
                let fed = match core.video_mut() {
                    Some(video) if video.enabled() => {
                        video.feed(dest, src);
                        true
                    }
                    _ => false,
                };
                if fed {
                    core.wait = WaitCondition::Nothing;
                    core.prewait(PREWAIT_CYCLES, CogRunState::WaitVid);
                } else {
                    core.wait_cycles(INSTRUCTION_CYCLES);
                }
            }
            _ => {
                let (result, zero, carry) = self.alu(opcode, dest, src);
                self.write_back(core, instruction, result, zero, carry);
                core.wait_cycles(INSTRUCTION_CYCLES);
            }
        }
    }

    fn conditional_jump(&self, core: &mut CogCore, jump: bool, target: u32) {
        if jump {
            core.pc = target & 0x1FF;
            core.wait_cycles(INSTRUCTION_CYCLES);
        } else {
            core.wait_cycles(JUMP_NOT_TAKEN_CYCLES);
        }
    }

    /// Computes the result and the new Z and C flags of an
    /// instruction which only affects its destination register.
    /// Instructions with other effects are handled by `execute`.
    fn alu(&self, opcode: Opcode, d: u32, s: u32) -> (u32, bool, bool) {
        let shift = s & 0x1F;
        let c = self.carry;
        let z = self.zero;
        let logic = |r: u32| (r, r == 0, parity(r));
        let sum = |r: u32, overflow: bool| (r, r == 0, overflow);
        let signed_add = |subtract: bool| {
            let (r, overflow) = if subtract {
                (d as i32).overflowing_sub(s as i32)
            } else {
                (d as i32).overflowing_add(s as i32)
            };
            sum(r as u32, overflow)
        };
        let negate_if = |negate: bool| {
            let r = if negate { s.wrapping_neg() } else { s };
            (r, r == 0, sign_bit(s))
        };
        match opcode {
            Opcode::Ror => sum(d.rotate_right(shift), d & 1 != 0),
            Opcode::Rol => sum(d.rotate_left(shift), sign_bit(d)),
            Opcode::Shr => sum(d >> shift, d & 1 != 0),
            Opcode::Shl => sum(d << shift, sign_bit(d)),
            Opcode::Rcr => {
                let fill = if c && shift != 0 {
                    !(u32::MAX >> shift)
                } else {
                    0
                };
                sum((d >> shift) | fill, d & 1 != 0)
            }
            Opcode::Rcl => {
                let fill = if c { (1_u32 << shift) - 1 } else { 0 };
                sum((d << shift) | fill, sign_bit(d))
            }
            Opcode::Sar => sum(((d as i32) >> shift) as u32, d & 1 != 0),
            Opcode::Rev => sum(d.reverse_bits() >> shift, d & 1 != 0),
            Opcode::Mins => {
                let less = (d as i32) < (s as i32);
                sum(if less { s } else { d }, less)
            }
            Opcode::Maxs => {
                let less = (d as i32) < (s as i32);
                sum(if less { d } else { s }, less)
            }
            Opcode::Min => sum(d.max(s), d < s),
            Opcode::Max => sum(d.min(s), d < s),
            Opcode::Movs => {
                let r = (d & !0x1FF) | (s & 0x1FF);
                (r, r == 0, c)
            }
            Opcode::Movd => {
                let r = (d & !(0x1FF << 9)) | ((s & 0x1FF) << 9);
                (r, r == 0, c)
            }
            Opcode::Movi => {
                let r = (d & !(0x1FF << 23)) | ((s & 0x1FF) << 23);
                (r, r == 0, c)
            }
            Opcode::And => logic(d & s),
            Opcode::Andn => logic(d & !s),
            Opcode::Or => logic(d | s),
            Opcode::Xor => logic(d ^ s),
            Opcode::Muxc | Opcode::Muxnc | Opcode::Muxz | Opcode::Muxnz => {
                let set = match opcode {
                    Opcode::Muxc => c,
                    Opcode::Muxnc => !c,
                    Opcode::Muxz => z,
                    _ => !z,
                };
                logic(if set { d | s } else { d & !s })
            }
            Opcode::Add => {
                let (r, carry) = d.overflowing_add(s);
                sum(r, carry)
            }
            Opcode::Sub => {
                let (r, borrow) = d.overflowing_sub(s);
                sum(r, borrow)
            }
            Opcode::Addabs | Opcode::Subabs => {
                let magnitude = (s as i32).unsigned_abs();
                let add = (opcode == Opcode::Addabs) != sign_bit(s);
                let (r, carry) = if add {
                    d.overflowing_add(magnitude)
                } else {
                    d.overflowing_sub(magnitude)
                };
                sum(r, carry)
            }
            Opcode::Sumc | Opcode::Sumnc | Opcode::Sumz | Opcode::Sumnz => {
                let subtract = match opcode {
                    Opcode::Sumc => c,
                    Opcode::Sumnc => !c,
                    Opcode::Sumz => z,
                    _ => !z,
                };
                signed_add(subtract)
            }
            Opcode::Mov => (s, s == 0, sign_bit(s)),
            Opcode::Neg => negate_if(true),
            Opcode::Abs => negate_if(sign_bit(s)),
            Opcode::Absneg => negate_if(!sign_bit(s)),
            Opcode::Negc => negate_if(c),
            Opcode::Negnc => negate_if(!c),
            Opcode::Negz => negate_if(z),
            Opcode::Negnz => negate_if(!z),
            Opcode::Cmps => {
                let r = d.wrapping_sub(s);
                (r, d == s, (d as i32) < (s as i32))
            }
            Opcode::Cmpsx | Opcode::Subsx => {
                let difference = i64::from(d as i32) - i64::from(s as i32) - i64::from(c);
                let r = difference as u32;
                let carry = if opcode == Opcode::Cmpsx {
                    difference < 0
                } else {
                    difference < i64::from(i32::MIN) || difference > i64::from(i32::MAX)
                };
                (r, z && r == 0, carry)
            }
            Opcode::Addx => {
                let total = u64::from(d) + u64::from(s) + u64::from(c);
                let r = total as u32;
                (r, z && r == 0, total > u64::from(u32::MAX))
            }
            Opcode::Subx => {
                let subtrahend = u64::from(s) + u64::from(c);
                let r = d.wrapping_sub(s).wrapping_sub(u32::from(c));
                (r, z && r == 0, u64::from(d) < subtrahend)
            }
            Opcode::Adds => signed_add(false),
            Opcode::Subs => signed_add(true),
            Opcode::Addsx => {
                let total = i64::from(d as i32) + i64::from(s as i32) + i64::from(c);
                let r = total as u32;
                let overflow = total < i64::from(i32::MIN) || total > i64::from(i32::MAX);
                (r, z && r == 0, overflow)
            }
            Opcode::Cmpsub => {
                if d >= s {
                    sum(d - s, true)
                } else {
                    sum(d, false)
                }
            }
            _ => (d, z, c),
        }
    }

    fn hub_operation(
        &mut self,
        core: &CogCore,
        bus: &mut HubBus,
        op: PendingHubOp,
    ) -> (u32, bool, bool) {
        let dest = op.dest;
        match HubOp::from_bits(op.src) {
            HubOp::Clkset => {
                bus.set_clock_mode(ClockMode::new((dest & 0xFF) as u8));
                (dest, dest == 0, false)
            }
            HubOp::Cogid => {
                let id = core.id as u32;
                (id, id == 0, false)
            }
            HubOp::Coginit => {
                let (program, param, target) = decode_coginit(dest);
                match bus.start_cog(program, param, target) {
                    Some(id) => (id as u32, id == 0, false),
                    None => (7, false, true),
                }
            }
            HubOp::Cogstop => {
                bus.stop_cog((dest & 7) as usize);
                (dest, dest & 7 == 0, false)
            }
            HubOp::Locknew => match bus.locks.allocate() {
                Some(id) => (id, id == 0, false),
                None => (7, false, true),
            },
            HubOp::Lockret => {
                bus.locks.release(dest);
                (dest, dest & 7 == 0, false)
            }
            HubOp::Lockset => {
                let previous = bus.locks.set(dest);
                (dest, dest & 7 == 0, previous)
            }
            HubOp::Lockclr => {
                let previous = bus.locks.clear(dest);
                (dest, dest & 7 == 0, previous)
            }
        }
    }
}

impl ExecutionEngine for NativeEngine {
    fn boot(&mut self, core: &mut CogCore, _bus: &mut HubBus) {
        core.pc = 0;
        self.zero = false;
        self.carry = false;
        self.pending = None;
        core.state = CogRunState::Execute;
    }

    fn do_instruction(&mut self, core: &mut CogCore, bus: &mut HubBus) {
        match core.state {
            CogRunState::Execute => self.execute(core),
            CogRunState::WaitCycles => core.count_down(CogRunState::Execute),
            CogRunState::WaitPrewait => {
                let next = core.next_state;
                core.count_down(next);
            }
            CogRunState::WaitPeq
            | CogRunState::WaitPne
            | CogRunState::WaitCnt
            | CogRunState::WaitVid => {
                if core.wait_satisfied(bus) {
                    core.wait = WaitCondition::Nothing;
                    core.state = CogRunState::Execute;
                }
            }
            CogRunState::HubRdbyte
            | CogRunState::HubRdword
            | CogRunState::HubRdlong
            | CogRunState::HubHubop
            | CogRunState::WaitLoadParam
            | CogRunState::WaitLoadProgram
            | CogRunState::BootInterpreter
            | CogRunState::WaitInterpreter
            | CogRunState::ExecInterpreter => {}
        }
    }

    fn hub_access(&mut self, core: &mut CogCore, bus: &mut HubBus) {
        let op = match (core.state, self.pending) {
            (
                CogRunState::HubRdbyte
                | CogRunState::HubRdword
                | CogRunState::HubRdlong
                | CogRunState::HubHubop,
                Some(op),
            ) => op,
            _ => return,
        };
        self.pending = None;
        let reading = op.instruction.write_result();
        let address = op.src;
        let (result, zero, carry) = match op.instruction.opcode() {
            Opcode::Rdbyte if reading => {
                let value = u32::from(bus.memory.read_byte(address));
                (value, value == 0, self.carry)
            }
            Opcode::Rdword if reading => {
                let value = u32::from(bus.memory.read_word(address));
                (value, value == 0, self.carry)
            }
            Opcode::Rdlong if reading => {
                let value = bus.memory.read_long(address);
                (value, value == 0, self.carry)
            }
            Opcode::Rdbyte => {
                bus.memory.write_byte(address, (op.dest & 0xFF) as u8);
                (op.dest, op.dest == 0, self.carry)
            }
            Opcode::Rdword => {
                bus.memory.write_word(address, (op.dest & 0xFFFF) as u16);
                (op.dest, op.dest == 0, self.carry)
            }
            Opcode::Rdlong => {
                bus.memory.write_long(address, op.dest);
                (op.dest, op.dest == 0, self.carry)
            }
            _ => self.hub_operation(core, bus, op),
        };
        self.write_back(core, op.instruction, result, zero, carry);
        core.wait_more(HUB_COMPLETION_TICKS);
    }

    fn flags(&self) -> Option<(bool, bool)> {
        Some((self.zero, self.carry))
    }
}
