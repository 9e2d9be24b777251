//! Emulates a cog.
//!
//! A cog is one of the eight processors.  Each has 512 longs of
//! register memory (the last sixteen of which are I/O registers), two
//! counters, a video generator and a PLL.
//!
//! A freshly started cog first copies its parameter and program from
//! hub memory, one long per hub access:
//!
//! - In `WaitLoadParam` it reads the long at the parameter address
//!   into PAR.
//! - In `WaitLoadProgram` it reads 0x1F0 longs from the program
//!   address into registers 0x000 to 0x1EF.  When the last one has
//!   been read the execution engine's boot hook is called.
//!
//! What happens after that is up to the execution engine.  Cogs
//! started at the interpreter's ROM address run the bytecode
//! interpreter ([`interpreter`]); all others execute native
//! instructions ([`native`]).  Both engines share the state held in
//! [`CogCore`]: the register file, the program cursor, the run state
//! and the I/O hardware.
use std::fmt::{self, Display, Formatter};

use serde::Serialize;
use tracing::{event, Level};

use base::prelude::*;

use super::clock::ClockSource;
use super::context::Context;
use super::freqgen::FreqGenerator;
use super::hub::HubBus;
use super::pll::PllGroup;
use super::rom::INTERPRETER_ADDRESS;
use super::video::VideoGenerator;

mod interpreter;
mod native;
#[cfg(test)]
mod tests;

use interpreter::Interpreter;
use native::NativeEngine;

/// Number of longs loaded from the hub when a cog starts.
pub const COG_PROGRAM_LONGS: u32 = 0x1F0;

/// The run state of a cog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CogRunState {
    /// About to execute the instruction at the program cursor.
    Execute,
    /// Loading PAR.
    WaitLoadParam,
    /// Loading the register file.
    WaitLoadProgram,
    /// An instruction is taking its allotted number of cycles.
    WaitCycles,
    /// Waiting a fixed number of cycles before entering the state
    /// held in `next_state`.
    WaitPrewait,
    BootInterpreter,
    /// The interpreter is working on a bytecode.
    WaitInterpreter,
    /// The interpreter is about to fetch a bytecode.
    ExecInterpreter,
    WaitPeq,
    WaitPne,
    WaitCnt,
    WaitVid,
    HubRdbyte,
    HubRdword,
    HubRdlong,
    HubHubop,
}

impl CogRunState {
    /// True for the two states in which a cog sits between
    /// instructions.
    #[must_use]
    pub fn is_instruction_boundary(&self) -> bool {
        matches!(self, CogRunState::Execute | CogRunState::ExecInterpreter)
    }
}

impl Display for CogRunState {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        f.write_str(match self {
            CogRunState::HubHubop
            | CogRunState::HubRdbyte
            | CogRunState::HubRdword
            | CogRunState::HubRdlong => "Waiting for hub",
            CogRunState::BootInterpreter => "Interpreter Boot",
            CogRunState::ExecInterpreter => "Interpreter Fetch",
            CogRunState::WaitInterpreter => "Interpreter Processing",
            CogRunState::Execute | CogRunState::WaitPrewait | CogRunState::WaitCycles => {
                "Running instruction"
            }
            CogRunState::WaitLoadParam => "Loading Parameter",
            CogRunState::WaitLoadProgram => "Loading Program",
            CogRunState::WaitCnt => "Waiting (CNT)",
            CogRunState::WaitPeq => "Waiting (PEQ)",
            CogRunState::WaitPne => "Waiting (PNE)",
            CogRunState::WaitVid => "Waiting (video)",
        })
    }
}

/// What a cog in one of the `Wait*` states is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WaitCondition {
    Nothing,
    /// (IN & mask) compared against value, on port A or B.
    Pins { value: u32, mask: u32, port_b: bool },
    Count(u32),
}

/// A snapshot of a cog's state, for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CogStatus {
    pub id: usize,
    pub state: CogRunState,
    pub description: String,
    pub program_cursor: u32,
    pub breakpoint: Option<u32>,
    pub interpreted: bool,
    pub zero: Option<bool>,
    pub carry: Option<bool>,
    pub program_address: u32,
    pub param_address: u32,
}

/// The parts of a cog shared by both execution engines.
#[derive(Debug)]
pub(crate) struct CogCore {
    pub(crate) id: usize,
    memory: Box<[u32; COG_REGISTER_COUNT]>,
    pub(crate) pc: u32,
    pub(crate) state: CogRunState,
    pub(crate) next_state: CogRunState,
    pub(crate) state_count: u32,
    pub(crate) program_address: u32,
    pub(crate) param_address: u32,
    boot_program: u32,
    pub(crate) breakpoint: Option<u32>,
    pub(crate) wait: WaitCondition,
    freq_a: FreqGenerator,
    freq_b: FreqGenerator,
    pll: PllGroup<VideoGenerator>,
    system_frequency: u32,
}

impl CogCore {
    fn new(ctx: &Context, id: usize, program: u32, param: u32) -> CogCore {
        let mut pll = PllGroup::new();
        pll.attach(VideoGenerator::new());
        CogCore {
            id,
            memory: Box::new([0; COG_REGISTER_COUNT]),
            pc: 0,
            state: CogRunState::WaitLoadParam,
            next_state: CogRunState::WaitLoadParam,
            state_count: 0,
            program_address: program & 0xFFFC,
            param_address: param & 0xFFFC,
            boot_program: program & 0xFFFC,
            breakpoint: None,
            wait: WaitCondition::Nothing,
            freq_a: FreqGenerator::new(ctx),
            freq_b: FreqGenerator::new(ctx),
            pll,
            system_frequency: ctx.boot_frequency,
        }
    }

    /// Reads a register through the special-register dispatch.
    /// Addresses beyond the register file read as 0x55.
    pub(crate) fn read_register(&self, address: u32) -> u32 {
        match SpecialRegister::from_address(address) {
            Some(SpecialRegister::CTRA) => self.freq_a.control(),
            Some(SpecialRegister::CTRB) => self.freq_b.control(),
            Some(SpecialRegister::FRQA) => self.freq_a.frequency(),
            Some(SpecialRegister::FRQB) => self.freq_b.frequency(),
            Some(SpecialRegister::PHSA) => self.freq_a.phase(),
            Some(SpecialRegister::PHSB) => self.freq_b.phase(),
            _ => match self.memory.get(address as usize) {
                Some(value) => *value,
                None => UNDECODED_REGISTER_VALUE,
            },
        }
    }

    /// Writes a register through the special-register dispatch.
    /// Writes to read-only registers and to addresses beyond the
    /// register file have no effect.
    pub(crate) fn write_register(&mut self, address: u32, value: u32) {
        let index = address as usize;
        if index >= COG_REGISTER_COUNT {
            return;
        }
        match SpecialRegister::from_address(address) {
            Some(reg) if reg.is_read_only() => {}
            Some(SpecialRegister::CTRA) => {
                self.freq_a.set_control(value);
                self.retune_pll();
            }
            Some(SpecialRegister::CTRB) => self.freq_b.set_control(value),
            Some(SpecialRegister::FRQA) => {
                self.freq_a.set_frequency(value);
                self.retune_pll();
            }
            Some(SpecialRegister::FRQB) => self.freq_b.set_frequency(value),
            Some(SpecialRegister::PHSA) => self.freq_a.set_phase(value),
            Some(SpecialRegister::PHSB) => self.freq_b.set_phase(value),
            Some(SpecialRegister::VCFG) => {
                self.memory[index] = value;
                if let Some(video) = self.video_mut() {
                    video.set_config(value);
                }
            }
            Some(SpecialRegister::VSCL) => {
                self.memory[index] = value;
                if let Some(video) = self.video_mut() {
                    video.set_scale(value);
                }
            }
            _ => self.memory[index] = value,
        }
    }

    /// Copies the hub's counter and pin state into CNT, INA and INB.
    fn sync_inputs(&mut self, bus: &HubBus) {
        self.memory[SpecialRegister::CNT.address() as usize] = bus.counter;
        self.memory[SpecialRegister::INA.address() as usize] = bus.pins_in as u32;
        self.memory[SpecialRegister::INB.address() as usize] = (bus.pins_in >> 32) as u32;
    }

    fn set_par(&mut self, value: u32) {
        self.memory[SpecialRegister::PAR.address() as usize] = value;
    }

    pub(crate) fn video(&self) -> Option<&VideoGenerator> {
        self.pll.attached().first()
    }

    pub(crate) fn video_mut(&mut self) -> Option<&mut VideoGenerator> {
        self.pll.attached_mut().first_mut()
    }

    fn retune_pll(&mut self) {
        let frequency = self.freq_a.pll_frequency();
        self.pll.set_frequency(frequency);
    }

    fn set_clock(&mut self, frequency: u32) {
        self.system_frequency = frequency;
        self.freq_a.set_clock(frequency);
        self.freq_b.set_clock(frequency);
        self.retune_pll();
    }

    /// Spends `cycles` ticks (including the current one) in
    /// `WaitCycles` before returning to `Execute`.
    pub(crate) fn wait_cycles(&mut self, cycles: u32) {
        self.wait_more(cycles.saturating_sub(1));
    }

    /// Spends the next `ticks` ticks in `WaitCycles`.
    pub(crate) fn wait_more(&mut self, ticks: u32) {
        self.state = CogRunState::WaitCycles;
        self.state_count = ticks;
    }

    /// Spends `cycles` ticks (including the current one) in
    /// `WaitPrewait` and then enters `next`.
    pub(crate) fn prewait(&mut self, cycles: u32, next: CogRunState) {
        self.state = CogRunState::WaitPrewait;
        self.state_count = cycles.saturating_sub(1);
        self.next_state = next;
    }

    /// Decrements the state counter, entering `then` when it runs
    /// out.
    pub(crate) fn count_down(&mut self, then: CogRunState) {
        if self.state_count <= 1 {
            self.state_count = 0;
            self.state = then;
        } else {
            self.state_count -= 1;
        }
    }

    /// Determines whether the condition a waiting cog is waiting for
    /// has come about.
    pub(crate) fn wait_satisfied(&self, bus: &HubBus) -> bool {
        match (self.state, self.wait) {
            (
                CogRunState::WaitPeq | CogRunState::WaitPne,
                WaitCondition::Pins {
                    value,
                    mask,
                    port_b,
                },
            ) => {
                let pins = if port_b {
                    (bus.pins_in >> 32) as u32
                } else {
                    bus.pins_in as u32
                };
                let equal = pins & mask == value;
                equal == (self.state == CogRunState::WaitPeq)
            }
            (CogRunState::WaitCnt, WaitCondition::Count(target)) => bus.counter == target,
            (CogRunState::WaitVid, _) => self.video().map_or(true, |v| !v.is_busy()),
            _ => true,
        }
    }

    fn out(&self) -> u64 {
        let outa = self.memory[SpecialRegister::OUTA.address() as usize];
        let outb = self.memory[SpecialRegister::OUTB.address() as usize];
        let video = self.video().map_or(0, VideoGenerator::output);
        u64::from(outa)
            | (u64::from(outb) << 32)
            | self.freq_a.output()
            | self.freq_b.output()
            | video
    }

    fn dir(&self) -> u64 {
        let dira = self.memory[SpecialRegister::DIRA.address() as usize];
        let dirb = self.memory[SpecialRegister::DIRB.address() as usize];
        u64::from(dira) | (u64::from(dirb) << 32)
    }
}

/// The interface between a cog and the engine which executes its
/// program.
pub(crate) trait ExecutionEngine {
    /// Called when the cog has finished loading its registers, during
    /// the same tick.
    fn boot(&mut self, core: &mut CogCore, bus: &mut HubBus);

    /// Called on every tick after loading has finished.
    fn do_instruction(&mut self, core: &mut CogCore, bus: &mut HubBus);

    /// Called on ticks where this cog holds the hub, after loading
    /// has finished.
    fn hub_access(&mut self, _core: &mut CogCore, _bus: &mut HubBus) {}

    fn flags(&self) -> Option<(bool, bool)> {
        None
    }
}

#[derive(Debug)]
enum Engine {
    Native(NativeEngine),
    Interpreted(Interpreter),
}

impl Engine {
    fn get(&mut self) -> &mut dyn ExecutionEngine {
        match self {
            Engine::Native(e) => e,
            Engine::Interpreted(e) => e,
        }
    }

    fn flags(&self) -> Option<(bool, bool)> {
        match self {
            Engine::Native(e) => e.flags(),
            Engine::Interpreted(e) => e.flags(),
        }
    }
}

#[derive(Debug)]
pub struct Cog {
    core: CogCore,
    engine: Engine,
}

impl Cog {
    /// Creates a cog which will load its program from `program` and
    /// its parameter from `param`.  The cog starts in
    /// `WaitLoadParam`.
    #[must_use]
    pub fn new(ctx: &Context, id: usize, program: u32, param: u32, system_frequency: u32) -> Cog {
        let engine = if program & 0xFFFC == INTERPRETER_ADDRESS {
            Engine::Interpreted(Interpreter::default())
        } else {
            Engine::Native(NativeEngine::default())
        };
        let mut core = CogCore::new(ctx, id, program, param);
        core.set_clock(system_frequency);
        event!(
            Level::DEBUG,
            "cog {} created ({}, program {:#06x}, parameter {:#06x})",
            id,
            if matches!(engine, Engine::Interpreted(_)) {
                "interpreted"
            } else {
                "native"
            },
            program,
            param
        );
        Cog { core, engine }
    }

    #[must_use]
    pub fn id(&self) -> usize {
        self.core.id
    }

    #[must_use]
    pub fn state(&self) -> CogRunState {
        self.core.state
    }

    #[must_use]
    pub fn is_interpreted(&self) -> bool {
        matches!(self.engine, Engine::Interpreted(_))
    }

    /// Reads a register.  CNT, INA and INB hold the values seen by
    /// the cog during the most recent tick.
    #[must_use]
    pub fn register(&self, address: u32) -> u32 {
        self.core.read_register(address)
    }

    /// Writes a register, with the same effects as an instruction
    /// writing it.
    pub fn set_register(&mut self, address: u32, value: u32) {
        self.core.write_register(address, value);
    }

    /// For a native cog, the address of the next instruction in the
    /// register file.  For an interpreted cog, the hub address of the
    /// next bytecode.
    #[must_use]
    pub fn program_cursor(&self) -> u32 {
        self.core.pc
    }

    pub fn set_program_cursor(&mut self, pc: u32) {
        self.core.pc = pc;
    }

    #[must_use]
    pub fn breakpoint(&self) -> Option<u32> {
        self.core.breakpoint
    }

    /// Sets the address at which [`crate::Propeller::step`] halts.
    /// The halt happens when the cog arrives there, so setting a
    /// breakpoint at the address the cog is already waiting at takes
    /// effect only once it returns to it.
    pub fn set_breakpoint(&mut self, breakpoint: Option<u32>) {
        self.core.breakpoint = breakpoint;
    }

    /// The zero and carry flags of a native cog.
    #[must_use]
    pub fn flags(&self) -> Option<(bool, bool)> {
        self.engine.flags()
    }

    /// The zero flag of a native cog.
    #[must_use]
    pub fn zero_flag(&self) -> Option<bool> {
        self.flags().map(|(z, _)| z)
    }

    /// The carry flag of a native cog.
    #[must_use]
    pub fn carry_flag(&self) -> Option<bool> {
        self.flags().map(|(_, c)| c)
    }

    /// The combined output of the OUT registers, the counters and the
    /// video generator.
    #[must_use]
    pub fn out(&self) -> u64 {
        self.core.out()
    }

    #[must_use]
    pub fn outa(&self) -> u32 {
        self.core.out() as u32
    }

    #[must_use]
    pub fn outb(&self) -> u32 {
        (self.core.out() >> 32) as u32
    }

    #[must_use]
    pub fn dir(&self) -> u64 {
        self.core.dir()
    }

    #[must_use]
    pub fn dira(&self) -> u32 {
        self.core.dir() as u32
    }

    #[must_use]
    pub fn dirb(&self) -> u32 {
        (self.core.dir() >> 32) as u32
    }

    #[must_use]
    pub fn freq_a(&self) -> &FreqGenerator {
        &self.core.freq_a
    }

    #[must_use]
    pub fn freq_b(&self) -> &FreqGenerator {
        &self.core.freq_b
    }

    /// The video generator, unless it has been detached.
    #[must_use]
    pub fn video(&self) -> Option<&VideoGenerator> {
        self.core.video()
    }

    #[must_use]
    pub fn at_instruction_boundary(&self) -> bool {
        self.core.state.is_instruction_boundary()
    }

    #[must_use]
    pub fn status(&self) -> CogStatus {
        CogStatus {
            id: self.core.id,
            state: self.core.state,
            description: self.core.state.to_string(),
            program_cursor: self.core.pc,
            breakpoint: self.core.breakpoint,
            interpreted: self.is_interpreted(),
            zero: self.zero_flag(),
            carry: self.carry_flag(),
            program_address: self.core.boot_program,
            param_address: self.core.param_address,
        }
    }

    /// Performs this cog's part of a tick: the engine's work, then
    /// one clock for each counter and the PLL.
    pub(crate) fn step(&mut self, bus: &mut HubBus) {
        self.core.sync_inputs(bus);
        match self.core.state {
            CogRunState::WaitLoadParam | CogRunState::WaitLoadProgram => {}
            _ => self.engine.get().do_instruction(&mut self.core, bus),
        }
        self.core.freq_a.tick(bus.pins_in);
        self.core.freq_b.tick(bus.pins_in);
        self.core.retune_pll();
        if self.core.system_frequency > 0 {
            let period = 1.0 / f64::from(self.core.system_frequency);
            self.core.pll.advance(period);
        }
    }

    /// Called on the tick in which this cog holds the hub.
    pub(crate) fn hub_access(&mut self, bus: &mut HubBus) {
        self.core.sync_inputs(bus);
        match self.core.state {
            CogRunState::WaitLoadParam => {
                let par = bus.memory.read_long(self.core.param_address);
                self.core.set_par(par);
                self.core.state = CogRunState::WaitLoadProgram;
                self.core.state_count = 0;
            }
            CogRunState::WaitLoadProgram => {
                let value = bus.memory.read_long(self.core.program_address);
                self.core.memory[self.core.state_count as usize] = value;
                self.core.program_address = (self.core.program_address + 4) & 0xFFFF;
                self.core.state_count += 1;
                if self.core.state_count == COG_PROGRAM_LONGS {
                    self.core.state_count = 0;
                    event!(Level::DEBUG, "cog {} loaded, booting", self.core.id);
                    self.engine.get().boot(&mut self.core, bus);
                }
            }
            _ => self.engine.get().hub_access(&mut self.core, bus),
        }
    }

    pub(crate) fn set_clock(&mut self, frequency: u32) {
        self.core.set_clock(frequency);
    }

    /// Releases the PLL and video hardware.  Called when the cog
    /// stops; the video generator receives no further clocks.
    pub(crate) fn detach_video_hooks(&mut self) {
        if let Some(video) = self.core.video_mut() {
            video.detach_aural();
        }
        self.core.pll.destroy();
    }
}
