use base::prelude::*;

use super::*;
use crate::freqgen::CounterMode;
use crate::hub::{ClockConfig, CogRequest, HubBus};

const PROGRAM: u32 = 0x100;
const PARAM: u32 = 0x40;

fn bus() -> HubBus {
    HubBus::new(ClockConfig {
        mode: ClockMode::new(0),
        crystal: 0,
        frequency: RCFAST_FREQUENCY,
    })
}

/// Grants the hub to a cog until it has finished loading, returning
/// the number of hub accesses needed.
fn load(cog: &mut Cog, bus: &mut HubBus) -> u32 {
    let mut accesses = 0;
    while matches!(
        cog.state(),
        CogRunState::WaitLoadParam | CogRunState::WaitLoadProgram
    ) {
        cog.hub_access(bus);
        accesses += 1;
        assert!(accesses <= COG_PROGRAM_LONGS + 1, "cog never finished loading");
    }
    accesses
}

fn native_cog_with_id(bus: &mut HubBus, id: usize, program: &[Instruction]) -> Cog {
    for (i, instruction) in (0_u32..).zip(program) {
        bus.memory.write_long(PROGRAM + 4 * i, instruction.bits());
    }
    let mut cog = Cog::new(&Context::default(), id, PROGRAM, PARAM, RCFAST_FREQUENCY);
    load(&mut cog, bus);
    cog
}

fn native_cog(bus: &mut HubBus, program: &[Instruction]) -> Cog {
    native_cog_with_id(bus, 0, program)
}

/// Runs ticks, granting the hub on every one, until the cog is ready
/// to execute its next instruction.  Returns the number of ticks.
fn run_instruction(cog: &mut Cog, bus: &mut HubBus) -> u32 {
    let mut ticks = 0;
    loop {
        cog.step(bus);
        cog.hub_access(bus);
        ticks += 1;
        if cog.state() == CogRunState::Execute {
            return ticks;
        }
        assert!(ticks < 1000, "instruction did not complete");
    }
}

fn op(opcode: Opcode, effects: Effects, dest: u32, src: u32) -> Instruction {
    Instruction::assemble(opcode, effects, Condition::IF_ALWAYS, dest, src)
}

#[test]
fn test_load_reads_parameter_then_program() {
    let mut bus = bus();
    bus.memory.write_long(PARAM, 0xCAFE_F00D);
    bus.memory.write_long(PROGRAM, 0x1111_1111);
    bus.memory.write_long(PROGRAM + 4 * 0x1EF, 0x2222_2222);
    let mut cog = Cog::new(&Context::default(), 2, PROGRAM, PARAM, RCFAST_FREQUENCY);
    assert_eq!(cog.state(), CogRunState::WaitLoadParam);
    assert_eq!(load(&mut cog, &mut bus), 1 + COG_PROGRAM_LONGS);
    assert_eq!(cog.state(), CogRunState::Execute);
    assert_eq!(cog.program_cursor(), 0);
    assert_eq!(cog.register(SpecialRegister::PAR.address()), 0xCAFE_F00D);
    assert_eq!(cog.register(0), 0x1111_1111);
    assert_eq!(cog.register(0x1EF), 0x2222_2222);
}

#[test]
fn test_loading_cog_does_not_execute() {
    let mut bus = bus();
    let mut cog = Cog::new(&Context::default(), 0, PROGRAM, PARAM, RCFAST_FREQUENCY);
    for _ in 0..10 {
        cog.step(&mut bus);
    }
    assert_eq!(cog.state(), CogRunState::WaitLoadParam);
}

#[test]
fn test_register_beyond_file_reads_sentinel() {
    let mut bus = bus();
    let mut cog = native_cog(&mut bus, &[]);
    assert_eq!(cog.register(0x200), UNDECODED_REGISTER_VALUE);
    assert_eq!(cog.register(u32::MAX), UNDECODED_REGISTER_VALUE);
    cog.set_register(0x200, 1);
    assert_eq!(cog.register(0x200), UNDECODED_REGISTER_VALUE);
}

#[test]
fn test_read_only_registers_ignore_writes() {
    let mut bus = bus();
    bus.memory.write_long(PARAM, 77);
    let mut cog = native_cog(&mut bus, &[]);
    for reg in [
        SpecialRegister::PAR,
        SpecialRegister::CNT,
        SpecialRegister::INA,
        SpecialRegister::INB,
    ] {
        let before = cog.register(reg.address());
        cog.set_register(reg.address(), 0x1234_5678);
        assert_eq!(cog.register(reg.address()), before, "{reg} was written");
    }
    assert_eq!(cog.register(SpecialRegister::PAR.address()), 77);
}

#[test]
fn test_inputs_are_mirrored_each_tick() {
    let mut bus = bus();
    let mut cog = native_cog(&mut bus, &[]);
    bus.counter = 1234;
    bus.pins_in = 0x0000_0005_8000_0001;
    cog.step(&mut bus);
    assert_eq!(cog.register(SpecialRegister::CNT.address()), 1234);
    assert_eq!(cog.register(SpecialRegister::INA.address()), 0x8000_0001);
    assert_eq!(cog.register(SpecialRegister::INB.address()), 5);
}

#[test]
fn test_counter_registers_reach_the_generators() {
    let mut bus = bus();
    let mut cog = native_cog(&mut bus, &[]);
    cog.set_register(SpecialRegister::FRQA.address(), 7);
    cog.set_register(SpecialRegister::PHSB.address(), 9);
    cog.set_register(SpecialRegister::CTRA.address(), 4 << 26);
    assert_eq!(cog.register(SpecialRegister::FRQA.address()), 7);
    assert_eq!(cog.freq_a().frequency(), 7);
    assert_eq!(cog.register(SpecialRegister::PHSB.address()), 9);
    assert_eq!(cog.freq_a().mode(), CounterMode::NcoSingleEnded);
    assert_eq!(cog.freq_b().mode(), CounterMode::Off);
}

#[test]
fn test_video_configuration_is_forwarded() {
    let mut bus = bus();
    let mut cog = native_cog(&mut bus, &[]);
    assert!(!cog.video().map_or(true, VideoGenerator::enabled));
    cog.set_register(SpecialRegister::VCFG.address(), 1 << 29);
    assert_eq!(cog.register(SpecialRegister::VCFG.address()), 1 << 29);
    assert!(cog.video().map_or(false, VideoGenerator::enabled));
    cog.detach_video_hooks();
    assert!(cog.video().is_none());
}

#[test]
fn test_outputs_combine_both_ports() {
    let mut bus = bus();
    let mut cog = native_cog(&mut bus, &[]);
    cog.set_register(SpecialRegister::OUTA.address(), 1);
    cog.set_register(SpecialRegister::OUTB.address(), 2);
    cog.set_register(SpecialRegister::DIRA.address(), 3);
    assert_eq!(cog.out(), 1 | (2 << 32));
    assert_eq!(cog.outa(), 1);
    assert_eq!(cog.outb(), 2);
    assert_eq!(cog.dir(), 3);
    assert_eq!(cog.dirb(), 0);
}

#[test]
fn test_add_sets_zero_and_carry() {
    let mut bus = bus();
    let mut cog = native_cog(
        &mut bus,
        &[op(Opcode::Add, Effects::wr().with_wz().with_wc(), 0x10, 0x11)],
    );
    cog.set_register(0x10, u32::MAX);
    cog.set_register(0x11, 1);
    assert_eq!(run_instruction(&mut cog, &mut bus), 4);
    assert_eq!(cog.register(0x10), 0);
    assert_eq!(cog.flags(), Some((true, true)));
    assert_eq!(cog.program_cursor(), 1);
}

#[test]
fn test_compare_leaves_destination_alone() {
    let mut bus = bus();
    // cmp 0x10, #5 wz wc
    let mut cog = native_cog(
        &mut bus,
        &[op(
            Opcode::Sub,
            Effects::nr().with_immediate().with_wz().with_wc(),
            0x10,
            5,
        )],
    );
    cog.set_register(0x10, 3);
    run_instruction(&mut cog, &mut bus);
    assert_eq!(cog.register(0x10), 3);
    assert_eq!(cog.flags(), Some((false, true)));
}

#[test]
fn test_false_condition_takes_four_cycles() {
    let mut bus = bus();
    let instruction = Instruction::assemble(
        Opcode::Mov,
        Effects::wr().with_immediate(),
        Condition::IF_C,
        0x10,
        5,
    );
    let mut cog = native_cog(&mut bus, &[instruction]);
    assert_eq!(run_instruction(&mut cog, &mut bus), 4);
    assert_eq!(cog.register(0x10), 0);
    assert_eq!(cog.program_cursor(), 1);
}

#[test]
fn test_shift_left_carries_out_top_bit() {
    let mut bus = bus();
    let mut cog = native_cog(
        &mut bus,
        &[op(Opcode::Shl, Effects::wr().with_immediate().with_wc(), 0x10, 1)],
    );
    cog.set_register(0x10, 0x8000_0001);
    run_instruction(&mut cog, &mut bus);
    assert_eq!(cog.register(0x10), 2);
    assert_eq!(cog.flags(), Some((false, true)));
}

#[test]
fn test_logic_sets_carry_to_parity() {
    let mut bus = bus();
    let mut cog = native_cog(
        &mut bus,
        &[
            op(Opcode::And, Effects::wr().with_immediate().with_wc(), 0x10, 0b111),
            op(Opcode::And, Effects::wr().with_immediate().with_wc(), 0x10, 0b011),
        ],
    );
    cog.set_register(0x10, 0xFF);
    run_instruction(&mut cog, &mut bus);
    assert_eq!(cog.register(0x10), 0b111);
    assert_eq!(cog.flags(), Some((false, true)));
    run_instruction(&mut cog, &mut bus);
    assert_eq!(cog.register(0x10), 0b011);
    assert_eq!(cog.flags(), Some((false, false)));
}

#[test]
fn test_movs_keeps_carry() {
    let mut bus = bus();
    let mut cog = native_cog(
        &mut bus,
        &[
            op(Opcode::Shl, Effects::wr().with_immediate().with_wc(), 0x10, 1),
            op(Opcode::Movs, Effects::wr().with_immediate().with_wc(), 0x11, 0x1AB),
        ],
    );
    cog.set_register(0x10, 0x8000_0000);
    cog.set_register(0x11, 0xFFFF_FFFF);
    run_instruction(&mut cog, &mut bus);
    run_instruction(&mut cog, &mut bus);
    assert_eq!(cog.register(0x11), 0xFFFF_FFAB);
    assert_eq!(cog.flags(), Some((false, true)));
}

#[test]
fn test_djnz_timing() {
    let mut bus = bus();
    let mut cog = native_cog(
        &mut bus,
        &[op(Opcode::Djnz, Effects::wr().with_immediate(), 0x10, 0)],
    );
    cog.set_register(0x10, 2);
    assert_eq!(run_instruction(&mut cog, &mut bus), 4);
    assert_eq!(cog.program_cursor(), 0);
    assert_eq!(cog.register(0x10), 1);
    assert_eq!(run_instruction(&mut cog, &mut bus), 8);
    assert_eq!(cog.program_cursor(), 1);
    assert_eq!(cog.register(0x10), 0);
}

#[test]
fn test_jmpret_saves_return_address() {
    let mut bus = bus();
    let mut cog = native_cog(
        &mut bus,
        &[op(Opcode::Jmpret, Effects::wr().with_immediate(), 0x20, 5)],
    );
    cog.set_register(0x20, 0xFFFF_FE00);
    run_instruction(&mut cog, &mut bus);
    assert_eq!(cog.program_cursor(), 5);
    assert_eq!(cog.register(0x20), 0xFFFF_FE01);
}

#[test]
fn test_unimplemented_multiply_is_nop() {
    let mut bus = bus();
    let mut cog = native_cog(
        &mut bus,
        &[op(Opcode::Mul, Effects::wr().with_immediate(), 0x10, 3)],
    );
    cog.set_register(0x10, 6);
    assert_eq!(run_instruction(&mut cog, &mut bus), 4);
    assert_eq!(cog.register(0x10), 6);
}

#[test]
fn test_rdlong_and_wrlong() {
    let mut bus = bus();
    bus.memory.write_long(0x200, 0xDEAD_BEEF);
    let mut cog = native_cog(
        &mut bus,
        &[
            op(Opcode::Rdlong, Effects::wr(), 0x10, 0x11),
            op(Opcode::Rdlong, Effects::nr(), 0x10, 0x12),
        ],
    );
    cog.set_register(0x11, 0x200);
    cog.set_register(0x12, 0x300);
    assert_eq!(run_instruction(&mut cog, &mut bus), 8);
    assert_eq!(cog.register(0x10), 0xDEAD_BEEF);
    run_instruction(&mut cog, &mut bus);
    assert_eq!(bus.memory.read_long(0x300), 0xDEAD_BEEF);
}

#[test]
fn test_hub_instruction_waits_for_grant() {
    let mut bus = bus();
    let mut cog = native_cog(&mut bus, &[op(Opcode::Rdbyte, Effects::wr(), 0x10, 0x11)]);
    bus.memory.write_byte(0, 0x5A);
    for _ in 0..20 {
        cog.step(&mut bus);
        assert_eq!(cog.state(), CogRunState::HubRdbyte);
    }
    cog.hub_access(&mut bus);
    assert_eq!(cog.register(0x10), 0x5A);
    assert_eq!(cog.state(), CogRunState::WaitCycles);
}

#[test]
fn test_cogid() {
    let mut bus = bus();
    let mut cog = native_cog_with_id(
        &mut bus,
        3,
        &[op(Opcode::Hubop, Effects::wr().with_immediate(), 0x10, 1)],
    );
    run_instruction(&mut cog, &mut bus);
    assert_eq!(cog.register(0x10), 3);
}

#[test]
fn test_coginit_queues_start() {
    let mut bus = bus();
    assert_eq!(bus.start_cog(0, 0, Some(0)), Some(0));
    bus.take_requests();
    let mut cog = native_cog(
        &mut bus,
        &[op(Opcode::Hubop, Effects::wr().with_immediate().with_wc(), 0x10, 2)],
    );
    cog.set_register(0x10, (0x40 << 16) | (0x100 << 2) | 8);
    run_instruction(&mut cog, &mut bus);
    assert_eq!(cog.register(0x10), 1);
    assert_eq!(cog.flags(), Some((false, false)));
    assert_eq!(
        bus.take_requests(),
        vec![CogRequest::Start {
            id: 1,
            program: 0x100,
            param: 0x40
        }]
    );
}

#[test]
fn test_locks() {
    let mut bus = bus();
    let lockset = op(Opcode::Hubop, Effects::nr().with_immediate().with_wc(), 0x10, 6);
    let mut cog = native_cog(
        &mut bus,
        &[
            op(Opcode::Hubop, Effects::wr().with_immediate().with_wc(), 0x10, 4),
            lockset,
            lockset,
        ],
    );
    run_instruction(&mut cog, &mut bus);
    assert_eq!(cog.register(0x10), 0);
    assert_eq!(cog.flags(), Some((false, false)));
    run_instruction(&mut cog, &mut bus);
    assert_eq!(cog.flags(), Some((false, false)));
    run_instruction(&mut cog, &mut bus);
    assert_eq!(cog.flags(), Some((false, true)));
    assert!(bus.locks.is_set(0));
}

#[test]
fn test_waitcnt_waits_for_target() {
    let mut bus = bus();
    let mut cog = native_cog(
        &mut bus,
        &[op(Opcode::Waitcnt, Effects::wr().with_immediate(), 0x10, 16)],
    );
    cog.set_register(0x10, 20);
    let mut counter = 0;
    loop {
        bus.counter = counter;
        cog.step(&mut bus);
        if cog.state() == CogRunState::Execute {
            break;
        }
        counter += 1;
        assert!(counter < 100);
    }
    assert_eq!(counter, 20);
    assert_eq!(cog.register(0x10), 36);
}

#[test]
fn test_waitpeq_waits_for_pins() {
    let mut bus = bus();
    let mut cog = native_cog(&mut bus, &[op(Opcode::Waitpeq, Effects::nr(), 0x10, 0x11)]);
    cog.set_register(0x10, 0b100);
    cog.set_register(0x11, 0b110);
    for _ in 0..20 {
        cog.step(&mut bus);
    }
    assert_eq!(cog.state(), CogRunState::WaitPeq);
    bus.pins_in = 0b101;
    cog.step(&mut bus);
    assert_eq!(cog.state(), CogRunState::Execute);
}

#[test]
fn test_waitvid_with_video_disabled_does_not_wait() {
    let mut bus = bus();
    let mut cog = native_cog(&mut bus, &[op(Opcode::Waitvid, Effects::nr(), 0x10, 0x11)]);
    assert_eq!(run_instruction(&mut cog, &mut bus), 4);
}

#[test]
fn test_status_of_native_cog() {
    let mut bus = bus();
    let mut cog = native_cog(&mut bus, &[]);
    cog.set_breakpoint(Some(4));
    let status = cog.status();
    assert_eq!(status.state, CogRunState::Execute);
    assert_eq!(status.description, "Running instruction");
    assert_eq!(status.breakpoint, Some(4));
    assert!(!status.interpreted);
    assert_eq!(status.zero, Some(false));
    assert_eq!(status.program_address, PROGRAM);
}

/// Hub address of the interpreted test programs' first VAR long.
/// The code starts at 0x18 and must stay below it.
const VAR: u32 = 0x80;

fn interpreted_cog(bus: &mut HubBus, code: &[u8]) -> Cog {
    // pbase, vbase, dbase, pcurr and dcurr, in the layout of an image
    // header with the parameter block at 0x0004.
    for (address, value) in [(6, 0x10), (8, VAR as u16), (10, 0xA0), (12, 0x18), (14, 0xA4)] {
        bus.memory.write_word(address, value);
    }
    for (address, byte) in (0x18_u32..).zip(code) {
        bus.memory.write_byte(address, *byte);
    }
    let mut cog = Cog::new(
        &Context::default(),
        0,
        INTERPRETER_ADDRESS,
        0x0004,
        RCFAST_FREQUENCY,
    );
    load(&mut cog, bus);
    cog
}

fn run_ticks(cog: &mut Cog, bus: &mut HubBus, ticks: u32) {
    for _ in 0..ticks {
        cog.step(bus);
        cog.hub_access(bus);
    }
}

#[test]
fn test_interpreter_boot() {
    let mut bus = bus();
    let mut cog = interpreted_cog(&mut bus, &[]);
    assert!(cog.is_interpreted());
    assert_eq!(cog.flags(), None);
    assert_eq!(cog.state(), CogRunState::BootInterpreter);
    assert_eq!(cog.program_cursor(), 0x18);
    assert_eq!(cog.register(INTERPRETER_COGID_REGISTER), 0);
    let mut ticks = 0;
    while cog.state() != CogRunState::ExecInterpreter {
        cog.step(&mut bus);
        ticks += 1;
        assert!(ticks < 100);
    }
    assert!(cog.at_instruction_boundary());
}

#[test]
fn test_interpreter_arithmetic() {
    let mut bus = bus();
    // 7 - 5, stored in the first VAR long, then loop forever.
    let code = [0x38, 0x07, 0x38, 0x05, 0xED, 0x41, 0x04, 0x7E];
    let mut cog = interpreted_cog(&mut bus, &code);
    run_ticks(&mut cog, &mut bus, 1000);
    assert_eq!(bus.memory.read_long(VAR), 2);
    assert!((0x1E..0x20).contains(&cog.program_cursor()));
}

#[test]
fn test_interpreter_call_and_return() {
    let mut bus = bus();
    // Method 1 of the object at 0x10 starts at 0x60 with no locals.
    bus.memory.write_long(0x14, 0x0000_0050);
    // RESULT := param + 1
    for (address, byte) in (0x60_u32..).zip([0x64, 0x36, 0xEC, 0x33]) {
        bus.memory.write_byte(address, byte);
    }
    // var0 := method1(9), then loop forever.
    let code = [0x00, 0x38, 0x09, 0x05, 0x01, 0x41, 0x04, 0x7E];
    let mut cog = interpreted_cog(&mut bus, &code);
    run_ticks(&mut cog, &mut bus, 2000);
    assert_eq!(bus.memory.read_long(VAR), 10);
}

#[test]
fn test_interpreter_mask_literal_and_compare() {
    let mut bus = bus();
    // var0 := a mask literal of five ones; var1 := (3 < 4)
    let code = [
        0x37, 0x24, 0x41, 0x38, 0x03, 0x38, 0x04, 0xF9, 0x45, 0x04, 0x7E,
    ];
    let mut cog = interpreted_cog(&mut bus, &code);
    run_ticks(&mut cog, &mut bus, 2000);
    assert_eq!(bus.memory.read_long(VAR), 0x1F);
    assert_eq!(bus.memory.read_long(VAR + 4), u32::MAX);
}

#[test]
fn test_interpreter_math_assignment() {
    let mut bus = bus();
    // var0 := 5; var0 += 3; var0 := -var0; var0 -= 4
    let code = [
        0x38, 0x05, 0x41, 0x38, 0x03, 0x42, 0x4C, 0x42, 0x46, 0x38, 0x04, 0x42, 0x4D, 0x04,
        0x7E,
    ];
    let mut cog = interpreted_cog(&mut bus, &code);
    run_ticks(&mut cog, &mut bus, 2000);
    assert_eq!(bus.memory.read_long(VAR), (-12_i32) as u32);
}

#[test]
fn test_interpreter_increment_decrement_and_clear() {
    let mut bus = bus();
    bus.memory.write_long(VAR, 41);
    bus.memory.write_long(VAR + 12, 7);
    // var1 := var0++; var2 := ++var0; var3~; var0--
    let code = [0x42, 0xAE, 0x45, 0x42, 0xA6, 0x49, 0x4E, 0x18, 0x42, 0x3E, 0x04, 0x7E];
    let mut cog = interpreted_cog(&mut bus, &code);
    run_ticks(&mut cog, &mut bus, 2000);
    assert_eq!(bus.memory.read_long(VAR + 4), 41);
    assert_eq!(bus.memory.read_long(VAR + 8), 43);
    assert_eq!(bus.memory.read_long(VAR + 12), 0);
    assert_eq!(bus.memory.read_long(VAR), 42);
}

#[test]
fn test_interpreter_byte_increment_wraps() {
    let mut bus = bus();
    bus.memory.write_long(VAR, 0xFF);
    // byte[var0 address]++ through the memory form: push the
    // address of var0, then a byte "using" access with post-increment.
    let code = [0x43, 0x82, 0x2E, 0x04, 0x7E];
    let mut cog = interpreted_cog(&mut bus, &code);
    run_ticks(&mut cog, &mut bus, 1000);
    assert_eq!(bus.memory.read_long(VAR), 0);
}

#[test]
fn test_interpreter_repeat_from_to() {
    let mut bus = bus();
    // var0 := 1
    // repeat: var1 += var0, while var0 steps from 1 to 5
    let code = [
        0x36, 0x41, // 0x18
        0x40, 0x46, 0x4C, // 0x1A: loop body
        0x36, 0x38, 0x05, // 0x1D
        0x42, 0x02, 0x77, // 0x20: back to 0x1A
        0x04, 0x7E,
    ];
    let mut cog = interpreted_cog(&mut bus, &code);
    run_ticks(&mut cog, &mut bus, 3000);
    assert_eq!(bus.memory.read_long(VAR + 4), 15);
    assert_eq!(bus.memory.read_long(VAR), 6);
    assert!((0x23..0x25).contains(&cog.program_cursor()));
}

#[test]
fn test_interpreter_register_assignment() {
    let mut bus = bus();
    // OUTA := 6; OUTA |= 1
    let code = [0x38, 0x06, 0x3F, 0xB4, 0x36, 0x3F, 0xD4, 0x4A, 0x04, 0x7E];
    let mut cog = interpreted_cog(&mut bus, &code);
    run_ticks(&mut cog, &mut bus, 2000);
    assert_eq!(cog.outa(), 7);
}

#[test]
fn test_interpreter_stops_on_unsupported_bytecode() {
    let mut bus = bus();
    let mut cog = interpreted_cog(&mut bus, &[0x3C]);
    run_ticks(&mut cog, &mut bus, 100);
    assert!(bus.take_requests().contains(&CogRequest::Stop(0)));
}
