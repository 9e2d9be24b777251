use std::cell::Cell;
use std::rc::Rc;

use base::image::seal;
use base::prelude::*;

use super::*;
use crate::cog::{CogRunState, COG_PROGRAM_LONGS};
use crate::context::DEFAULT_STEP_INSTRUCTION_LIMIT;

/// Address at which the tests place native programs.
const NATIVE_PROGRAM: u32 = 0x100;

/// Builds a sealed image whose top-level method is `code`, at 0x18.
fn image(clock_mode: u8, code: &[u8]) -> Vec<u8> {
    let header = BootHeader {
        clock_frequency: 80_000_000,
        clock_mode: ClockMode::new(clock_mode),
        checksum: 0,
        root_object: 0x10,
        variable_base: 0x20,
        local_frame: 0x28,
        entry_pc: 0x18,
        initial_stack: 0x30,
    };
    let mut image = header.encode().to_vec();
    image.resize(0x18, 0);
    image.extend_from_slice(code);
    seal(&mut image).expect("image has a complete header");
    image
}

/// An image which loops forever.
fn looping_image() -> Vec<u8> {
    image(0, &[0x04, 0x7E])
}

fn booted(image: &[u8]) -> Propeller {
    let mut chip = Propeller::new(&Context::default());
    chip.initialize(image).expect("image is valid");
    chip
}

fn instruction(opcode: Opcode, effects: Effects, dest: u32, src: u32) -> u32 {
    Instruction::assemble(opcode, effects, Condition::IF_ALWAYS, dest, src).bits()
}

#[test]
fn test_reset_starts_interpreter_on_cog_0() {
    let chip = booted(&looping_image());
    let cog = chip.cog(0).expect("cog 0 should be running");
    assert!(cog.is_interpreted());
    assert_eq!(cog.state(), CogRunState::WaitLoadParam);
    assert!((1..8).all(|id| chip.cog(id).is_none()));
    assert_eq!(chip.clock().frequency, 80_000_000);
    assert_eq!(chip.counter(), 0);
    // The boot frame sits just below the local frame.
    assert_eq!(chip.direct_read_long(0x20), 0xFFF9_FFFF);
    assert_eq!(chip.direct_read_long(0x24), 0xFFF9_FFFF);
}

#[test]
fn test_boot_takes_one_grant_per_long() {
    let mut chip = booted(&looping_image());
    let mut grants = 0;
    while matches!(
        chip.cog(0).map(Cog::state),
        Some(CogRunState::WaitLoadParam | CogRunState::WaitLoadProgram)
    ) {
        assert!(chip.step());
        if chip.last_grant() == Some(0) {
            grants += 1;
        }
    }
    assert_eq!(grants, 1 + COG_PROGRAM_LONGS);
    assert_eq!(chip.cog(0).map(Cog::state), Some(CogRunState::BootInterpreter));
    assert_eq!(chip.cog(0).map(Cog::program_cursor), Some(0x18));
}

#[test]
fn test_image_which_stops_at_entry() {
    // The entry point is 0x18 because the header occupies 0 to 0x0F.
    // COGSTOP of the zero long at the top of the stack.
    let mut chip = booted(&image(0, &[0x21]));
    let mut cursors = Vec::new();
    let mut ticks = 0;
    while chip.step() {
        if let Some(cog) = chip.cog(0) {
            cursors.push(cog.program_cursor());
        }
        ticks += 1;
        assert!(ticks < 100_000, "cog 0 never stopped");
    }
    assert_eq!(cursors.last(), Some(&0x18));
    assert!(chip.cog(0).is_none());
    assert_eq!(chip.cogs().count(), 0);
}

#[test]
fn test_top_level_return_stops_cog() {
    // RETURN from the top-level method unwinds into the boot frame,
    // whose return address is the ROM routine which stops the cog.
    let mut chip = booted(&image(0, &[0x32]));
    let mut ticks = 0;
    while chip.step() {
        ticks += 1;
        assert!(ticks < 100_000, "cog 0 never stopped");
    }
    assert!(chip.cog(0).is_none());
}

#[test]
fn test_breakpoint_halts_on_arrival() {
    let mut chip = booted(&looping_image());
    chip.cog_mut(0)
        .expect("cog 0 should be running")
        .set_breakpoint(Some(0x18));
    let mut ticks = 0;
    while chip.step() {
        ticks += 1;
        assert!(ticks < 100_000, "breakpoint was not reached");
    }
    let cog = chip.cog(0).expect("cog 0 should still be running");
    assert!(cog.at_instruction_boundary());
    assert_eq!(cog.program_cursor(), 0x18);
    // The cog is already at the breakpoint, so the next tick does
    // not halt.  The loop brings it back there.
    assert!(chip.step());
    let mut more = 0;
    while chip.step() {
        more += 1;
        assert!(more < 1000, "breakpoint was not reached a second time");
    }
    assert_eq!(chip.cog(0).map(Cog::program_cursor), Some(0x18));
}

#[test]
fn test_breakpoint_at_current_boundary_needs_arrival() {
    let mut chip = booted(&looping_image());
    let id = chip.start_cog(NATIVE_PROGRAM, 0).expect("a cog should be free");
    assert_eq!(chip.step_instruction(id), StepInstructionOutcome::Boundary);
    assert_eq!(chip.cog(id).map(Cog::program_cursor), Some(0));
    chip.cog_mut(id)
        .expect("cog should be running")
        .set_breakpoint(Some(0));
    // The program is all never-executed instructions, so the cog
    // moves on to register 1 and does not return to 0.
    for _ in 0..100 {
        assert!(chip.step());
    }
    assert_ne!(chip.cog(id).map(Cog::program_cursor), Some(0));
}

#[test]
fn test_hub_slots_are_fair() {
    let mut chip = booted(&looping_image());
    for _ in 1..8 {
        chip.start_cog(NATIVE_PROGRAM, 0).expect("a cog should be free");
    }
    let ticks = 1003;
    let mut grants = [0_u32; 8];
    let mut order = Vec::new();
    for _ in 0..ticks {
        chip.step();
        order.push(chip.last_grant());
        if let Some(id) = chip.last_grant() {
            grants[id] += 1;
        }
    }
    for count in grants {
        assert!(count == ticks / 8 || count == ticks / 8 + 1, "{grants:?}");
    }
    assert_eq!(grants.iter().sum::<u32>(), ticks);
    // The rotation starts at slot 0 on reset and visits the cogs in
    // order of id.
    for (tick, granted) in order.iter().enumerate() {
        assert_eq!(*granted, Some(tick % 8), "tick {tick}");
    }
}

/// Writes a native program which puts both counters into NCO mode
/// with the given increments and then runs `tail`, which starts at
/// register 4 and must never run off its end.
fn write_counter_program(chip: &mut Propeller, base: u32, frq_a: u32, frq_b: u32, tail: &[u32]) {
    let nco = 4 << 26;
    let setup = [
        instruction(Opcode::Mov, Effects::wr(), SpecialRegister::FRQA.address(), 0x10),
        instruction(Opcode::Mov, Effects::wr(), SpecialRegister::FRQB.address(), 0x11),
        instruction(Opcode::Mov, Effects::wr(), SpecialRegister::CTRA.address(), 0x12),
        instruction(Opcode::Mov, Effects::wr(), SpecialRegister::CTRB.address(), 0x12),
    ];
    for (i, long) in setup.iter().chain(tail).enumerate() {
        chip.direct_write_long(base + 4 * i as u32, *long);
    }
    chip.direct_write_long(base + 4 * 0x10, frq_a);
    chip.direct_write_long(base + 4 * 0x11, frq_b);
    chip.direct_write_long(base + 4 * 0x12, nco);
    // Register 0x13 is the WAITCNT target; CNT does not reach 0 again
    // during the test.
    chip.direct_write_long(base + 4 * 0x13, 0);
}

#[test]
fn test_counters_advance_once_per_tick_in_every_state() {
    use crate::freqgen::CounterMode;

    let mut chip = booted(&looping_image());
    let jump_back = instruction(Opcode::Jmpret, Effects::nr().with_immediate(), 0, 4);
    let spinning = [jump_back];
    let parked = [instruction(
        Opcode::Waitcnt,
        Effects::wr().with_immediate(),
        0x13,
        0,
    )];
    let reading = [
        instruction(Opcode::Rdlong, Effects::wr().with_immediate(), 0x14, 0),
        instruction(Opcode::Jmpret, Effects::nr().with_immediate(), 0, 4),
    ];
    let programs: [(u32, u32, u32, &[u32]); 3] = [
        (0x100, 3, 1_000, &spinning),
        (0x900, 77, 0x8000_0001, &parked),
        (0x1100, 0x0123_4567, 5, &reading),
    ];
    let mut cogs = Vec::new();
    for (base, frq_a, frq_b, tail) in programs {
        write_counter_program(&mut chip, base, frq_a, frq_b, tail);
        let id = chip.start_cog(base, 0).expect("a cog should be free");
        cogs.push((id, frq_a, frq_b));
    }

    // Long enough for every cog to load and configure its counters.
    for _ in 0..6000 {
        assert!(chip.step());
    }
    for &(id, _, _) in &cogs {
        let cog = chip.cog(id).expect("cog should be running");
        assert_eq!(cog.freq_a().mode(), CounterMode::NcoSingleEnded);
        assert_eq!(cog.freq_b().mode(), CounterMode::NcoSingleEnded);
    }
    let parked_id = cogs[1].0;
    assert_eq!(chip.cog(parked_id).map(Cog::state), Some(CogRunState::WaitCnt));

    let phase = |chip: &Propeller, id: usize| {
        let cog = chip.cog(id).expect("cog should be running");
        (
            cog.register(SpecialRegister::PHSA.address()),
            cog.register(SpecialRegister::PHSB.address()),
        )
    };
    let start: Vec<(u32, u32)> = cogs.iter().map(|&(id, _, _)| phase(&chip, id)).collect();
    let reading_id = cogs[2].0;
    let mut saw_hub_wait = false;
    let n: u32 = 100;
    for _ in 0..n {
        assert!(chip.step());
        saw_hub_wait |= chip.cog(reading_id).map(Cog::state) == Some(CogRunState::HubRdlong);
    }
    assert!(saw_hub_wait);
    assert_eq!(chip.cog(parked_id).map(Cog::state), Some(CogRunState::WaitCnt));
    for (&(id, frq_a, frq_b), &(phs_a, phs_b)) in cogs.iter().zip(&start) {
        assert_eq!(
            phase(&chip, id),
            (
                phs_a.wrapping_add(n.wrapping_mul(frq_a)),
                phs_b.wrapping_add(n.wrapping_mul(frq_b))
            ),
            "cog {id}"
        );
    }
}

#[test]
fn test_no_grant_for_idle_slot() {
    let mut chip = booted(&looping_image());
    let mut granted = Vec::new();
    for _ in 0..16 {
        chip.step();
        granted.push(chip.last_grant());
    }
    assert_eq!(granted.iter().filter(|g| g.is_some()).count(), 2);
    assert!(granted.iter().flatten().all(|&id| id == 0));
}

#[test]
fn test_start_cog_reports_exhaustion() {
    let mut chip = booted(&looping_image());
    for expected in 1..8 {
        assert_eq!(chip.start_cog(NATIVE_PROGRAM, 0), Ok(expected));
    }
    assert_eq!(
        chip.start_cog(NATIVE_PROGRAM, 0),
        Err(StartCogError::NoFreeCog)
    );
    assert_eq!(
        StartCogError::NoFreeCog.to_string(),
        "all eight cogs are running"
    );
    chip.stop_cog(3);
    assert!(chip.cog(3).is_none());
    assert_eq!(chip.start_cog(NATIVE_PROGRAM, 0), Ok(3));
}

#[test]
fn test_started_cog_is_native() {
    let mut chip = booted(&looping_image());
    let id = chip.start_cog(NATIVE_PROGRAM, 0x40).expect("a cog should be free");
    let cog = chip.cog(id).expect("cog should be running");
    assert!(!cog.is_interpreted());
    assert_eq!(cog.status().param_address, 0x40);
    assert_eq!(cog.state(), CogRunState::WaitLoadParam);
}

#[test]
fn test_pin_aggregation() {
    let mut chip = booted(&looping_image());
    let id = chip.start_cog(NATIVE_PROGRAM, 0).expect("a cog should be free");
    {
        let cog = chip.cog_mut(id).expect("cog should be running");
        cog.set_register(SpecialRegister::DIRA.address(), 0b011);
        cog.set_register(SpecialRegister::OUTA.address(), 0b001);
        // Counter A in NCO mode on pin 5, which no cog drives.
        cog.set_register(SpecialRegister::CTRA.address(), (4 << 26) | 5);
        cog.set_register(SpecialRegister::FRQA.address(), 0x8000_0000);
    }
    chip.drive_pins(0b110);
    let mut saw_counter_output = false;
    for _ in 0..4 {
        chip.step();
        let pins = chip.pins();
        assert_eq!(pins.input & 0b111, 0b101);
        assert_eq!(pins.direction, 0b011);
        assert_eq!(pins.input & (1 << 5), 0);
        saw_counter_output |= pins.output & (1 << 5) != 0;
    }
    assert!(saw_counter_output);
}

#[test]
fn test_pin_observers_are_told_about_changes() {
    struct Watcher(Rc<Cell<u32>>);
    impl PinObserver for Watcher {
        fn pins_changed(&mut self, _pins: &PinState) {
            self.0.set(self.0.get() + 1);
        }
    }
    let mut chip = booted(&looping_image());
    let changes = Rc::new(Cell::new(0));
    chip.add_pin_observer(Box::new(Watcher(changes.clone())));
    chip.step();
    assert_eq!(changes.get(), 0);
    chip.drive_pins(1);
    assert_eq!(changes.get(), 1);
    chip.step();
    assert_eq!(changes.get(), 1);
}

#[test]
fn test_clock_observers() {
    struct Counter(Rc<Cell<u32>>);
    impl ClockObserver for Counter {
        fn tick(&mut self, _time: f64, counter: u32) {
            self.0.set(counter);
        }
    }
    let mut chip = booted(&looping_image());
    let last = Rc::new(Cell::new(0));
    let id = chip.add_clock_observer(Box::new(Counter(last.clone())));
    for _ in 0..5 {
        chip.step();
    }
    assert_eq!(last.get(), 5);
    assert!(chip.remove_observer(id));
    chip.step();
    assert_eq!(last.get(), 5);
    assert_eq!(chip.counter(), 6);
    assert!((chip.time() - 6.0 / 80e6).abs() < 1e-12);
}

#[test]
fn test_step_instruction() {
    let mut chip = booted(&looping_image());
    let id = chip.start_cog(NATIVE_PROGRAM, 0).expect("a cog should be free");
    // The program is all zeros: never-executed instructions.
    assert_eq!(chip.step_instruction(id), StepInstructionOutcome::Boundary);
    assert_eq!(chip.cog(id).map(Cog::program_cursor), Some(0));
    assert_eq!(chip.step_instruction(id), StepInstructionOutcome::Boundary);
    assert_eq!(chip.cog(id).map(Cog::program_cursor), Some(1));
    assert_eq!(chip.step_instruction(5), StepInstructionOutcome::NoSuchCog);
}

#[test]
fn test_step_instruction_ceiling() {
    let ctx = Context::new(RCFAST_FREQUENCY, 10);
    let mut chip = Propeller::new(&ctx);
    chip.initialize(&looping_image()).expect("image is valid");
    assert_eq!(chip.step_instruction(0), StepInstructionOutcome::Ceiling);
    assert_eq!(chip.counter(), 10);
    assert!(DEFAULT_STEP_INSTRUCTION_LIMIT > 10);
}

#[test]
fn test_clkset_changes_frequency() {
    // XTAL1 + PLL16X at 80MHz implies a 5MHz crystal.
    let mut chip = booted(&image(0x6F, &[0x04, 0x7E]));
    assert_eq!(chip.clock().crystal, 5_000_000);
    chip.direct_write_long(
        NATIVE_PROGRAM,
        instruction(Opcode::Hubop, Effects::nr().with_immediate(), 0x10, 0),
    );
    // Register 0x10 holds the new mode, XTAL1 + PLL8X.
    chip.direct_write_long(NATIVE_PROGRAM + 4 * 0x10, 0x6E);
    let id = chip.start_cog(NATIVE_PROGRAM, 0).expect("a cog should be free");
    assert_eq!(chip.step_instruction(id), StepInstructionOutcome::Boundary);
    assert_eq!(chip.step_instruction(id), StepInstructionOutcome::Boundary);
    assert_eq!(chip.clock().frequency, 40_000_000);
    assert_eq!(chip.clock().mode, ClockMode::new(0x6E));
}

#[test]
fn test_native_cog_stops_itself() {
    let mut chip = booted(&looping_image());
    // cogid 0x10; cogstop 0x10
    chip.direct_write_long(
        NATIVE_PROGRAM,
        instruction(Opcode::Hubop, Effects::wr().with_immediate(), 0x10, 1),
    );
    chip.direct_write_long(
        NATIVE_PROGRAM + 4,
        instruction(Opcode::Hubop, Effects::nr().with_immediate(), 0x10, 3),
    );
    let id = chip.start_cog(NATIVE_PROGRAM, 0).expect("a cog should be free");
    assert_eq!(chip.step_instruction(id), StepInstructionOutcome::Boundary);
    assert_eq!(chip.step_instruction(id), StepInstructionOutcome::Boundary);
    assert_eq!(chip.cog(id).map(|c| c.register(0x10)), Some(id as u32));
    assert_eq!(chip.step_instruction(id), StepInstructionOutcome::NoSuchCog);
    assert!(chip.cog(id).is_none());
}

#[test]
fn test_cursor_walks_the_image_header() {
    let mut chip = booted(&looping_image());
    let mut cursor = chip.cursor(0);
    assert_eq!(cursor.read_long(), 80_000_000);
    assert_eq!(cursor.read_byte(), 0);
    cursor.read_byte();
    let words: Vec<u16> = (0..5).map(|_| cursor.read_word()).collect();
    assert_eq!(words, [0x10, 0x20, 0x28, 0x18, 0x30]);
    assert_eq!(cursor.address(), 0x10);
    cursor.seek(0x18);
    cursor.write_byte(0x21);
    assert_eq!(chip.direct_read_byte(0x18), 0x21);
}

#[test]
fn test_bad_checksum_still_boots() {
    let mut bad = looping_image();
    bad[5] = bad[5].wrapping_add(1);
    let mut chip = Propeller::new(&Context::default());
    assert!(matches!(
        chip.initialize(&bad),
        Err(ImageError::BadChecksum(_))
    ));
    assert!(chip.cog(0).is_some());
}

#[test]
fn test_empty_header_uses_boot_frequency() {
    let mut chip = Propeller::new(&Context::default());
    assert!(chip.initialize(&[]).is_err());
    assert_eq!(chip.clock().frequency, RCFAST_FREQUENCY);
}
