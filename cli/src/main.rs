//! Command-line emulator: loads a boot image into the emulated chip
//! and runs it until a breakpoint is reached, every cog has stopped
//! or the tick budget runs out.
use std::error::Error;
use std::ffi::OsString;
use std::fmt::{self, Display, Formatter};
use std::num::ParseIntError;
use std::path::PathBuf;

use clap::ArgAction::{Append, Set, SetTrue};
use clap::Parser;
use tracing::{event, Level};
use tracing_subscriber::prelude::*;

use cpu::{Context, Propeller, COG_COUNT};

const AUTHOR: &str = "The propsim authors";

#[derive(Parser, Debug)]
#[clap(author=AUTHOR, version, about, long_about=None)]
struct Cli {
    /// File containing the boot image (as produced by a Spin compiler)
    #[clap(action=Set)]
    image: OsString,

    /// Stop after this many clock ticks
    #[clap(long = "max-ticks", action=Set)]
    max_ticks: Option<u64>,

    /// Set a breakpoint, as COG:ADDRESS (the address may be written in
    /// hex with a 0x prefix)
    #[clap(long = "break", action=Append, value_parser=parse_breakpoint)]
    breakpoints: Vec<Breakpoint>,

    /// Print the state of every cog when the run finishes
    #[clap(long = "status", action=SetTrue)]
    status: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Breakpoint {
    cog: usize,
    address: u32,
}

#[derive(Debug, PartialEq, Eq)]
enum BadBreakpoint {
    MissingColon,
    BadNumber(ParseIntError),
    NoSuchCog(usize),
}

impl Display for BadBreakpoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            BadBreakpoint::MissingColon => f.write_str("expected COG:ADDRESS"),
            BadBreakpoint::BadNumber(e) => write!(f, "invalid number: {e}"),
            BadBreakpoint::NoSuchCog(n) => {
                write!(f, "cog {n} does not exist (cogs are numbered 0 to {})", COG_COUNT - 1)
            }
        }
    }
}

impl Error for BadBreakpoint {}

fn parse_number(s: &str) -> Result<u32, ParseIntError> {
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    }
}

fn parse_breakpoint(s: &str) -> Result<Breakpoint, BadBreakpoint> {
    let (cog, address) = s.split_once(':').ok_or(BadBreakpoint::MissingColon)?;
    let cog: usize = cog
        .trim()
        .parse()
        .map_err(BadBreakpoint::BadNumber)?;
    if cog >= COG_COUNT {
        return Err(BadBreakpoint::NoSuchCog(cog));
    }
    let address = parse_number(address.trim()).map_err(BadBreakpoint::BadNumber)?;
    Ok(Breakpoint { cog, address })
}

#[derive(Debug)]
enum Fail {
    InitialisationFailure(String),
    ReadFailed(PathBuf, std::io::Error),
}

impl Display for Fail {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            Fail::InitialisationFailure(msg) => {
                write!(f, "failed to initialise: {msg}")
            }
            Fail::ReadFailed(path, e) => {
                write!(f, "failed to read {}: {}", path.display(), e)
            }
        }
    }
}

impl Error for Fail {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopReason {
    Halted,
    TickLimit,
}

/// Cogs are created afresh whenever they are (re)started, so the
/// breakpoints are re-applied to whichever cogs are running.
fn arm_breakpoints(chip: &mut Propeller, breakpoints: &[Breakpoint]) {
    for bp in breakpoints {
        if let Some(cog) = chip.cog_mut(bp.cog) {
            if cog.breakpoint() != Some(bp.address) {
                cog.set_breakpoint(Some(bp.address));
            }
        }
    }
}

/// Runs the chip; returns why it stopped and how many ticks it ran.
fn run(
    chip: &mut Propeller,
    breakpoints: &[Breakpoint],
    max_ticks: Option<u64>,
) -> (StopReason, u64) {
    let mut ticks: u64 = 0;
    loop {
        if max_ticks.is_some_and(|limit| ticks >= limit) {
            return (StopReason::TickLimit, ticks);
        }
        arm_breakpoints(chip, breakpoints);
        ticks += 1;
        if !chip.step() {
            return (StopReason::Halted, ticks);
        }
    }
}

fn report_halt(chip: &Propeller) {
    if chip.cogs().next().is_none() {
        event!(Level::INFO, "all cogs have stopped");
        return;
    }
    for cog in chip.cogs() {
        if cog.breakpoint() == Some(cog.program_cursor()) {
            event!(
                Level::INFO,
                "cog {} reached breakpoint at {:#06x}",
                cog.id(),
                cog.program_cursor()
            );
        }
    }
}

fn run_simulator() -> Result<(), Fail> {
    let cli = Cli::parse();

    // See
    // https://docs.rs/tracing-subscriber/latest/tracing_subscriber/filter/struct.EnvFilter.html
    // for instructions on how to select which trace messages get
    // printed (via the RUST_LOG environment variable).
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(true);
    let filter_layer = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new("info"))
        .map_err(|e| Fail::InitialisationFailure(e.to_string()))?;
    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();

    let path = PathBuf::from(&cli.image);
    let image = std::fs::read(&path).map_err(|e| Fail::ReadFailed(path.clone(), e))?;

    let ctx = Context::default();
    let mut chip = Propeller::new(&ctx);
    match chip.initialize(&image) {
        Ok(header) => {
            event!(
                Level::INFO,
                "{}: clock {} Hz ({}), entry point {:#06x}",
                path.display(),
                header.clock_frequency,
                header.clock_mode,
                header.entry_pc
            );
        }
        Err(e) => {
            event!(
                Level::WARN,
                "{} has a bad header ({}); booting it anyway",
                path.display(),
                e
            );
        }
    }

    let (reason, ticks) = run(&mut chip, &cli.breakpoints, cli.max_ticks);
    if reason == StopReason::Halted {
        report_halt(&chip);
    }
    event!(
        Level::INFO,
        "stopped after {} ticks ({:.6} s emulated)",
        ticks,
        chip.time()
    );

    if cli.status {
        for status in chip.cog_statuses() {
            let flags = match (status.zero, status.carry) {
                (Some(z), Some(c)) => format!(" Z={} C={}", u8::from(z), u8::from(c)),
                _ => String::new(),
            };
            println!(
                "cog {} {:<12} pc={:#06x} {}{}",
                status.id,
                if status.interpreted { "(spin)" } else { "(native)" },
                status.program_cursor,
                status.description,
                flags
            );
        }
    }
    Ok(())
}

fn main() {
    match run_simulator() {
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
        Ok(()) => {
            std::process::exit(0);
        }
    }
}
