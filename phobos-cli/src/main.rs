//! The simulator driver: load an ELF, run it, report how it stopped.

use anyhow::Context;
use clap::Parser;
use log::LevelFilter;
use phobos_core::registers::Specifier;
use phobos_core::{Emulator, Hart, Host, SparseMemory, StopReason};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Print every retired instruction (index, pc, disassembly).
    #[arg(short, long)]
    debug: bool,
    /// Trace register writes and data-memory accesses.
    #[arg(short, long)]
    verbose: bool,
    /// Stop after this many instructions.
    #[arg(short, long, default_value_t = 0)]
    instructions: u64,
    /// ELF executable to run.
    elf: PathBuf,
    /// Arguments passed to the guest as argv[1..].
    guest_args: Vec<String>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    env_logger::Builder::from_default_env()
        .filter_level(if args.verbose {
            LevelFilter::Trace
        } else {
            LevelFilter::Warn
        })
        .init();

    let prog_name = args.elf.display().to_string();
    println!("Run program {prog_name}.");

    let mut hart = Hart::new(0);
    let mut memory = SparseMemory::new();
    let mut host = Host::new(prog_name.clone());

    host.load_elf(&args.elf, &mut hart, &mut memory)
        .with_context(|| format!("failure loading ELF {prog_name}"))?;

    for arg in args.guest_args {
        println!("Add argument: {arg}");
        host.add_arg(arg);
    }
    host.set_stdin(PathBuf::from(format!("{prog_name}.stdin")));
    host.complete_env(&mut hart, &mut memory)
        .context("failed to build the initial guest environment")?;

    let mut emulator = Emulator::new(hart, memory, host);
    emulator.set_trace(args.debug);

    let outcome = emulator.run(args.instructions);
    match outcome.reason {
        StopReason::Exited(status) => println!(
            "Program exited with status {status} after {} instructions.",
            outcome.instructions
        ),
        StopReason::ReturnedToShell => println!(
            "Program returned to shell after {} instructions.",
            outcome.instructions
        ),
        StopReason::BudgetExhausted => {}
    }

    if args.debug {
        println!();
        println!("Architected State");
        for row in 0..8 {
            for column in 0..4 {
                let index = row * 4 + column;
                let value = emulator.hart.x(Specifier::from_u5(index));
                print!("{index:2} {value:016x} ");
            }
            println!();
        }
    }
    println!("Executed {} instructions.", outcome.instructions);

    Ok(())
}
