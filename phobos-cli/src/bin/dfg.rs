//! Dataflow-graph tool: decode a file of opcodes and link each instruction to the instructions
//! that produced its source registers. With `-p`, the graph is also emitted as Graphviz dot.

use anyhow::Context;
use clap::Parser;
use phobos_core::instruction::{OpType, RegFile};
use phobos_core::{decode16, decode32};
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// File with one hexadecimal opcode per line (no 0x prefix).
    #[arg(short = 'f', long = "file")]
    opcode_file: PathBuf,
    /// Also write the graph to dfg.dot.
    #[arg(short, long)]
    print_dot: bool,
}

/// Tracks, per register file, which instruction index last wrote each register.
#[derive(Default)]
struct Producers {
    int: [Option<u64>; 32],
    float: [Option<u64>; 32],
}

impl Producers {
    fn get(&self, file: RegFile, reg: u8) -> Option<u64> {
        match file {
            RegFile::Int => self.int[reg as usize],
            RegFile::Float => self.float[reg as usize],
        }
    }

    fn set(&mut self, file: RegFile, reg: u8, index: u64) {
        match file {
            RegFile::Int => self.int[reg as usize] = Some(index),
            RegFile::Float => self.float[reg as usize] = Some(index),
        }
    }
}

struct DotPrinter {
    file: Option<File>,
}

impl DotPrinter {
    fn start(enabled: bool) -> anyhow::Result<Self> {
        let file = if enabled {
            let mut file = File::create("dfg.dot").context("failed to create dfg.dot")?;
            writeln!(file, "strict digraph {{")?;
            Some(file)
        } else {
            None
        };
        Ok(Self { file })
    }

    fn node(&mut self, index: u64, label: &str, op_type: OpType) -> std::io::Result<()> {
        // Shape the memory and control nodes differently so the graph reads at a glance.
        let shape = match op_type {
            OpType::Load | OpType::LoadFp | OpType::Store | OpType::StoreFp => "box",
            OpType::Branch => "diamond",
            OpType::Atomic | OpType::System => "octagon",
            _ => "ellipse",
        };
        match &mut self.file {
            Some(file) => writeln!(file, "{index} [label =\"{label}\" shape={shape}]"),
            None => Ok(()),
        }
    }

    fn edge(&mut self, producer: u64, consumer: u64) -> std::io::Result<()> {
        match &mut self.file {
            Some(file) => writeln!(file, "{producer} -> {consumer}"),
            None => Ok(()),
        }
    }

    fn finish(&mut self) -> std::io::Result<()> {
        match &mut self.file {
            Some(file) => writeln!(file, "}}"),
            None => Ok(()),
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let reader = BufReader::new(
        File::open(&args.opcode_file)
            .with_context(|| format!("failed to open {}", args.opcode_file.display()))?,
    );
    let mut dot = DotPrinter::start(args.print_dot)?;
    let mut producers = Producers::default();

    let mut index = 0u64;
    for line in reader.lines() {
        let line = line?;
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        index += 1;

        let opcode = u32::from_str_radix(text, 16)
            .with_context(|| format!("bad opcode on line {index}: '{text}'"))?;

        // Bottom two bits 11 mean a 32-bit encoding, anything else compressed.
        let (decoded, compressed) = if opcode & 0b11 == 0b11 {
            (decode32(opcode), false)
        } else {
            (decode16(opcode as u16), true)
        };
        let Ok(instruction) = decoded else {
            println!("No decode for {opcode:x}");
            continue;
        };

        let disasm = instruction.to_string();
        let pad = if compressed { "" } else { "  " };
        print!("{index}\t{pad}{disasm}");

        let label = format!("{index} {disasm}");
        dot.node(index, &label, instruction.op_type())?;

        let feeding: Vec<u64> = instruction
            .srcs()
            .iter()
            .filter_map(|dep| producers.get(dep.file, dep.reg.into()))
            .collect();
        if !feeding.is_empty() {
            let list: Vec<String> = feeding.iter().map(u64::to_string).collect();
            print!("\t[{}]", list.join(","));
            for producer in feeding {
                dot.edge(producer, index)?;
            }
        }
        println!();

        for dep in instruction.dsts() {
            producers.set(dep.file, dep.reg.into(), index);
        }
    }

    dot.finish()?;
    Ok(())
}
