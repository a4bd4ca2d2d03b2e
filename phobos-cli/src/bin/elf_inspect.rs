//! ELF inspector: list the program headers of an executable.

use anyhow::Context;
use clap::Parser;
use goblin::elf::program_header;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// ELF file to inspect.
    elf: PathBuf,
}

/// Short fixed-width name for a program header type.
fn header_name(p_type: u32) -> &'static str {
    match p_type {
        program_header::PT_LOAD => " LOAD",
        program_header::PT_DYNAMIC => "  DYN",
        program_header::PT_INTERP => "INTRP",
        program_header::PT_NOTE => " NOTE",
        program_header::PT_SHLIB => "SHLIB",
        program_header::PT_PHDR => " PHDR",
        program_header::PT_TLS => "  TLS",
        program_header::PT_GNU_EH_FRAME => "   EH",
        program_header::PT_GNU_STACK => "STACK",
        program_header::PT_GNU_RELRO => "RELRO",
        _ => "UNKNOWN",
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let image = std::fs::read(&args.elf)
        .with_context(|| format!("failed to open {}", args.elf.display()))?;
    let elf = goblin::elf::Elf::parse(&image)
        .with_context(|| format!("file is not well formed: {}", args.elf.display()))?;
    if !elf.is_64 {
        anyhow::bail!("not a 64-bit ELF: {}", args.elf.display());
    }
    println!("Opened {}", args.elf.display());
    println!("Found {} headers.", elf.program_headers.len());

    for (index, header) in elf.program_headers.iter().enumerate() {
        println!(
            "{index:2}   {} {:8x} {:8x} {:8x} {:8x} {:8x} {:8x} {:8x}",
            header_name(header.p_type),
            header.p_offset,
            header.p_vaddr,
            header.p_paddr,
            header.p_align,
            header.p_filesz,
            header.p_memsz,
            header.p_flags,
        );
    }

    Ok(())
}
