//! A functional, single-hart instruction-set simulator for RV64IMAFDC.
//!
//! Given a statically-linked 64-bit RISC-V ELF executable, [`host::Host`] loads it into a
//! [`memory::SparseMemory`] address space and synthesizes an initial process environment;
//! [`emulator::Emulator`] then interprets instructions one at a time against a [`hart::Hart`],
//! translating the guest's Linux syscalls to host I/O, until the guest exits or an instruction
//! budget runs out.
//!
//! No timing, privilege modes, paging or interrupts are modeled; this is a purely functional
//! user-level simulation.

#[macro_use]
extern crate static_assertions;

pub mod csr;
pub mod emulator;
pub mod execute;
pub mod hart;
pub mod host;
pub mod instruction;
pub mod memory;
pub mod registers;

pub use emulator::{Emulator, RunOutcome, StopReason};
pub use hart::Hart;
pub use host::Host;
pub use instruction::{decode16, decode32, Instruction};
pub use memory::SparseMemory;
pub use registers::Specifier;

pub mod unit {
    //! Collection of the units in which memory can be addressed (in bytes).

    /// A _byte_ is 8 bits.
    pub const BYTE: u64 = 1;

    /// A _halfword_ is 16 bits (2 bytes).
    pub const HALFWORD: u64 = 2;

    /// A _word_ is 32 bits (4 bytes).
    pub const WORD: u64 = 4;

    /// A _doubleword_ is 64 bits (8 bytes).
    pub const DOUBLEWORD: u64 = 8;
}
