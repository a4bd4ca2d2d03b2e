//! The architectural state of the simulated hart.

use crate::csr::{Csrs, CsrSpecifier};
use crate::memory::SparseMemory;
use crate::registers::{FRegisters, Registers, Specifier};
use log::trace;

/// All architected state of the single simulated hart: the integer and floating-point register
/// files, the program counter (inside [`Registers`]), and the CSR file.
///
/// Guest memory is not owned here; the executor and the host shim borrow the hart and the
/// [`SparseMemory`] side by side. The traced accessors below are the data-access path; instruction
/// fetch goes through [`Hart::read_imem`], which is exempt from tracing so fetches don't drown the
/// data-access log.
#[derive(Debug, Default)]
pub struct Hart {
    pub registers: Registers,
    pub fregisters: FRegisters,
    pub csrs: Csrs,
}

impl Hart {
    /// Returns a hart in its reset state with `pc` set to `initial_pc`.
    pub fn new(initial_pc: u64) -> Self {
        Self {
            registers: Registers::new(initial_pc),
            fregisters: FRegisters::new(),
            csrs: Csrs::new(),
        }
    }

    /// Returns the value of an `x` register.
    pub fn x(&self, specifier: Specifier) -> u64 {
        self.registers.x(specifier)
    }

    /// Sets the value of an `x` register (writes to `x0` are discarded).
    pub fn set_x(&mut self, specifier: Specifier, value: u64) {
        trace!("setReg {specifier} = {value:#x}");
        self.registers.set_x(specifier, value);
    }

    /// Returns the value of the `pc` register.
    pub fn pc(&self) -> u64 {
        self.registers.pc()
    }

    /// Sets the `pc` register.
    pub fn set_pc(&mut self, pc: u64) {
        *self.registers.pc_mut() = pc;
    }

    /// Advances the `pc` register by a signed delta.
    pub fn inc_pc(&mut self, delta: i64) {
        let pc = self.registers.pc_mut();
        *pc = pc.wrapping_add_signed(delta);
    }

    /// Reads a CSR. Absent CSRs read as 0.
    pub fn csr(&self, specifier: CsrSpecifier) -> u64 {
        self.csrs.read(specifier)
    }

    /// Writes a CSR.
    pub fn set_csr(&mut self, specifier: CsrSpecifier, value: u64) {
        trace!("setCr {specifier:#x} = {value:#x}");
        self.csrs.write(specifier, value);
    }

    /// Reads `size` bytes of guest memory as data (traced).
    pub fn read_mem(&self, memory: &SparseMemory, va: u64, size: u64) -> u64 {
        let value = memory.read(va, size);
        trace!("readMem {va:#x} {size} = {value:#x}");
        value
    }

    /// Reads `size` bytes of guest memory as an instruction fetch.
    ///
    /// Identical to [`read_mem`](Self::read_mem) except it never traces; fetch is not a data
    /// access.
    pub fn read_imem(&self, memory: &SparseMemory, va: u64, size: u64) -> u64 {
        memory.read(va, size)
    }

    /// Writes the low `size` bytes of `value` to guest memory (traced).
    pub fn write_mem(&self, memory: &mut SparseMemory, va: u64, size: u64, value: u64) {
        trace!("writeMem {va:#x} {size} = {value:#x}");
        memory.write(va, size, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_state() {
        let hart = Hart::new(0x1_0000);
        assert_eq!(0x1_0000, hart.pc());
        for r in Specifier::iter_all() {
            assert_eq!(0, hart.x(r));
            assert_eq!(0, hart.fregisters.bits(r));
        }
    }

    #[test]
    fn test_inc_pc_signed() {
        let mut hart = Hart::new(0x100);
        hart.inc_pc(4);
        assert_eq!(0x104, hart.pc());
        hart.inc_pc(-8);
        assert_eq!(0xFC, hart.pc());
    }

    #[test]
    fn test_register_memory_round_trip() {
        let mut hart = Hart::new(0);
        let mut memory = SparseMemory::new();
        memory.add_block(0x1000, 64, None).unwrap();

        let r = Specifier::from_u5(9);
        hart.set_x(r, 0xDEAD_BEEF_CAFE_F00D);
        hart.write_mem(&mut memory, 0x1008, 8, hart.x(r));
        assert_eq!(0xDEAD_BEEF_CAFE_F00D, hart.read_mem(&memory, 0x1008, 8));
    }
}
