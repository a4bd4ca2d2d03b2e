//! The top-level fetch-decode-execute loop.

use crate::execute::Executor;
use crate::hart::Hart;
use crate::host::Host;
use crate::instruction::{decode16, decode32};
use crate::memory::SparseMemory;
use log::warn;

/// Why a [`run`](Emulator::run) stopped.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum StopReason {
    /// The guest called exit/exit_group with the recorded status.
    Exited(u64),
    /// PC landed in the reserved low range `[0, 63]`: the guest returned from `_start`.
    ReturnedToShell,
    /// The configured instruction budget elapsed.
    BudgetExhausted,
}

/// Result of a completed run: the stop reason and the number of retired instructions.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct RunOutcome {
    pub reason: StopReason,
    pub instructions: u64,
}

/// A single-hart simulator instance: architectural state, guest memory, and the host shim,
/// driven synchronously one instruction at a time.
#[derive(Debug)]
pub struct Emulator {
    pub hart: Hart,
    pub memory: SparseMemory,
    pub host: Host,
    /// When set, every retired instruction prints its index and disassembly.
    trace: bool,
    instructions: u64,
}

impl Emulator {
    pub fn new(hart: Hart, memory: SparseMemory, host: Host) -> Self {
        Self {
            hart,
            memory,
            host,
            trace: false,
            instructions: 0,
        }
    }

    /// Enables the per-instruction disassembly trace.
    pub fn set_trace(&mut self, trace: bool) {
        self.trace = trace;
    }

    /// Number of instructions retired so far (undecodable parcels count too; they consume a
    /// fetch and advance PC).
    pub fn instructions(&self) -> u64 {
        self.instructions
    }

    /// Fetches, decodes and executes one instruction.
    ///
    /// The low two bits of the first parcel distinguish the encodings: `11` means a 32-bit
    /// instruction, anything else a compressed 16-bit one. An undecodable parcel is skipped by
    /// advancing PC its own size.
    pub fn step(&mut self) {
        let pc = self.hart.pc();
        let parcel = self.hart.read_imem(&self.memory, pc, 2);

        let (decoded, size) = if parcel & 0b11 == 0b11 {
            let raw = self.hart.read_imem(&self.memory, pc, 4) as u32;
            (decode32(raw), 4)
        } else {
            (decode16(parcel as u16), 2)
        };

        match decoded {
            Ok(instruction) => {
                if self.trace {
                    println!("{:>12} {:#010x} {}", self.instructions, pc, instruction);
                }
                Executor {
                    hart: &mut self.hart,
                    memory: &mut self.memory,
                    host: &mut self.host,
                    size,
                }
                .execute(&instruction);
            }
            Err(err) => {
                warn!("no decode at {pc:#x} ({err}); skipping {size} bytes");
                self.hart.inc_pc(size as i64);
            }
        }
        self.instructions += 1;
    }

    /// True when a stop condition holds: guest exit, or PC in the reserved `[0, 63]` range.
    pub fn stopped(&self) -> bool {
        self.host.exited() || self.hart.pc() <= 63
    }

    /// Runs until the guest exits, control returns to the reserved low range, or
    /// `max_instructions` (if nonzero) elapse. Stop conditions are checked between
    /// instructions.
    pub fn run(&mut self, max_instructions: u64) -> RunOutcome {
        loop {
            if self.host.exited() {
                return self.outcome(StopReason::Exited(self.host.exit_status()));
            }
            if self.hart.pc() <= 63 {
                return self.outcome(StopReason::ReturnedToShell);
            }
            if max_instructions != 0 && self.instructions >= max_instructions {
                return self.outcome(StopReason::BudgetExhausted);
            }
            self.step();
        }
    }

    fn outcome(&self, reason: StopReason) -> RunOutcome {
        RunOutcome {
            reason,
            instructions: self.instructions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emulator_with_program(base: u64, words: &[u32]) -> Emulator {
        let mut memory = SparseMemory::new();
        let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
        memory.add_block(base, bytes.len() as u64, Some(&bytes)).unwrap();
        let mut hart = Hart::new(base);
        hart.set_pc(base);
        Emulator::new(hart, memory, Host::new("test".into()))
    }

    #[test]
    fn test_run_until_exit() {
        // addi x17, x0, 93; addi x10, x0, 7; ecall
        let mut emulator =
            emulator_with_program(0x100, &[0x05D0_0893, 0x0070_0513, 0x0000_0073]);
        let outcome = emulator.run(0);
        assert_eq!(StopReason::Exited(7), outcome.reason);
        assert_eq!(3, outcome.instructions);
    }

    #[test]
    fn test_run_honors_budget() {
        // jal x0, 0 spins forever
        let mut emulator = emulator_with_program(0x100, &[0x0000_006F]);
        let outcome = emulator.run(10);
        assert_eq!(StopReason::BudgetExhausted, outcome.reason);
        assert_eq!(10, outcome.instructions);
    }

    #[test]
    fn test_return_to_shell() {
        // jalr x0, 0(x0) jumps to address 0
        let mut emulator = emulator_with_program(0x100, &[0x0000_0067]);
        let outcome = emulator.run(0);
        assert_eq!(StopReason::ReturnedToShell, outcome.reason);
        assert_eq!(1, outcome.instructions);
    }

    #[test]
    fn test_undecodable_parcel_is_skipped() {
        // custom-0 word, then the exit sequence
        let mut emulator = emulator_with_program(
            0x100,
            &[0x0000_000B, 0x05D0_0893, 0x0000_0513, 0x0000_0073],
        );
        let outcome = emulator.run(0);
        assert_eq!(StopReason::Exited(0), outcome.reason);
        assert_eq!(4, outcome.instructions);
    }

    #[test]
    fn test_mixed_width_fetch() {
        // c.li x11, -4 (2 bytes) followed by addi x12, x11, 1 (4 bytes)
        let mut memory = SparseMemory::new();
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&0x55F1_u16.to_le_bytes());
        bytes.extend_from_slice(&0x0015_8613_u32.to_le_bytes());
        memory.add_block(0x200, bytes.len() as u64, Some(&bytes)).unwrap();
        let hart = Hart::new(0x200);
        let mut emulator = Emulator::new(hart, memory, Host::new("test".into()));

        emulator.step();
        assert_eq!(0x202, emulator.hart.pc());
        emulator.step();
        assert_eq!(0x206, emulator.hart.pc());
        assert_eq!(
            0xFFFF_FFFF_FFFF_FFFD,
            emulator.hart.x(crate::registers::Specifier::from_u5(12))
        );
    }
}
