//! Control and status registers.
//!
//! Only the unprivileged floating-point CSRs have architected behavior here; every other
//! specifier is opaque 64-bit storage. Machine/supervisor CSRs are out of scope for a purely
//! functional user-level simulator.

use std::collections::HashMap;

/// General 12-bit value representing a CSR specifier. Note that this can hold any 12-bit value,
/// even if the value represents an unsupported or non-existent CSR.
pub type CsrSpecifier = u16;

//
// Unprivileged floating-point CSRs (`0x001..=0x003`).
//
/// Floating-point accrued exceptions.
pub const FFLAGS: CsrSpecifier = 0x001;
/// Floating-point dynamic rounding mode.
pub const FRM: CsrSpecifier = 0x002;
/// Floating-point CSR ([`FRM`] + [`FFLAGS`]).
pub const FCSR: CsrSpecifier = 0x003;

/// Bit range of [`FFLAGS`] within [`FCSR`]: bits [4:0].
const FFLAGS_MASK: u64 = 0x1F;
/// Bit range of [`FRM`] within [`FCSR`]: bits [7:5].
const FRM_MASK: u64 = 0xE0;
const FRM_SHIFT: u32 = 5;

/// A sparse CSR file.
///
/// Values are stored per specifier on first write; reading a specifier that was never written
/// yields 0.
///
/// > The fflags and frm registers are subfields of the fcsr register. All three are accessible
/// > through separate CSR addresses.
///
/// Accordingly, [`FFLAGS`] and [`FRM`] are not backed by their own storage: reads extract the
/// corresponding bit range of the stored [`FCSR`] value, and writes are read-modify-write on it.
#[derive(Debug, Clone, Default)]
pub struct Csrs {
    values: HashMap<CsrSpecifier, u64>,
}

impl Csrs {
    /// Returns a CSR file with no registers written yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Maps a specifier to the one actually backed by storage.
    fn parent(specifier: CsrSpecifier) -> CsrSpecifier {
        match specifier {
            FFLAGS | FRM => FCSR,
            other => other,
        }
    }

    /// Reads the value of a CSR. Absent CSRs read as 0.
    pub fn read(&self, specifier: CsrSpecifier) -> u64 {
        let stored = self
            .values
            .get(&Self::parent(specifier))
            .copied()
            .unwrap_or(0);
        match specifier {
            FFLAGS => stored & FFLAGS_MASK,
            FRM => (stored & FRM_MASK) >> FRM_SHIFT,
            _ => stored,
        }
    }

    /// Writes the value of a CSR.
    ///
    /// Writes to [`FFLAGS`] and [`FRM`] only replace their bit range within the stored [`FCSR`]
    /// value; all other specifiers are written whole.
    pub fn write(&mut self, specifier: CsrSpecifier, value: u64) {
        let parent = Self::parent(specifier);
        let stored = self.values.entry(parent).or_insert(0);
        match specifier {
            FFLAGS => *stored = (*stored & !FFLAGS_MASK) | (value & FFLAGS_MASK),
            FRM => *stored = (*stored & !FRM_MASK) | ((value << FRM_SHIFT) & FRM_MASK),
            _ => *stored = value,
        }
    }

    /// Replaces the value of a CSR, returning the value it read back first.
    ///
    /// This is the primitive the CSRRW family builds on: the read and the write observe the same
    /// subfield mapping.
    pub fn replace(&mut self, specifier: CsrSpecifier, value: u64) -> u64 {
        let old = self.read(specifier);
        self.write(specifier, value);
        old
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_reads_zero() {
        let csrs = Csrs::new();
        assert_eq!(0, csrs.read(FCSR));
        assert_eq!(0, csrs.read(0x305));
    }

    #[test]
    fn test_opaque_storage() {
        let mut csrs = Csrs::new();
        csrs.write(0x305, 0x1234_5678_9ABC_DEF0);
        assert_eq!(0x1234_5678_9ABC_DEF0, csrs.read(0x305));
    }

    #[test]
    fn test_fflags_masks_to_five_bits() {
        let mut csrs = Csrs::new();
        csrs.write(FFLAGS, 0xFF);
        assert_eq!(0x1F, csrs.read(FFLAGS));
        assert_eq!(0x1F, csrs.read(FCSR));
    }

    #[test]
    fn test_frm_is_fcsr_bits_7_5() {
        let mut csrs = Csrs::new();
        csrs.write(FRM, 0b101);
        assert_eq!(0b101, csrs.read(FRM));
        assert_eq!(0b101 << 5, csrs.read(FCSR));
    }

    #[test]
    fn test_cross_field_independence() {
        let mut csrs = Csrs::new();
        csrs.write(FRM, 0b111);
        csrs.write(FFLAGS, 0b0_1010);
        assert_eq!(0b111, csrs.read(FRM));
        assert_eq!(0b0_1010, csrs.read(FFLAGS));
        assert_eq!((0b111 << 5) | 0b0_1010, csrs.read(FCSR));

        // Writing fflags with high garbage must not disturb frm.
        csrs.write(FFLAGS, 0xFFFF_FFFF_FFFF_FFE1);
        assert_eq!(0b111, csrs.read(FRM));
        assert_eq!(1, csrs.read(FFLAGS));
    }

    #[test]
    fn test_fcsr_write_sets_both_views() {
        let mut csrs = Csrs::new();
        csrs.write(FCSR, 0b101_11011);
        assert_eq!(0b101, csrs.read(FRM));
        assert_eq!(0b11011, csrs.read(FFLAGS));
    }

    #[test]
    fn test_replace_reads_old_value() {
        let mut csrs = Csrs::new();
        csrs.write(FFLAGS, 3);
        assert_eq!(3, csrs.replace(FFLAGS, 4));
        assert_eq!(4, csrs.read(FFLAGS));
    }
}
