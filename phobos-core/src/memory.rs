//! Sparse guest memory.
//!
//! The guest address space is a handful of byte-backed blocks (ELF segments, stack, heap, mmap
//! regions) floating in an otherwise unmapped 64-bit space. Blocks are kept sorted by base
//! address and looked up by binary search.

use crate::unit::{BYTE, DOUBLEWORD, HALFWORD, WORD};
use log::warn;
use thiserror::Error;

/// One contiguous run of guest memory.
#[derive(Debug, Clone)]
struct Block {
    /// Guest virtual address of the first byte.
    base: u64,
    data: Vec<u8>,
}

impl Block {
    /// Guest virtual address one past the last byte.
    fn end(&self) -> u64 {
        self.base + self.data.len() as u64
    }
}

/// A sparse mapping from guest virtual addresses to byte-backed blocks.
///
/// All multi-byte accesses are little-endian. An access is satisfied only by a single block that
/// fully contains it; accesses outside any block, or straddling two blocks, read as zero (writes
/// are dropped) and are reported through `log`. Blocks are never freed.
#[derive(Debug, Default)]
pub struct SparseMemory {
    /// Sorted by `base`; no two blocks overlap.
    blocks: Vec<Block>,
}

#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum MemoryError {
    #[error("block [{base:#x}, {base:#x}+{size:#x}) overlaps an existing block")]
    Overlap { base: u64, size: u64 },
}

impl SparseMemory {
    /// Returns an address space with nothing mapped.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a block of `size` bytes at `base`, copying `data` if provided and zero-filling the
    /// remainder.
    ///
    /// If an existing block ends exactly at `base`, the new request extends that block instead of
    /// creating a second one. Any other overlap with an existing block is rejected.
    pub fn add_block(&mut self, base: u64, size: u64, data: Option<&[u8]>) -> Result<(), MemoryError> {
        let mut bytes = vec![0u8; size as usize];
        if let Some(data) = data {
            let n = data.len().min(bytes.len());
            bytes[..n].copy_from_slice(&data[..n]);
        }

        // Index of the first block at or after `base`.
        let index = self.blocks.partition_point(|b| b.base < base);

        if let Some(next) = self.blocks.get(index) {
            if base + size > next.base {
                return Err(MemoryError::Overlap { base, size });
            }
        }
        if index > 0 {
            let prev = &mut self.blocks[index - 1];
            if prev.end() > base {
                return Err(MemoryError::Overlap { base, size });
            }
            if prev.end() == base {
                // Exact contiguous growth: extend the predecessor.
                prev.data.extend_from_slice(&bytes);
                return Ok(());
            }
        }

        self.blocks.insert(index, Block { base, data: bytes });
        Ok(())
    }

    /// Looks up the block fully containing `[va, va + size)`.
    fn find(&self, va: u64, size: u64) -> Option<&Block> {
        let index = self.blocks.partition_point(|b| b.base <= va);
        let block = self.blocks[..index].last()?;
        (va + size <= block.end()).then_some(block)
    }

    /// Reads `size` bytes (1, 2, 4, or 8) at `va`, zero-extended, little-endian.
    ///
    /// Returns 0 and reports a diagnostic if the access isn't fully contained in one block.
    pub fn read(&self, va: u64, size: u64) -> u64 {
        debug_assert!(matches!(size, BYTE | HALFWORD | WORD | DOUBLEWORD));
        let Some(block) = self.find(va, size) else {
            self.report_stray(va, size, "read");
            return 0;
        };
        let offset = (va - block.base) as usize;
        let mut bytes = [0u8; 8];
        bytes[..size as usize].copy_from_slice(&block.data[offset..offset + size as usize]);
        u64::from_le_bytes(bytes)
    }

    /// Writes the low `size` bytes (1, 2, 4, or 8) of `value` at `va`, little-endian.
    ///
    /// The write is dropped, with a diagnostic, if the access isn't fully contained in one block.
    pub fn write(&mut self, va: u64, size: u64, value: u64) {
        debug_assert!(matches!(size, BYTE | HALFWORD | WORD | DOUBLEWORD));
        if self.find(va, size).is_none() {
            self.report_stray(va, size, "write");
            return;
        }
        let index = self.blocks.partition_point(|b| b.base <= va);
        let block = &mut self.blocks[index - 1];
        let offset = (va - block.base) as usize;
        block.data[offset..offset + size as usize]
            .copy_from_slice(&value.to_le_bytes()[..size as usize]);
    }

    fn report_stray(&self, va: u64, size: u64, kind: &str) {
        // Distinguish a straddling access from a wholly unmapped one.
        let partial = self.find(va, 1).is_some();
        if partial {
            warn!("cross-block {kind} of {size} bytes at {va:#x}");
        } else {
            warn!("{kind} of {size} bytes outside allocated memory at {va:#x}");
        }
    }
}
