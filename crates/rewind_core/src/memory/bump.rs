//! Bump allocator for saved bytes.
//!
//! Blocks are fixed-capacity byte vectors that never reallocate, so a
//! [`BumpSlice`] stays valid for the life of the allocator. Merging one
//! allocator into another moves its blocks and yields the index offset the
//! moved slices need.

/// Capacity of one block, and the largest single allocation.
pub const BLOCK_SIZE: usize = 4096;

/// Handle to bytes held by a [`BumpAllocator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BumpSlice {
    block: u32,
    offset: u32,
    len: u32,
}

impl BumpSlice {
    /// Returns the number of bytes referenced.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len as usize
    }

    /// Returns true if the slice is empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Shifts the block index after the owning blocks moved.
    #[must_use]
    pub(crate) const fn rebased(self, block_offset: u32) -> Self {
        Self {
            block: self.block + block_offset,
            ..self
        }
    }
}

/// Append-only arena of byte blocks.
#[derive(Debug, Default)]
pub struct BumpAllocator {
    blocks: Vec<Vec<u8>>,
}

impl BumpAllocator {
    /// Creates an empty allocator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies `bytes` into the arena.
    ///
    /// # Panics
    ///
    /// Panics if `bytes` is longer than [`BLOCK_SIZE`].
    pub fn alloc(&mut self, bytes: &[u8]) -> BumpSlice {
        assert!(
            bytes.len() <= BLOCK_SIZE,
            "allocation of {} bytes exceeds block size {BLOCK_SIZE}",
            bytes.len()
        );

        let needs_block = self
            .blocks
            .last()
            .map_or(true, |block| BLOCK_SIZE - block.len() < bytes.len());
        if needs_block {
            self.blocks.push(Vec::with_capacity(BLOCK_SIZE));
        }

        let block_index = self.blocks.len() - 1;
        let block = &mut self.blocks[block_index];
        let offset = block.len();
        block.extend_from_slice(bytes);

        BumpSlice {
            block: block_index as u32,
            offset: offset as u32,
            len: bytes.len() as u32,
        }
    }

    /// Returns the bytes behind `slice`.
    pub fn get(&self, slice: BumpSlice) -> &[u8] {
        let start = slice.offset as usize;
        &self.blocks[slice.block as usize][start..start + slice.len()]
    }

    /// Moves every block of `other` behind the blocks of `self`.
    ///
    /// Returns the amount to add to the block index of each slice that was
    /// allocated from `other`.
    pub fn absorb(&mut self, other: BumpAllocator) -> u32 {
        let offset = self.blocks.len() as u32;
        self.blocks.extend(other.blocks);
        offset
    }

    /// Returns the number of blocks held.
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Releases every block.
    pub fn reset(&mut self) {
        self.blocks.clear();
    }
}
