//! Undo log of original bytes.
//!
//! The log is append-only. Entries are kept in buckets that double in size up
//! to a cap, so appending never moves existing entries and long transactions
//! do not pay for one huge reallocation. Forward iteration drives nested
//! merges; reverse iteration drives undo.

use super::bump::{BumpAllocator, BumpSlice, BLOCK_SIZE};
use std::ptr;

/// Entries up to this many bytes keep their original value inline.
pub const INLINE_CAPACITY: usize = 8;

/// Largest byte count a single entry covers; longer writes are chunked.
pub const MAX_ENTRY_SIZE: usize = BLOCK_SIZE;

const FIRST_BUCKET_CAPACITY: usize = 64;
const MAX_BUCKET_CAPACITY: usize = 4096;

/// Where an entry keeps the bytes it must restore.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SavedBytes {
    /// Short values stored in the entry itself.
    Inline([u8; INLINE_CAPACITY]),
    /// Longer values stored in the log's bump allocator.
    External(BumpSlice),
}

/// One recorded span: where it lives and what it held before the write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteLogEntry {
    address: usize,
    size: usize,
    saved: SavedBytes,
}

impl WriteLogEntry {
    /// Returns the first byte address of the span.
    #[must_use]
    pub const fn address(&self) -> usize {
        self.address
    }

    /// Returns the span length in bytes.
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Returns true if the saved bytes are stored inline.
    #[must_use]
    pub const fn is_inline(&self) -> bool {
        matches!(self.saved, SavedBytes::Inline(_))
    }

    fn rebased(self, block_offset: u32) -> Self {
        match self.saved {
            SavedBytes::Inline(_) => self,
            SavedBytes::External(slice) => Self {
                saved: SavedBytes::External(slice.rebased(block_offset)),
                ..self
            },
        }
    }
}

/// Append-only undo log owned by one transaction.
#[derive(Debug, Default)]
pub struct WriteLog {
    buckets: Vec<Vec<WriteLogEntry>>,
    len: usize,
    total_bytes: usize,
    arena: BumpAllocator,
}

impl WriteLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Saves the current contents of `[address, address + size)`.
    ///
    /// Spans longer than [`MAX_ENTRY_SIZE`] are split into several entries.
    /// Returns the number of entries appended.
    ///
    /// # Safety
    ///
    /// The whole range must be valid for reads.
    pub unsafe fn record(&mut self, address: usize, size: usize) -> usize {
        let mut offset = 0;
        let mut appended = 0;
        while offset < size {
            let chunk = (size - offset).min(MAX_ENTRY_SIZE);
            // SAFETY: the caller guarantees the full range is readable.
            let current = unsafe { std::slice::from_raw_parts((address + offset) as *const u8, chunk) };
            self.save(address + offset, current);
            offset += chunk;
            appended += 1;
        }
        appended
    }

    /// Appends an entry holding a copy of `original` for `address`.
    ///
    /// # Panics
    ///
    /// Panics if `original` is longer than [`MAX_ENTRY_SIZE`].
    pub fn save(&mut self, address: usize, original: &[u8]) {
        let saved = if original.len() <= INLINE_CAPACITY {
            let mut bytes = [0u8; INLINE_CAPACITY];
            bytes[..original.len()].copy_from_slice(original);
            SavedBytes::Inline(bytes)
        } else {
            SavedBytes::External(self.arena.alloc(original))
        };
        self.push(WriteLogEntry {
            address,
            size: original.len(),
            saved,
        });
    }

    fn push(&mut self, entry: WriteLogEntry) {
        let full = self
            .buckets
            .last()
            .map_or(true, |bucket| bucket.len() == bucket.capacity());
        if full {
            let capacity = self
                .buckets
                .last()
                .map_or(FIRST_BUCKET_CAPACITY, |bucket| {
                    (bucket.capacity() * 2).min(MAX_BUCKET_CAPACITY)
                });
            self.buckets.push(Vec::with_capacity(capacity));
        }
        if let Some(bucket) = self.buckets.last_mut() {
            bucket.push(entry);
        }
        self.len += 1;
        self.total_bytes += entry.size;
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if nothing has been logged.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the number of original bytes held.
    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    /// Iterates entries in the order they were appended.
    ///
    /// Use `.rev()` for undo order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &WriteLogEntry> + '_ {
        self.buckets.iter().flat_map(|bucket| bucket.iter())
    }

    /// Returns the original bytes saved for `entry`.
    pub fn saved_bytes<'a>(&'a self, entry: &'a WriteLogEntry) -> &'a [u8] {
        match &entry.saved {
            SavedBytes::Inline(bytes) => &bytes[..entry.size],
            SavedBytes::External(slice) => self.arena.get(*slice),
        }
    }

    /// Copies the saved bytes of `entry` back over its span.
    ///
    /// # Safety
    ///
    /// The entry's span must be valid for writes.
    pub unsafe fn restore(&self, entry: &WriteLogEntry) {
        let original = self.saved_bytes(entry);
        // SAFETY: the caller guarantees the span is writable; the saved bytes
        // live in the log, never in user memory.
        unsafe { ptr::copy_nonoverlapping(original.as_ptr(), entry.address as *mut u8, original.len()) };
    }

    /// Restores every entry, most recent first.
    ///
    /// # Safety
    ///
    /// Every logged span must be valid for writes.
    pub unsafe fn undo(&self) {
        for entry in self.iter().rev() {
            // SAFETY: forwarded from the caller.
            unsafe { self.restore(entry) };
        }
    }

    /// Moves this log into `parent`, appending entries for which `keep`
    /// returns true.
    ///
    /// The bump blocks move with the entries and are not copied. Returns the
    /// number of entries dropped.
    pub fn merge_into(
        self,
        parent: &mut WriteLog,
        mut keep: impl FnMut(&WriteLogEntry) -> bool,
    ) -> usize {
        let Self { buckets, arena, .. } = self;
        let block_offset = parent.arena.absorb(arena);

        let mut dropped = 0;
        for entry in buckets.into_iter().flatten() {
            if keep(&entry) {
                parent.push(entry.rebased(block_offset));
            } else {
                dropped += 1;
            }
        }
        dropped
    }

    /// Discards every entry and saved byte.
    pub fn reset(&mut self) {
        self.buckets.clear();
        self.arena.reset();
        self.len = 0;
        self.total_bytes = 0;
    }
}
