//! Test fixtures and context helpers.
//!
//! Provides a context wrapper and leaked heap buffers whose writes go
//! through the runtime.

use rewind_core::{Context, RetryMode, RuntimeConfig, TxResult};
use std::cell::Cell;

/// A context for tests, with a convenient constructor per configuration.
#[derive(Debug)]
pub struct TestContext {
    /// The context instance.
    pub ctx: Context,
}

impl TestContext {
    /// Creates a context with the default configuration.
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    /// Creates a context with the given configuration.
    pub fn with_config(config: RuntimeConfig) -> Self {
        Self {
            ctx: Context::new(config),
        }
    }

    /// Creates a context that retries transactions once.
    pub fn with_retry(mode: RetryMode) -> Self {
        Self::with_config(RuntimeConfig::new().retry(mode))
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TestContext {
    type Target = Context;

    fn deref(&self) -> &Self::Target {
        &self.ctx
    }
}

/// Heap-allocated `u64` slots written through a context.
///
/// The slots are leaked: a rollback may restore them after any transaction
/// that wrote them, nested ones included, so the storage never goes away.
/// That is what lets [`SlotBuffer::write`] be safe.
#[derive(Debug)]
pub struct SlotBuffer {
    slots: &'static [Cell<u64>],
}

impl SlotBuffer {
    /// Creates `len` slots holding `0, 1, 2, ...`.
    pub fn new(len: usize) -> Self {
        Self::from_values((0..len as u64).collect())
    }

    /// Creates slots holding `values`.
    pub fn from_values(values: Vec<u64>) -> Self {
        let slots: Box<[Cell<u64>]> = values.into_iter().map(Cell::new).collect();
        Self {
            slots: Box::leak(slots),
        }
    }

    /// Returns the number of slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns true if there are no slots.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Returns the value of `slot`.
    pub fn get(&self, slot: usize) -> u64 {
        self.slots[slot].get()
    }

    /// Records `slot` with `ctx` and stores `value` into it.
    pub fn write(&self, ctx: &Context, slot: usize, value: u64) -> TxResult<()> {
        let cell = &self.slots[slot];
        // SAFETY: the slots are leaked, so they stay allocated and in place.
        unsafe { ctx.record_write_of(cell)? };
        cell.set(value);
        Ok(())
    }

    /// Returns every slot value.
    pub fn snapshot(&self) -> Vec<u64> {
        self.slots.iter().map(Cell::get).collect()
    }
}

/// Leaked bytes recorded through a context, for span-sized writes.
#[derive(Debug)]
pub struct ByteBuffer {
    bytes: &'static [Cell<u8>],
}

impl ByteBuffer {
    /// Creates a buffer holding `data`.
    pub fn new(data: Vec<u8>) -> Self {
        let bytes: Box<[Cell<u8>]> = data.into_iter().map(Cell::new).collect();
        Self {
            bytes: Box::leak(bytes),
        }
    }

    /// Returns the number of bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns true if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Records `len` bytes starting at `offset` without changing them.
    pub fn record(&self, ctx: &Context, offset: usize, len: usize) -> TxResult<()> {
        let span = &self.bytes[offset..offset + len];
        // SAFETY: the bytes are leaked, so they stay allocated and in place.
        unsafe { ctx.record_write_of(span) }
    }

    /// Records the whole buffer and sets every byte to `value`.
    pub fn fill(&self, ctx: &Context, value: u8) -> TxResult<()> {
        self.record(ctx, 0, self.len())?;
        self.bytes.iter().for_each(|byte| byte.set(value));
        Ok(())
    }

    /// Returns a copy of the bytes.
    pub fn snapshot(&self) -> Vec<u8> {
        self.bytes.iter().map(Cell::get).collect()
    }
}
