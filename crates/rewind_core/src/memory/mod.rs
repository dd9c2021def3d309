//! Undo-logging primitives.
//!
//! Each transaction owns one of each:
//! - [`WriteLog`] - original bytes of every span the transaction overwrote
//! - [`HitSet`] - spans already logged, so repeated writes log once
//! - [`NewMemoryTracker`] - ranges the transaction allocated itself

pub mod bump;
pub mod hit_set;
pub mod new_memory;
pub mod write_log;

pub use bump::{BumpAllocator, BumpSlice, BLOCK_SIZE};
pub use hit_set::HitSet;
pub use new_memory::NewMemoryTracker;
pub use write_log::{SavedBytes, WriteLog, WriteLogEntry, INLINE_CAPACITY, MAX_ENTRY_SIZE};
