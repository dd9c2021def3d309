//! Benchmarks for the Rewind runtime.
//!
//! Run with `cargo bench -p rewind_bench`.

#![warn(missing_docs)]

pub mod utils;
