//! # Rewind Testkit
//!
//! Test utilities for the Rewind runtime.
//!
//! This crate provides:
//! - Test fixtures: context wrappers and heap slot buffers
//! - Transaction plans with a reference model
//! - Property-based test generators using proptest
//! - The built-in end-to-end scenarios
//! - Stress testing utilities
//!
//! ## Usage
//!
//! ```rust
//! use rewind_testkit::prelude::*;
//!
//! let ctx = TestContext::new();
//! let buffer = SlotBuffer::new(4);
//! let plan = TxPlan::abort(vec![Step::Write(WriteOp { slot: 2, value: 9 })]);
//!
//! let mut model = buffer.snapshot();
//! let expected = apply_to_model(&mut model, &plan);
//! assert_eq!(run_plan(&ctx, &buffer, &plan), expected);
//! assert_eq!(buffer.snapshot(), model);
//! ```

#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod plan;
pub mod scenarios;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::plan::*;
    pub use crate::scenarios::*;
    pub use crate::stress::*;
}

pub use fixtures::*;
pub use generators::*;
pub use plan::*;
pub use scenarios::*;
pub use stress::*;
