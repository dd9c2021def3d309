//! Transactions and the call nests that bound them.

mod call_nest;
mod state;

pub(crate) use call_nest::{CallNest, NestKind};
pub(crate) use state::{RecordOutcome, Transaction};
