//! Gated query execution.
//!
//! Every piece of text bound for the store passes through the execution gate
//! here first.

pub mod executor;

pub use executor::{QueryExecutor, QueryOutcome};
