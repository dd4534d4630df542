//! SheetQL - ask analytical questions in plain language over uploaded spreadsheets.
//!
//! A question is translated by a language model into a structured intent,
//! validated against the schema catalog, compiled into quoted read-only SQL,
//! checked by the execution gate and run against an embedded SQLite store.

pub mod app;
pub mod catalog;
pub mod cli;
pub mod compiler;
pub mod config;
pub mod error;
pub mod ingest;
pub mod intent;
pub mod llm;
pub mod logging;
pub mod normalize;
pub mod query;
pub mod safety;
pub mod store;
