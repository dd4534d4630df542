//! Embedded analytical store.
//!
//! Ingested tables live in a single SQLite connection with every column typed
//! as text. The normalization functions are registered on that connection so
//! compiled queries can coerce values at query time.

mod sqlite;
mod types;

pub use sqlite::SqliteStore;
pub use types::{ColumnInfo, QueryResult, Row, Value};

use async_trait::async_trait;

use crate::catalog::TableSchema;
use crate::error::Result;

/// Query timeout in seconds when none is configured.
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 30;

/// Maximum number of rows returned by a query when none is configured.
pub const DEFAULT_MAX_ROWS: usize = 1000;

/// Interface of the store behind the execution gate.
#[async_trait]
pub trait Store: Send + Sync {
    /// Runs one read-only query and returns its (possibly truncated) rows.
    ///
    /// Callers must have passed the text through the execution gate first.
    async fn execute_query(&self, sql: &str) -> Result<QueryResult>;

    /// Creates or replaces a table with the given text rows.
    ///
    /// This is the internal write path used by ingestion; it never runs
    /// caller-supplied SQL. Returns the number of rows written.
    async fn replace_table(
        &self,
        schema: &TableSchema,
        rows: Vec<Vec<Option<String>>>,
    ) -> Result<usize>;
}
