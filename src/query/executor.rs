//! Query execution behind the read-only gate.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::compiler::CompiledQuery;
use crate::error::Result;
use crate::safety::ExecutionGate;
use crate::store::{QueryResult, Store};

/// Runs compiled queries against the store once the gate has passed them.
pub struct QueryExecutor {
    gate: ExecutionGate,
    store: Arc<dyn Store>,
}

impl QueryExecutor {
    /// Creates an executor over the given store.
    pub fn new(store: Arc<dyn Store>) -> Result<Self> {
        Ok(Self {
            gate: ExecutionGate::new()?,
            store,
        })
    }

    /// Gates and executes a compiled query.
    pub async fn execute(&self, query: &CompiledQuery) -> Result<QueryOutcome> {
        self.execute_sql(query.sql()).await
    }

    /// Gates and executes raw query text.
    ///
    /// Rejected text never reaches the store.
    pub async fn execute_sql(&self, sql: &str) -> Result<QueryOutcome> {
        self.gate.check(sql)?;
        debug!(sql_len = sql.len(), "Query passed execution gate");

        let start = Instant::now();
        let result = self.store.execute_query(sql).await?;
        let execution_time = start.elapsed();

        info!(
            row_count = result.row_count,
            truncated = result.was_truncated,
            duration_ms = execution_time.as_millis() as u64,
            "Query executed"
        );

        Ok(QueryOutcome {
            result,
            execution_time,
        })
    }
}

/// Successful query execution outcome.
#[derive(Debug)]
pub struct QueryOutcome {
    /// The query result.
    pub result: QueryResult,
    /// Wall-clock time including waiting for the store.
    pub execution_time: Duration,
}
