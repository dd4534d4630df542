//! SQLite-backed store.

use rusqlite::functions::{Context, FunctionFlags};
use rusqlite::types::ValueRef;
use rusqlite::{params_from_iter, Connection, InterruptHandle};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use async_trait::async_trait;

use super::{ColumnInfo, QueryResult, Row, Store, Value, DEFAULT_MAX_ROWS, DEFAULT_QUERY_TIMEOUT_SECS};
use crate::catalog::TableSchema;
use crate::compiler::quote_ident;
use crate::error::{Result, SheetqlError};
use crate::normalize::{parse_amount, parse_date_iso, AMOUNT_FN, DATE_FN};

/// Store backed by one SQLite connection.
///
/// Queries run on the blocking thread pool; the connection is shared behind a
/// mutex so statements execute one at a time.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    interrupt: Arc<InterruptHandle>,
    max_rows: usize,
    timeout: Duration,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("max_rows", &self.max_rows)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Opens a private in-memory store.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    /// Opens (or creates) a store backed by a database file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|e| {
            SheetqlError::execution(format!("Failed to open store '{}': {}", path.display(), e))
        })?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        register_normalizers(&conn)?;
        let interrupt = Arc::new(conn.get_interrupt_handle());
        debug!("Store opened with normalization functions registered");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            interrupt,
            max_rows: DEFAULT_MAX_ROWS,
            timeout: Duration::from_secs(DEFAULT_QUERY_TIMEOUT_SECS),
        })
    }

    /// Sets the row cap and per-query timeout.
    pub fn with_limits(mut self, max_rows: usize, timeout: Duration) -> Self {
        self.max_rows = max_rows.max(1);
        self.timeout = timeout;
        self
    }

    /// Returns the per-query timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn run_blocking<T, F>(&self, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| SheetqlError::internal("Store connection lock poisoned"))?;
            work(&mut guard)
        })
        .await
        .map_err(|e| SheetqlError::internal(format!("Store task failed: {}", e)))?
    }
}

/// Progress of one query job on the shared connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobState {
    Queued,
    Running,
    Finished,
    Cancelled,
}

/// Shared between a query job and the request awaiting it.
///
/// `sqlite3_interrupt` acts on the whole connection, so a timed-out request
/// may only interrupt while its own job is `Running`. The job moves to
/// `Finished` before releasing the connection lock.
#[derive(Debug)]
struct QueryTicket {
    state: Mutex<JobState>,
}

impl QueryTicket {
    fn new() -> Self {
        Self {
            state: Mutex::new(JobState::Queued),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, JobState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Called with the connection lock held. Returns false if the request
    /// already gave up on this job.
    fn begin(&self) -> bool {
        let mut state = self.state();
        if *state == JobState::Cancelled {
            return false;
        }
        *state = JobState::Running;
        true
    }

    fn finish(&self) {
        *self.state() = JobState::Finished;
    }

    /// Gives up on the job, interrupting it only if it owns the connection.
    /// Returns the state the job was in.
    fn cancel(&self, interrupt: &InterruptHandle) -> JobState {
        let mut state = self.state();
        let previous = *state;
        match previous {
            JobState::Queued => *state = JobState::Cancelled,
            JobState::Running => interrupt.interrupt(),
            JobState::Finished | JobState::Cancelled => {}
        }
        previous
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn execute_query(&self, sql: &str) -> Result<QueryResult> {
        let sql = sql.to_string();
        let max_rows = self.max_rows;
        let ticket = Arc::new(QueryTicket::new());
        let job_ticket = Arc::clone(&ticket);

        let job = self.run_blocking(move |conn| {
            if !job_ticket.begin() {
                return Err(SheetqlError::execution("Query cancelled before it started"));
            }
            let result = run_query(conn, &sql, max_rows);
            job_ticket.finish();
            result
        });

        match tokio::time::timeout(self.timeout, job).await {
            Ok(result) => result,
            Err(_) => {
                let state = ticket.cancel(&self.interrupt);
                warn!(
                    timeout_secs = self.timeout.as_secs_f64(),
                    job_state = ?state,
                    "Query timed out"
                );
                Err(SheetqlError::execution(format!(
                    "Query timed out after {} seconds",
                    self.timeout.as_secs_f64()
                )))
            }
        }
    }

    async fn replace_table(
        &self,
        schema: &TableSchema,
        rows: Vec<Vec<Option<String>>>,
    ) -> Result<usize> {
        let schema = schema.clone();
        self.run_blocking(move |conn| write_table(conn, &schema, &rows))
            .await
    }
}

fn run_query(conn: &mut Connection, sql: &str, max_rows: usize) -> Result<QueryResult> {
    let start = Instant::now();
    let mut stmt = conn.prepare(sql)?;

    if !stmt.readonly() {
        return Err(SheetqlError::forbidden(
            "the store refused a statement that is not read-only",
        ));
    }

    let names: Vec<String> = stmt.column_names().iter().map(|n| n.to_string()).collect();
    let column_count = names.len();

    let mut rows: Vec<Row> = Vec::new();
    let mut total_rows = 0usize;
    let mut cursor = stmt.query([])?;
    while let Some(row) = cursor.next()? {
        total_rows += 1;
        if rows.len() < max_rows {
            let values = (0..column_count)
                .map(|i| row.get_ref(i).map(Value::from))
                .collect::<rusqlite::Result<Row>>()?;
            rows.push(values);
        }
    }

    let columns = names
        .into_iter()
        .enumerate()
        .map(|(i, name)| {
            let class = rows
                .iter()
                .map(|r| &r[i])
                .find(|v| !v.is_null())
                .map(Value::storage_class)
                .unwrap_or("NULL");
            ColumnInfo::new(name, class)
        })
        .collect();

    let was_truncated = total_rows > rows.len();
    if was_truncated {
        warn!(
            total_rows,
            max_rows, "Query result exceeded row cap, truncating"
        );
    }

    let row_count = rows.len();
    Ok(QueryResult {
        columns,
        rows,
        execution_time: start.elapsed(),
        row_count,
        total_rows,
        was_truncated,
    })
}

fn write_table(
    conn: &mut Connection,
    schema: &TableSchema,
    rows: &[Vec<Option<String>>],
) -> Result<usize> {
    if schema.columns.is_empty() {
        return Err(SheetqlError::ingestion(format!(
            "Table '{}' has no columns",
            schema.name
        )));
    }

    let table = quote_ident(&schema.name);
    let column_defs = schema
        .columns
        .iter()
        .map(|c| format!("{} {}", quote_ident(&c.name), c.stored_type.as_sql()))
        .collect::<Vec<_>>()
        .join(", ");
    let column_list = schema
        .columns
        .iter()
        .map(|c| quote_ident(&c.name))
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = vec!["?"; schema.columns.len()].join(", ");

    let tx = conn.transaction()?;
    tx.execute(&format!("DROP TABLE IF EXISTS {table}"), [])?;
    tx.execute(&format!("CREATE TABLE {table} ({column_defs})"), [])?;
    {
        let mut insert =
            tx.prepare(&format!("INSERT INTO {table} ({column_list}) VALUES ({placeholders})"))?;
        for row in rows {
            insert.execute(params_from_iter(row.iter()))?;
        }
    }
    tx.commit()?;

    info!(table = %schema.name, row_count = rows.len(), "Table written to store");
    Ok(rows.len())
}

fn register_normalizers(conn: &Connection) -> Result<()> {
    let flags = FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC;

    conn.create_scalar_function(AMOUNT_FN, 1, flags, |ctx| {
        Ok(text_arg(ctx).as_deref().and_then(parse_amount))
    })?;
    conn.create_scalar_function(DATE_FN, 1, flags, |ctx| {
        Ok(text_arg(ctx).as_deref().and_then(parse_date_iso))
    })?;

    Ok(())
}

/// Reads the single argument of a normalization function as text.
fn text_arg(ctx: &Context<'_>) -> Option<String> {
    match ctx.get_raw(0) {
        ValueRef::Text(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Integer(i) => Some(i.to_string()),
        ValueRef::Real(f) => Some(f.to_string()),
        ValueRef::Null | ValueRef::Blob(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_schema() -> TableSchema {
        TableSchema::from_headers("sales", &["supplier", "amount", "paid_on"])
    }

    fn cell(v: &str) -> Option<String> {
        Some(v.to_string())
    }

    async fn sample_store() -> SqliteStore {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .replace_table(
                &sample_schema(),
                vec![
                    vec![cell("ABC"), cell("1 234,56 €"), cell("31/01/2024")],
                    vec![cell("XYZ"), cell("abc"), cell("45322")],
                    vec![cell("ABC"), None, cell("2023-12-31")],
                ],
            )
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_normalizers_are_registered() {
        let store = sample_store().await;
        let result = store
            .execute_query(
                "SELECT norm_amount(CAST(\"amount\" AS TEXT)) AS a, \
                 norm_date(CAST(\"paid_on\" AS TEXT)) AS d FROM \"sales\"",
            )
            .await
            .unwrap();

        assert_eq!(result.row_count, 3);
        assert_eq!(result.rows[0], vec![Value::Float(1234.56), Value::from("2024-01-31")]);
        assert_eq!(result.rows[1], vec![Value::Null, Value::from("2024-01-31")]);
        assert_eq!(result.rows[2], vec![Value::Null, Value::from("2023-12-31")]);
        assert_eq!(result.columns[0], ColumnInfo::new("a", "REAL"));
    }

    #[tokio::test]
    async fn test_replace_table_drops_previous_contents() {
        let store = sample_store().await;
        let written = store
            .replace_table(
                &TableSchema::from_headers("sales", &["only"]),
                vec![vec![cell("x")]],
            )
            .await
            .unwrap();
        assert_eq!(written, 1);

        let result = store.execute_query("SELECT * FROM \"sales\"").await.unwrap();
        assert_eq!(result.columns.len(), 1);
        assert_eq!(result.row_count, 1);
    }

    #[tokio::test]
    async fn test_row_cap_truncates() {
        let store = sample_store().await.with_limits(2, Duration::from_secs(5));
        let result = store.execute_query("SELECT * FROM \"sales\"").await.unwrap();
        assert_eq!(result.row_count, 2);
        assert_eq!(result.total_rows, 3);
        assert!(result.was_truncated);
    }

    #[tokio::test]
    async fn test_store_refuses_writes() {
        let store = sample_store().await;
        let err = store
            .execute_query("DELETE FROM \"sales\"")
            .await
            .unwrap_err();
        assert!(matches!(err, SheetqlError::ForbiddenOperation(_)));

        let count = store
            .execute_query("SELECT COUNT(*) FROM \"sales\"")
            .await
            .unwrap();
        assert_eq!(count.rows[0][0], Value::Int(3));
    }

    #[tokio::test]
    async fn test_multiple_statements_fail() {
        let store = sample_store().await;
        assert!(store
            .execute_query("SELECT 1; SELECT 2")
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_engine_errors_are_execution_errors() {
        let store = sample_store().await;
        let err = store
            .execute_query("SELECT \"missing\" FROM \"sales\"")
            .await
            .unwrap_err();
        assert!(matches!(err, SheetqlError::Execution(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_timeout_while_queued_leaves_ingestion_alone() {
        let store = Arc::new(
            SqliteStore::open_in_memory()
                .unwrap()
                .with_limits(10, Duration::from_millis(50)),
        );
        let schema = TableSchema::from_headers("big", &["n", "label"]);
        let rows: Vec<Vec<Option<String>>> = (0..500_000)
            .map(|i| vec![Some(i.to_string()), cell("row")])
            .collect();

        let writer = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.replace_table(&schema, rows).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        // Either the write is already done or this query waits behind it and
        // gives up; it must never cut the write short.
        let _ = store.execute_query("SELECT 1").await;

        let written = writer.await.unwrap().unwrap();
        assert_eq!(written, 500_000);
    }

    #[test]
    fn test_ticket_only_interrupts_running_job() {
        let conn = Connection::open_in_memory().unwrap();
        let interrupt = conn.get_interrupt_handle();

        let queued = QueryTicket::new();
        assert_eq!(queued.cancel(&interrupt), JobState::Queued);
        assert!(!queued.begin(), "cancelled job must not start");

        let running = QueryTicket::new();
        assert!(running.begin());
        assert_eq!(running.cancel(&interrupt), JobState::Running);

        let finished = QueryTicket::new();
        assert!(finished.begin());
        finished.finish();
        assert_eq!(finished.cancel(&interrupt), JobState::Finished);
        assert_eq!(*finished.state(), JobState::Finished);
    }

    #[tokio::test]
    async fn test_timeout_interrupts_query() {
        let store = SqliteStore::open_in_memory()
            .unwrap()
            .with_limits(10, Duration::from_millis(50));
        let err = store
            .execute_query(
                "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c WHERE x < 500000000) \
                 SELECT COUNT(*) FROM c",
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }
}
