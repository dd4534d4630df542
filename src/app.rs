//! Core orchestrator for SheetQL.
//!
//! Coordinates the catalog, the store, the question translator and the gated
//! executor to answer questions: translate → validate → compile → gate →
//! execute. Each request works from one catalog snapshot.

use serde::Serialize;
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use crate::catalog::{Catalog, CatalogSnapshot, TableSchema};
use crate::compiler::compile;
use crate::config::Config;
use crate::error::{Result, SheetqlError};
use crate::ingest::{read_csv_file, table_name_for, LoadSource};
use crate::intent::{check_columns, validate, Intent, IntentDefaults};
use crate::llm::{create_client, DateContext, IntentTranslator, LlmClient, MockLlmClient};
use crate::query::QueryExecutor;
use crate::store::{SqliteStore, Store};

/// Help text displayed for the /help command.
pub const HELP_TEXT: &str = r#"Ask a question in plain language, or use a command:
  /schema              - Show loaded tables and columns
  /load <path>         - Load a CSV file (table name from the file stem)
  /load <table>=<path> - Load a CSV file into the named table
  /intent <json>       - Run a hand-written intent
  /help                - Show this help message
  /quit, /exit         - Exit"#;

/// The document returned for one answered question.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    /// The validated intent that was compiled.
    pub intent: Intent,

    /// The query text that was executed.
    pub sql: String,

    /// Result rows keyed by column name.
    pub rows: Vec<Map<String, Value>>,

    /// Result column names in select-list order.
    #[serde(skip)]
    pub columns: Vec<String>,

    /// Present when the result exceeded the row cap.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// Result of processing one line of interactive input.
#[derive(Debug)]
pub enum InputResult {
    /// No action needed (empty input).
    None,
    /// A question or intent was answered.
    Answer(Box<Answer>),
    /// The catalog was requested.
    Schema(CatalogSnapshot),
    /// A table was loaded.
    Loaded(Arc<TableSchema>),
    /// Help text to display.
    Help(&'static str),
    /// The session should end.
    Exit,
}

/// Main application facade.
pub struct App {
    catalog: Catalog,
    store: Arc<dyn Store>,
    translator: IntentTranslator,
    executor: QueryExecutor,
}

impl App {
    /// Creates an app over an existing store and LLM client.
    pub fn new(
        store: Arc<dyn Store>,
        client: Box<dyn LlmClient>,
        defaults: IntentDefaults,
    ) -> Result<Self> {
        Ok(Self {
            catalog: Catalog::new(),
            executor: QueryExecutor::new(Arc::clone(&store))?,
            translator: IntentTranslator::new(client, defaults),
            store,
        })
    }

    /// Builds an app from configuration: an in-memory store with the
    /// configured limits and the configured LLM provider.
    pub fn from_config(config: &Config) -> Result<Self> {
        let store = SqliteStore::open_in_memory()?
            .with_limits(config.query.max_rows, config.query.timeout());
        let client = create_client(&config.llm)?;
        Self::new(Arc::new(store), client, config.defaults.clone())
    }

    /// Creates an app with an in-memory store and the mock LLM client.
    pub fn with_mock_llm() -> Result<Self> {
        Self::with_client(Box::new(MockLlmClient::new()))
    }

    /// Creates an app with an in-memory store and the given LLM client.
    pub fn with_client(client: Box<dyn LlmClient>) -> Result<Self> {
        let store = SqliteStore::open_in_memory()?;
        Self::new(Arc::new(store), client, IntentDefaults::default())
    }

    /// Returns the live catalog.
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Returns a snapshot of every loaded table.
    pub fn schema(&self) -> CatalogSnapshot {
        self.catalog.snapshot()
    }

    /// Loads a CSV file, replacing any table of the same name.
    ///
    /// The table name defaults to the file stem.
    pub async fn ingest_csv(
        &self,
        path: &Path,
        table_hint: Option<&str>,
    ) -> Result<Arc<TableSchema>> {
        let table = table_name_for(path, table_hint)?;

        let owned_path = path.to_path_buf();
        let hint = table.clone();
        let parsed = tokio::task::spawn_blocking(move || read_csv_file(&owned_path, Some(&hint)))
            .await
            .map_err(|e| SheetqlError::internal(format!("CSV reader task failed: {}", e)))??;

        let schema = parsed.schema();
        // Queries on this table wait until store and catalog agree again.
        let _guard = self.catalog.lock_for_ingestion(&schema.name).await;
        let row_count = self.store.replace_table(&schema, parsed.rows).await?;
        info!(
            table = %schema.name,
            path = %path.display(),
            row_count,
            "CSV file loaded"
        );
        Ok(self.catalog.insert(schema))
    }

    /// Loads a `--load` / `/load` source.
    pub async fn load(&self, source: &LoadSource) -> Result<Arc<TableSchema>> {
        self.ingest_csv(&source.path, source.table.as_deref()).await
    }

    /// Registers a table from ordered headers and text rows.
    pub async fn ingest_rows<S: AsRef<str>>(
        &self,
        table: &str,
        headers: &[S],
        rows: Vec<Vec<Option<String>>>,
    ) -> Result<Arc<TableSchema>> {
        let schema = TableSchema::from_headers(Catalog::table_key(table), headers);
        if let Some((idx, row)) = rows
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != schema.columns.len())
        {
            return Err(SheetqlError::ingestion(format!(
                "row {} has {} cells, expected {}",
                idx + 1,
                row.len(),
                schema.columns.len()
            )));
        }

        let _guard = self.catalog.lock_for_ingestion(&schema.name).await;
        self.store.replace_table(&schema, rows).await?;
        Ok(self.catalog.insert(schema))
    }

    /// Answers a natural-language question.
    pub async fn ask(&self, question: &str) -> Result<Answer> {
        self.ask_with_dates(question, &DateContext::now()).await
    }

    /// Answers a question, resolving relative periods against `dates`.
    pub async fn ask_with_dates(&self, question: &str, dates: &DateContext) -> Result<Answer> {
        let snapshot = self.catalog.snapshot();
        let intent = self
            .translator
            .translate_with_dates(question, &snapshot, dates)
            .await?;
        self.execute_intent(intent).await
    }

    /// Runs a hand-written candidate intent through validation, compilation,
    /// the gate and the store.
    pub async fn run_intent(&self, candidate: &Value) -> Result<Answer> {
        let snapshot = self.catalog.snapshot();
        let intent = validate(candidate, &snapshot, self.translator.defaults())?;
        self.execute_intent(intent).await
    }

    async fn execute_intent(&self, intent: Intent) -> Result<Answer> {
        let start = Instant::now();

        // The intent was validated against an earlier snapshot; the table may
        // have been reloaded since.
        let _table_guard = self.catalog.lock_for_query(&intent.table).await;
        let current = self.catalog.get(&intent.table).ok_or_else(|| {
            SheetqlError::validation("table", format!("unknown table '{}'", intent.table))
        })?;
        check_columns(&intent, &current)?;

        let compiled = compile(&intent)?;
        debug!(
            action = %intent.action,
            table = %intent.table,
            sql_len = compiled.sql().len(),
            "Intent compiled"
        );

        let outcome = self.executor.execute(&compiled).await?;
        let result = outcome.result;

        info!(
            action = %intent.action,
            table = %intent.table,
            row_count = result.row_count,
            duration_ms = start.elapsed().as_millis() as u64,
            "Question answered"
        );

        Ok(Answer {
            rows: result.to_records(),
            columns: result.columns.iter().map(|c| c.name.clone()).collect(),
            warning: result.truncation_warning(),
            sql: compiled.into_sql(),
            intent,
        })
    }

    /// Handles one line of interactive input.
    pub async fn handle_input(&self, input: &str) -> Result<InputResult> {
        let input = input.trim();
        if input.is_empty() {
            return Ok(InputResult::None);
        }

        let Some(command) = input.strip_prefix('/') else {
            return Ok(InputResult::Answer(Box::new(self.ask(input).await?)));
        };

        let (name, args) = command
            .split_once(char::is_whitespace)
            .map(|(n, a)| (n, a.trim()))
            .unwrap_or((command, ""));

        match name.to_lowercase().as_str() {
            "quit" | "exit" | "q" => Ok(InputResult::Exit),
            "help" | "?" => Ok(InputResult::Help(HELP_TEXT)),
            "schema" => Ok(InputResult::Schema(self.schema())),
            "load" => {
                let source = args
                    .parse::<LoadSource>()
                    .map_err(SheetqlError::ingestion)?;
                Ok(InputResult::Loaded(self.load(&source).await?))
            }
            "intent" => {
                if args.is_empty() {
                    return Err(SheetqlError::validation("$", "usage: /intent <json>"));
                }
                let candidate: Value = serde_json::from_str(args)
                    .map_err(|e| SheetqlError::validation("$", format!("not valid JSON: {}", e)))?;
                Ok(InputResult::Answer(Box::new(self.run_intent(&candidate).await?)))
            }
            other => Err(SheetqlError::validation(
                "command",
                format!("unknown command '/{}'. Type /help for commands", other),
            )),
        }
    }
}
