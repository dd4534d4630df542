//! Schema catalog shared by ingestion and every question.
//!
//! The catalog maps a slug-normalized table name to its ordered column
//! descriptors. Entries are replaced wholesale, never patched, so readers
//! always observe either the old or the new schema of a table.

mod schema;

pub use schema::{slugify, ColumnDescriptor, StoredType, TableSchema};

use dashmap::DashMap;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};
use tracing::debug;

/// Concurrency-safe catalog of ingested tables.
#[derive(Debug, Default)]
pub struct Catalog {
    tables: DashMap<String, Arc<TableSchema>>,
    table_locks: DashMap<String, Arc<RwLock<()>>>,
}

impl Catalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalizes a table name the way catalog keys are stored.
    pub fn table_key(name: &str) -> String {
        slugify(name)
    }

    /// Registers or replaces a table from its ordered source headers.
    ///
    /// Returns the schema that was stored.
    pub fn register<S: AsRef<str>>(&self, table: &str, headers: &[S]) -> Arc<TableSchema> {
        let schema = TableSchema::from_headers(Self::table_key(table), headers);
        self.insert(schema)
    }

    /// Stores an already-built schema, replacing any previous entry.
    pub fn insert(&self, schema: TableSchema) -> Arc<TableSchema> {
        let schema = Arc::new(schema);
        debug!(
            table = %schema.name,
            columns = schema.columns.len(),
            "Registering table in catalog"
        );
        self.tables.insert(schema.name.clone(), Arc::clone(&schema));
        schema
    }

    /// Looks up a table by name (case-insensitive, slug-normalized).
    pub fn get(&self, table: &str) -> Option<Arc<TableSchema>> {
        self.tables
            .get(&Self::table_key(table))
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Returns true if the catalog holds no tables.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Number of registered tables.
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Takes a point-in-time copy of the catalog for one request.
    pub fn snapshot(&self) -> CatalogSnapshot {
        let tables = self
            .tables
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect();
        CatalogSnapshot { tables }
    }

    fn table_lock(&self, table: &str) -> Arc<RwLock<()>> {
        self.table_locks
            .entry(Self::table_key(table))
            .or_insert_with(|| Arc::new(RwLock::new(())))
            .clone()
    }

    /// Acquires the exclusive ingestion lock for one table.
    ///
    /// Ingestion of the same table is serialized; different tables proceed in
    /// parallel. Hold it until both the store and the catalog entry are
    /// replaced.
    pub async fn lock_for_ingestion(&self, table: &str) -> OwnedRwLockWriteGuard<()> {
        self.table_lock(table).write_owned().await
    }

    /// Acquires a shared lock on one table for the execution of a query.
    ///
    /// While it is held, the store contents and the catalog entry of that
    /// table agree with each other.
    pub async fn lock_for_query(&self, table: &str) -> OwnedRwLockReadGuard<()> {
        self.table_lock(table).read_owned().await
    }
}

/// Immutable view of the catalog taken at the start of a request.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct CatalogSnapshot {
    tables: BTreeMap<String, Arc<TableSchema>>,
}

impl CatalogSnapshot {
    /// Builds a snapshot from explicit schemas (mainly for tests).
    pub fn from_tables(tables: impl IntoIterator<Item = TableSchema>) -> Self {
        Self {
            tables: tables
                .into_iter()
                .map(|t| (t.name.clone(), Arc::new(t)))
                .collect(),
        }
    }

    /// Looks up a table by name (case-insensitive, slug-normalized).
    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.get(&Catalog::table_key(name)).map(Arc::as_ref)
    }

    /// Iterates tables in name order.
    pub fn tables(&self) -> impl Iterator<Item = &TableSchema> {
        self.tables.values().map(Arc::as_ref)
    }

    /// Sorted table names.
    pub fn table_names(&self) -> Vec<&str> {
        self.tables.keys().map(String::as_str).collect()
    }

    /// Returns true if the snapshot holds no tables.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Formats all tables for inclusion in an LLM prompt.
    pub fn format_for_llm(&self) -> String {
        if self.tables.is_empty() {
            return "No tables have been loaded.\n".to_string();
        }
        self.tables()
            .map(|t| t.format_for_llm())
            .collect::<Vec<_>>()
            .join("\n")
    }
}
