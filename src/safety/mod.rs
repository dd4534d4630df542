//! Read-only execution gate.
//!
//! Compiled query text passes three independent checks before it may reach
//! the store: a whole-word keyword denylist, a structural parse that demands a
//! single read-only query, and (inside the store) SQLite's own read-only
//! report for the prepared statement. The compiler only ever emits SELECTs,
//! so any rejection here is a compiler defect and is logged as one.

mod parser;

pub use parser::{classify_sql, SqlClassifier};

use regex::Regex;
use std::fmt;
use tracing::error;

use crate::error::{Result, SheetqlError};

/// Keywords that must never appear in executed text, matched case-insensitively
/// as whole words anywhere (literals included).
pub const DENYLIST: &[&str] = &[
    "create", "insert", "update", "delete", "drop", "alter", "attach", "detach", "copy", "load",
    "truncate", "vacuum", "pragma", "replace", "reindex",
];

/// The kind of statement detected by the structural check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatementType {
    Select,
    /// SELECT with a WITH clause.
    With,
    Insert,
    Update,
    Delete,
    /// Any other statement, named by its leading keyword.
    Other(String),
    /// More than one statement; holds the count.
    Multiple(usize),
    Empty,
    /// The text could not be parsed; holds the parser message.
    Unparseable(String),
}

impl StatementType {
    /// Returns true for statements that cannot modify the store.
    pub fn is_read_only(&self) -> bool {
        matches!(self, Self::Select | Self::With)
    }
}

impl fmt::Display for StatementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Select => write!(f, "SELECT"),
            Self::With => write!(f, "WITH (CTE)"),
            Self::Insert => write!(f, "INSERT"),
            Self::Update => write!(f, "UPDATE"),
            Self::Delete => write!(f, "DELETE"),
            Self::Other(keyword) => write!(f, "{}", keyword),
            Self::Multiple(n) => write!(f, "Multiple ({} statements)", n),
            Self::Empty => write!(f, "Empty"),
            Self::Unparseable(_) => write!(f, "Unparseable"),
        }
    }
}

/// Guard run on every piece of query text before execution.
#[derive(Debug)]
pub struct ExecutionGate {
    denylist: Regex,
    classifier: SqlClassifier,
}

impl ExecutionGate {
    /// Builds the gate.
    pub fn new() -> Result<Self> {
        let pattern = format!(r"(?i)\b(?:{})\b", DENYLIST.join("|"));
        let denylist = Regex::new(&pattern)
            .map_err(|e| SheetqlError::internal(format!("Invalid denylist pattern: {}", e)))?;

        Ok(Self {
            denylist,
            classifier: SqlClassifier::new(),
        })
    }

    /// Returns `Ok(())` if the text may run, or a forbidden-operation error.
    pub fn check(&self, sql: &str) -> Result<()> {
        if let Some(found) = self.denylist.find(sql) {
            let keyword = found.as_str().to_uppercase();
            error!(
                keyword = %keyword,
                sql = %sql,
                "Execution gate rejected query on denylisted keyword; suspected compiler defect"
            );
            return Err(SheetqlError::forbidden(format!(
                "keyword '{}' is not allowed",
                keyword
            )));
        }

        let statement_type = self.classifier.classify(sql);
        if !statement_type.is_read_only() {
            error!(
                statement_type = %statement_type,
                sql = %sql,
                "Execution gate rejected non read-only query; suspected compiler defect"
            );
            let reason = match &statement_type {
                StatementType::Unparseable(msg) => format!("query could not be parsed: {}", msg),
                other => format!("{} statements are not allowed", other),
            };
            return Err(SheetqlError::forbidden(reason));
        }

        Ok(())
    }
}
