//! Table schema types for the catalog.
//!
//! Every ingested column is stored as text; semantic typing only happens at
//! query time through normalization.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Storage type of an ingested column. Only text is ever stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StoredType {
    #[default]
    Text,
}

impl StoredType {
    /// Returns the SQL type used when creating the store table.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Text => "TEXT",
        }
    }
}

/// Describes one column of an ingested table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDescriptor {
    /// Slug-normalized column name used in queries.
    pub name: String,

    /// Storage type (always text).
    pub stored_type: StoredType,

    /// Header as it appeared in the source file.
    pub original_header: String,
}

impl ColumnDescriptor {
    /// Creates a text column descriptor from its source header.
    pub fn new(name: impl Into<String>, original_header: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stored_type: StoredType::Text,
            original_header: original_header.into(),
        }
    }
}

/// Ordered column descriptors of one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Slug-normalized table name.
    pub name: String,

    /// Columns in source order.
    pub columns: Vec<ColumnDescriptor>,
}

impl TableSchema {
    /// Builds a schema from raw source headers.
    ///
    /// Headers are slugified; empty slugs become `col_N` and repeated slugs get
    /// a numeric suffix so every column name is unique within the table.
    pub fn from_headers<S: AsRef<str>>(name: impl Into<String>, headers: &[S]) -> Self {
        let mut seen = HashSet::new();
        let columns = headers
            .iter()
            .enumerate()
            .map(|(idx, header)| {
                let header = header.as_ref();
                let base = match slugify(header) {
                    slug if slug.is_empty() => format!("col_{}", idx + 1),
                    slug => slug,
                };
                let mut candidate = base.clone();
                let mut suffix = 2;
                while !seen.insert(candidate.clone()) {
                    candidate = format!("{base}_{suffix}");
                    suffix += 1;
                }
                ColumnDescriptor::new(candidate, header)
            })
            .collect();

        Self {
            name: name.into(),
            columns,
        }
    }

    /// Returns true if the table has a column with exactly this name.
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    /// Returns the column names in source order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Columns that look like they hold dates.
    pub fn likely_date_columns(&self) -> Vec<&str> {
        self.columns_matching(&["date", "reglement", "echeance"])
    }

    /// Columns that look like they hold amounts.
    pub fn likely_amount_columns(&self) -> Vec<&str> {
        self.columns_matching(&[
            "montant",
            "reglement",
            "amount",
            "total",
            "prix",
            "price",
            "ttc",
            "ht",
        ])
    }

    /// Columns that look like record identifiers (invoice, order, reference...).
    pub fn likely_identifier_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| {
                let lower = c.name.to_lowercase();
                let matched = tokens(&lower).any(|t| {
                    matches!(
                        t,
                        "id" | "no"
                            | "num"
                            | "numero"
                            | "number"
                            | "ref"
                            | "reference"
                            | "facture"
                            | "invoice"
                            | "commande"
                            | "order"
                    )
                });
                matched
            })
            .map(|c| c.name.as_str())
            .collect()
    }

    fn columns_matching(&self, tokens_of_interest: &[&str]) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| {
                let lower = c.name.to_lowercase();
                let matched = tokens(&lower).any(|t| tokens_of_interest.contains(&t));
                matched
            })
            .map(|c| c.name.as_str())
            .collect()
    }

    /// Formats the table for inclusion in an LLM prompt.
    pub fn format_for_llm(&self) -> String {
        let column_lines = self
            .columns
            .iter()
            .map(|c| {
                if c.original_header == c.name {
                    format!("  - {}\n", c.name)
                } else {
                    format!("  - {} (header: {})\n", c.name, c.original_header)
                }
            })
            .collect::<Vec<_>>()
            .join("");

        let hint = |label: &str, cols: Vec<&str>| {
            if cols.is_empty() {
                String::new()
            } else {
                format!("  {}: {}\n", label, cols.join(", "))
            }
        };

        format!(
            "Table: {}\n{}{}{}{}",
            self.name,
            column_lines,
            hint("Likely date columns", self.likely_date_columns()),
            hint("Likely amount columns", self.likely_amount_columns()),
            hint("Likely identifier columns", self.likely_identifier_columns()),
        )
    }
}

fn tokens(name: &str) -> impl Iterator<Item = &str> {
    name.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty())
}

/// Normalizes a header or file name into a lowercase ASCII snake_case slug.
///
/// Accented Latin letters are folded to their base letter, every other run
/// of non-alphanumeric characters collapses to a single `_`, and
/// leading/trailing underscores are trimmed.
pub fn slugify(raw: &str) -> String {
    let mut slug = String::with_capacity(raw.len());
    let mut pending_sep = false;

    for ch in raw.trim().chars() {
        let folded = fold_accent(ch);
        if folded.chars().all(|c| c.is_ascii_alphanumeric()) && !folded.is_empty() {
            if pending_sep && !slug.is_empty() {
                slug.push('_');
            }
            pending_sep = false;
            slug.push_str(&folded.to_ascii_lowercase());
        } else {
            pending_sep = true;
        }
    }

    slug
}

fn fold_accent(ch: char) -> std::borrow::Cow<'static, str> {
    let base = match ch {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' => "a",
        'À' | 'Á' | 'Â' | 'Ã' | 'Ä' | 'Å' => "A",
        'ç' => "c",
        'Ç' => "C",
        'è' | 'é' | 'ê' | 'ë' => "e",
        'È' | 'É' | 'Ê' | 'Ë' => "E",
        'ì' | 'í' | 'î' | 'ï' => "i",
        'Ì' | 'Í' | 'Î' | 'Ï' => "I",
        'ñ' => "n",
        'Ñ' => "N",
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' => "o",
        'Ò' | 'Ó' | 'Ô' | 'Õ' | 'Ö' => "O",
        'ù' | 'ú' | 'û' | 'ü' => "u",
        'Ù' | 'Ú' | 'Û' | 'Ü' => "U",
        'ý' | 'ÿ' => "y",
        'Ý' | 'Ÿ' => "Y",
        'œ' => "oe",
        'Œ' => "OE",
        'æ' => "ae",
        'Æ' => "AE",
        'ß' => "ss",
        other => return std::borrow::Cow::Owned(other.to_string()),
    };
    std::borrow::Cow::Borrowed(base)
}
