//! CSV ingestion.
//!
//! Reads a delimited file into text rows ready for the store. Nothing is
//! typed here: cells stay text and empty cells become NULL. The comma or
//! semicolon delimiter is detected from the header line.

use csv::{ReaderBuilder, Trim};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

use crate::catalog::{slugify, TableSchema};
use crate::error::{Result, SheetqlError};

/// A parsed source file: target table, raw headers and text rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvTable {
    /// Slug-normalized table name.
    pub table: String,

    /// Headers exactly as they appear in the file.
    pub headers: Vec<String>,

    /// Rows, each exactly `headers.len()` cells long.
    pub rows: Vec<Vec<Option<String>>>,
}

impl CsvTable {
    /// Builds the catalog schema for this table.
    pub fn schema(&self) -> TableSchema {
        TableSchema::from_headers(self.table.clone(), &self.headers)
    }
}

/// A `--load` argument: `path` or `table=path`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadSource {
    pub table: Option<String>,
    pub path: PathBuf,
}

impl FromStr for LoadSource {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err("expected a CSV path or table=path".to_string());
        }
        match s.split_once('=') {
            Some((table, path)) if !table.trim().is_empty() && !path.trim().is_empty() => {
                Ok(Self {
                    table: Some(table.trim().to_string()),
                    path: PathBuf::from(path.trim()),
                })
            }
            Some(_) => Err(format!("invalid load source '{s}', expected table=path")),
            None => Ok(Self {
                table: None,
                path: PathBuf::from(s),
            }),
        }
    }
}

/// Derives the table name from an explicit hint or the file stem.
pub fn table_name_for(path: &Path, hint: Option<&str>) -> Result<String> {
    let raw = match hint {
        Some(hint) => hint.to_string(),
        None => path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default(),
    };

    let name = slugify(&raw);
    if name.is_empty() {
        return Err(SheetqlError::ingestion(format!(
            "Cannot derive a table name from '{}'",
            path.display()
        )));
    }
    Ok(name)
}

/// Reads a CSV file from disk.
pub fn read_csv_file(path: &Path, table_hint: Option<&str>) -> Result<CsvTable> {
    let table = table_name_for(path, table_hint)?;
    let file = File::open(path).map_err(|e| {
        SheetqlError::ingestion(format!("Failed to open '{}': {}", path.display(), e))
    })?;
    read_csv(file, &table)
}

/// Reads CSV data from any reader into a table named `table`.
pub fn read_csv<R: Read>(mut reader: R, table: &str) -> Result<CsvTable> {
    let mut data = Vec::new();
    reader
        .read_to_end(&mut data)
        .map_err(|e| SheetqlError::ingestion(format!("Failed to read CSV data: {}", e)))?;

    let body = data.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(data.as_slice());
    let delimiter = detect_delimiter(body);

    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .delimiter(delimiter)
        .trim(Trim::All)
        .from_reader(body);

    let headers: Vec<String> = rdr
        .headers()
        .map_err(|e| SheetqlError::ingestion(format!("Failed to read CSV headers: {}", e)))?
        .iter()
        .map(str::to_string)
        .collect();

    if headers.is_empty() || headers.iter().all(String::is_empty) {
        return Err(SheetqlError::ingestion("CSV data has no header row"));
    }

    let mut rows = Vec::new();
    for (idx, record) in rdr.records().enumerate() {
        let record = record.map_err(|e| {
            SheetqlError::ingestion(format!("Failed to read CSV record {}: {}", idx + 1, e))
        })?;
        if record.iter().all(str::is_empty) {
            continue;
        }
        let row = (0..headers.len())
            .map(|i| {
                record
                    .get(i)
                    .filter(|cell| !cell.is_empty())
                    .map(str::to_string)
            })
            .collect();
        rows.push(row);
    }

    debug!(
        table,
        columns = headers.len(),
        row_count = rows.len(),
        delimiter = %(delimiter as char),
        "Parsed CSV data"
    );

    Ok(CsvTable {
        table: slugify(table),
        headers,
        rows,
    })
}

/// Picks the most frequent of `;`, tab and `,` in the header line, falling
/// back to `,` when none occurs.
fn detect_delimiter(data: &[u8]) -> u8 {
    let header = data.split(|b| *b == b'\n').next().unwrap_or_default();
    let count = |needle: u8| header.iter().filter(|b| **b == needle).count();
    [b';', b'\t']
        .into_iter()
        .map(|d| (d, count(d)))
        .filter(|(_, n)| *n > count(b','))
        .max_by_key(|(_, n)| *n)
        .map(|(d, _)| d)
        .unwrap_or(b',')
}
