//! Command-line argument parsing and output rendering for SheetQL.
//!
//! Uses clap derive. Every answer is printed as the `{intent, sql, rows}`
//! document (or a plain table) and every failure as `{error}`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::app::Answer;
use crate::catalog::CatalogSnapshot;
use crate::config::Config;
use crate::error::{Result, SheetqlError};
use crate::ingest::LoadSource;
use crate::llm::LlmProvider;

/// Output format for answers and schema listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Pretty-printed JSON document.
    #[default]
    Json,
    /// Aligned plain-text table of the result rows.
    Table,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "table" | "text" => Ok(Self::Table),
            _ => Err(format!("Invalid output format: {s}. Expected: json or table")),
        }
    }
}

/// Ask analytical questions in plain language over uploaded spreadsheets.
#[derive(Parser, Debug)]
#[command(name = "sheetql")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// CSV file to load before running the command (`path` or `table=path`, repeatable)
    #[arg(short = 'l', long = "load", value_name = "CSV", global = true)]
    pub load: Vec<LoadSource>,

    /// LLM provider to use (openai, ollama, mock); overrides config
    #[arg(long, value_name = "PROVIDER", global = true)]
    pub llm: Option<LlmProvider>,

    /// Output format (json, table)
    #[arg(long, value_name = "FORMAT", default_value = "json", global = true)]
    pub format: OutputFormat,

    /// Query timeout in seconds; overrides config
    #[arg(long, value_name = "SECS", global = true)]
    pub timeout: Option<u64>,

    #[command(subcommand)]
    pub command: Command,
}

/// What to do once the sources are loaded.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Answer one question
    Ask {
        /// The question, in plain language
        question: String,
    },
    /// Run a hand-written intent (JSON object)
    Intent {
        /// Intent JSON, e.g. '{"action":"SUM","table":"sales"}'
        json: String,
    },
    /// Print the loaded tables and columns
    Schema,
    /// Start an interactive session
    Repl,
}

impl Cli {
    /// Parses command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Returns the config file path to use.
    ///
    /// Uses the --config argument if provided, otherwise the default path.
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(Config::default_path)
    }

    /// Applies flag overrides on top of the loaded configuration.
    pub fn apply_overrides(&self, config: &mut Config) -> Result<()> {
        if let Some(provider) = self.llm {
            if provider != config.llm.provider {
                // Provider-specific settings do not carry across providers.
                config.llm.model = None;
                config.llm.base_url = None;
            }
            config.llm.provider = provider;
        }
        if let Some(timeout) = self.timeout {
            if timeout == 0 {
                return Err(SheetqlError::config("--timeout must be positive"));
            }
            config.query.timeout_secs = timeout;
        }
        Ok(())
    }

    /// Returns true if the command is an interactive session.
    pub fn is_interactive(&self) -> bool {
        matches!(self.command, Command::Repl)
    }
}

/// Renders an answer in the requested format.
pub fn render_answer(answer: &Answer, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => to_pretty_json(answer),
        OutputFormat::Table => {
            let rows: Vec<Vec<String>> = answer
                .rows
                .iter()
                .map(|row| {
                    answer
                        .columns
                        .iter()
                        .map(|c| row.get(c).map(json_cell).unwrap_or_default())
                        .collect()
                })
                .collect();

            let mut out = format!("{}\n\n", answer.sql);
            out.push_str(&render_table(&answer.columns, &rows));
            out.push_str(&format!("\n({} rows)", answer.rows.len()));
            if let Some(warning) = &answer.warning {
                out.push_str(&format!("\n{warning}"));
            }
            Ok(out)
        }
    }
}

/// Renders a catalog snapshot in the requested format.
pub fn render_schema(snapshot: &CatalogSnapshot, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => to_pretty_json(snapshot),
        OutputFormat::Table => {
            if snapshot.is_empty() {
                return Ok("No tables have been loaded.".to_string());
            }
            let blocks: Vec<String> = snapshot
                .tables()
                .map(|table| {
                    let rows: Vec<Vec<String>> = table
                        .columns
                        .iter()
                        .map(|c| {
                            vec![
                                c.name.clone(),
                                c.stored_type.as_sql().to_string(),
                                c.original_header.clone(),
                            ]
                        })
                        .collect();
                    let headers = ["column", "type", "header"].map(String::from);
                    format!("{}\n{}", table.name, render_table(&headers, &rows))
                })
                .collect();
            Ok(blocks.join("\n\n"))
        }
    }
}

/// Renders an error as the `{error}` document.
pub fn render_error(error: &SheetqlError) -> String {
    serde_json::to_string(&error.to_body())
        .unwrap_or_else(|_| format!("{{\"error\":{:?}}}", error.to_string()))
}

fn to_pretty_json<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value)
        .map_err(|e| SheetqlError::internal(format!("Failed to serialize output: {e}")))
}

fn json_cell(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => "NULL".to_string(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn render_table(headers: &[String], rows: &[Vec<String>]) -> String {
    let widths: Vec<usize> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| {
            rows.iter()
                .filter_map(|r| r.get(i))
                .map(|c| c.chars().count())
                .chain(std::iter::once(h.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let line = |cells: &[String]| {
        cells
            .iter()
            .zip(&widths)
            .map(|(c, w)| format!("{:<w$}", c, w = *w))
            .collect::<Vec<_>>()
            .join(" | ")
            .trim_end()
            .to_string()
    };

    let mut out = line(headers);
    out.push('\n');
    out.push_str(
        &widths
            .iter()
            .map(|w| "-".repeat(*w))
            .collect::<Vec<_>>()
            .join("-+-"),
    );
    for row in rows {
        out.push('\n');
        out.push_str(&line(row));
    }
    out
}
