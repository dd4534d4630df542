//! Deterministic translation of a validated [`Intent`] into SQL text.
//!
//! Every identifier is double-quoted and every value is a single-quoted
//! literal (the validated year of a YEAR_EQ filter is the one bare integer),
//! so nothing from the intent can change the structure of the statement.
//! Comparisons that depend on number or date semantics go through the
//! normalization functions in [`crate::normalize`].

use serde::Serialize;
use std::fmt;

use crate::error::{Result, SheetqlError};
use crate::intent::{Action, Filter, FilterOperator, FilterValue, Intent, SortOrder};
use crate::normalize::{amount_expr, date_expr, year_expr};

/// Rows returned by TOP_N when no limit is given.
pub const DEFAULT_TOP_N_LIMIT: u32 = 10;

/// Rows returned by grouped MAX/MIN when no limit is given.
pub const DEFAULT_EXTREME_LIMIT: u32 = 1;

/// Output column name of SUM and TOP_N totals.
pub const TOTAL_ALIAS: &str = "total";

/// Output column name of AVG.
pub const AVERAGE_ALIAS: &str = "average";

/// Output column name of grouped MAX/MIN.
pub const VALUE_ALIAS: &str = "value";

/// Query text produced by the compiler, ready for the execution gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct CompiledQuery {
    sql: String,
}

impl CompiledQuery {
    /// Returns the query text.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Consumes the query and returns its text.
    pub fn into_sql(self) -> String {
        self.sql
    }
}

impl fmt::Display for CompiledQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

/// Quotes an identifier, doubling any embedded double quote.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quotes a text literal, doubling any embedded single quote.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Compiles a validated intent into a single SELECT statement.
pub fn compile(intent: &Intent) -> Result<CompiledQuery> {
    let from = format!("FROM {}", quote_ident(&intent.table));
    let where_clause = where_clause(&intent.filters)?;

    let mut parts: Vec<String> = Vec::new();
    match intent.action {
        Action::Filter => {
            parts.push(format!("SELECT {}", projection(intent)));
            parts.push(from);
            parts.extend(where_clause);
            if let Some(limit) = intent.limit {
                parts.push(format!("LIMIT {limit}"));
            }
        }
        Action::Sum | Action::Avg => {
            let (func, alias) = if intent.action == Action::Sum {
                ("SUM", TOTAL_ALIAS)
            } else {
                ("AVG", AVERAGE_ALIAS)
            };
            let value = amount_expr(&quote_ident(value_column(intent)?));
            parts.push(format!("SELECT {func}({value}) AS {}", quote_ident(alias)));
            parts.push(from);
            parts.extend(where_clause);
        }
        Action::Max | Action::Min => {
            let (func, order) = if intent.action == Action::Max {
                ("MAX", SortOrder::Desc)
            } else {
                ("MIN", SortOrder::Asc)
            };
            let value_col = value_column(intent)?;
            let value = amount_expr(&quote_ident(value_col));

            match (&intent.group_by, &intent.display_columns) {
                (Some(group), Some(display)) => {
                    let id_col = display
                        .iter()
                        .find(|c| c.as_str() != value_col)
                        .unwrap_or(group);
                    parts.push(format!(
                        "SELECT {}, {}",
                        quote_ident(id_col),
                        quote_ident(value_col)
                    ));
                    parts.push(from);
                    parts.extend(where_clause);
                    parts.push(format!("ORDER BY {value} {} NULLS LAST", order.as_sql()));
                    parts.push(format!(
                        "LIMIT {}",
                        intent.limit.unwrap_or(DEFAULT_EXTREME_LIMIT)
                    ));
                }
                (Some(group), None) => {
                    let group = quote_ident(group);
                    let alias = quote_ident(VALUE_ALIAS);
                    parts.push(format!("SELECT {group}, {func}({value}) AS {alias}"));
                    parts.push(from);
                    parts.extend(where_clause);
                    parts.push(format!("GROUP BY {group}"));
                    parts.push(format!("ORDER BY {alias} {} NULLS LAST", order.as_sql()));
                    parts.push(format!(
                        "LIMIT {}",
                        intent.limit.unwrap_or(DEFAULT_EXTREME_LIMIT)
                    ));
                }
                (None, _) => {
                    let alias = if intent.action == Action::Max {
                        "max_value"
                    } else {
                        "min_value"
                    };
                    parts.push(format!("SELECT {func}({value}) AS {}", quote_ident(alias)));
                    parts.push(from);
                    parts.extend(where_clause);
                }
            }
        }
        Action::TopN => {
            let group = intent.group_by.as_deref().ok_or_else(|| {
                SheetqlError::internal("TOP_N intent reached the compiler without groupBy")
            })?;
            let group = quote_ident(group);
            let value = amount_expr(&quote_ident(value_column(intent)?));
            let alias = quote_ident(TOTAL_ALIAS);
            let order = intent.order.unwrap_or(SortOrder::Desc);

            parts.push(format!("SELECT {group}, SUM({value}) AS {alias}"));
            parts.push(from);
            parts.extend(where_clause);
            parts.push(format!("GROUP BY {group}"));
            parts.push(format!("ORDER BY {alias} {} NULLS LAST", order.as_sql()));
            parts.push(format!(
                "LIMIT {}",
                intent.limit.unwrap_or(DEFAULT_TOP_N_LIMIT)
            ));
        }
    }

    Ok(CompiledQuery {
        sql: parts.join(" "),
    })
}

fn value_column(intent: &Intent) -> Result<&str> {
    intent.value_column.as_deref().ok_or_else(|| {
        SheetqlError::internal(format!(
            "{} intent reached the compiler without a value column",
            intent.action
        ))
    })
}

fn projection(intent: &Intent) -> String {
    match &intent.display_columns {
        Some(cols) if !cols.is_empty() => cols
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", "),
        _ => "*".to_string(),
    }
}

fn where_clause(filters: &[Filter]) -> Result<Option<String>> {
    if filters.is_empty() {
        return Ok(None);
    }
    let conditions = filters.iter().map(condition).collect::<Result<Vec<_>>>()?;
    Ok(Some(format!("WHERE {}", conditions.join(" AND "))))
}

/// Compiles one filter. Each operator accepts exactly one value shape; any
/// other pairing is refused rather than rewritten into a different condition.
fn condition(filter: &Filter) -> Result<String> {
    let col = quote_ident(&filter.column);

    let sql = match (&filter.operator, &filter.value) {
        (FilterOperator::Eq, FilterValue::Text(text)) => {
            format!("{col} = {}", quote_literal(text))
        }
        (FilterOperator::Contains, FilterValue::Text(text)) => {
            format!("instr({col}, {}) > 0", quote_literal(text))
        }
        (FilterOperator::Gt, FilterValue::Text(text)) => format!(
            "{} > {}",
            amount_expr(&col),
            amount_expr(&quote_literal(text))
        ),
        (FilterOperator::Lt, FilterValue::Text(text)) => format!(
            "{} < {}",
            amount_expr(&col),
            amount_expr(&quote_literal(text))
        ),
        (FilterOperator::Between, FilterValue::Range(start, end)) => format!(
            "{} BETWEEN {} AND {}",
            date_expr(&col),
            date_expr(&quote_literal(start)),
            date_expr(&quote_literal(end))
        ),
        (FilterOperator::YearEq, FilterValue::Year(year)) => {
            format!("{} = {year}", year_expr(&col))
        }
        (operator, value) => {
            return Err(SheetqlError::internal(format!(
                "{operator} filter on '{}' reached the compiler with a mismatched value {:?}",
                filter.column, value
            )))
        }
    };

    Ok(sql)
}
