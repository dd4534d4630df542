//! Validation of untrusted candidate intents.
//!
//! The candidate comes straight from a language model (or a user) as loosely
//! typed JSON. This is the only place it is inspected: everything that leaves
//! [`validate`] is a typed [`Intent`] whose table and columns exist in the
//! catalog snapshot it was checked against.

use serde_json::{Map, Value};
use tracing::debug;

use crate::catalog::{slugify, CatalogSnapshot, TableSchema};
use crate::error::{Result, SheetqlError};
use crate::normalize::{parse_amount, parse_date};

use super::{Action, Filter, FilterOperator, FilterValue, Intent, IntentDefaults, SortOrder};

const ACTION_KEYS: &[&str] = &["action", "intention", "intent"];
const TABLE_KEYS: &[&str] = &["table"];
const FILTERS_KEYS: &[&str] = &["filters", "filtres"];
const GROUP_KEYS: &[&str] = &["groupBy", "group_by", "groupement"];
const VALUE_KEYS: &[&str] = &["valueColumn", "value_column", "calculCol"];
const ORDER_KEYS: &[&str] = &["order", "ordre"];
const LIMIT_KEYS: &[&str] = &["limit", "limite"];
const DISPLAY_KEYS: &[&str] = &["displayColumns", "display_columns", "colonnesAfficher"];
const COLUMN_KEYS: &[&str] = &["column", "colonne"];
const OPERATOR_KEYS: &[&str] = &["operator", "operateur", "op"];
const FILTER_VALUE_KEYS: &[&str] = &["value", "valeur"];

/// Validates a candidate intent against a catalog snapshot.
///
/// Fails on the first violation with a [`SheetqlError::Validation`] naming the
/// offending field path (for example `filters[1].operator`).
pub fn validate(
    candidate: &Value,
    catalog: &CatalogSnapshot,
    defaults: &IntentDefaults,
) -> Result<Intent> {
    let obj = candidate
        .as_object()
        .ok_or_else(|| SheetqlError::validation("$", "intent must be a JSON object"))?;

    let action = required_str(obj, ACTION_KEYS, "action")?
        .parse::<Action>()
        .map_err(|e| SheetqlError::validation("action", e))?;

    let table_name = required_str(obj, TABLE_KEYS, "table")?;
    let table = catalog.table(table_name).ok_or_else(|| {
        SheetqlError::validation(
            "table",
            format!(
                "unknown table '{}' (available: {})",
                table_name,
                available(catalog.table_names())
            ),
        )
    })?;

    let filters = match lookup(obj, FILTERS_KEYS) {
        None => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .map(|(idx, item)| validate_filter(table, idx, item))
            .collect::<Result<Vec<_>>>()?,
        Some(_) => {
            return Err(SheetqlError::validation("filters", "must be an array"));
        }
    };

    let mut group_by = optional_column(table, obj, GROUP_KEYS, "groupBy")?;
    let mut value_column = optional_column(table, obj, VALUE_KEYS, "valueColumn")?;

    if action.needs_value_column() && value_column.is_none() {
        value_column = Some(default_column(
            table,
            &defaults.amount_column,
            "valueColumn",
        )?);
    }
    if action == Action::TopN && group_by.is_none() {
        group_by = Some(default_column(table, &defaults.group_column, "groupBy")?);
    }

    let order = match lookup(obj, ORDER_KEYS) {
        None => None,
        Some(Value::String(s)) => Some(
            s.parse::<SortOrder>()
                .map_err(|e| SheetqlError::validation("order", e))?,
        ),
        Some(_) => return Err(SheetqlError::validation("order", "must be a string")),
    };

    let limit = lookup(obj, LIMIT_KEYS).map(parse_limit).transpose()?;

    let display_columns = match lookup(obj, DISPLAY_KEYS) {
        None => None,
        Some(Value::Array(items)) if items.is_empty() => None,
        Some(Value::Array(items)) => Some(
            items
                .iter()
                .enumerate()
                .map(|(idx, item)| resolve_column(table, item, &format!("displayColumns[{idx}]")))
                .collect::<Result<Vec<_>>>()?,
        ),
        Some(_) => {
            return Err(SheetqlError::validation("displayColumns", "must be an array"));
        }
    };

    let intent = Intent {
        action,
        table: table.name.clone(),
        filters,
        group_by,
        value_column,
        order,
        limit,
        display_columns,
    };

    debug!(
        action = %intent.action,
        table = %intent.table,
        filter_count = intent.filters.len(),
        "Candidate intent validated"
    );

    Ok(intent)
}

fn validate_filter(table: &TableSchema, idx: usize, item: &Value) -> Result<Filter> {
    let path = format!("filters[{idx}]");
    let obj = item
        .as_object()
        .ok_or_else(|| SheetqlError::validation(&path, "filter must be an object"))?;

    let column = resolve_column(
        table,
        lookup(obj, COLUMN_KEYS).unwrap_or(&Value::Null),
        &format!("{path}.column"),
    )?;

    let operator_path = format!("{path}.operator");
    let operator = match lookup(obj, OPERATOR_KEYS) {
        Some(Value::String(s)) => s
            .parse::<FilterOperator>()
            .map_err(|e| SheetqlError::validation(&operator_path, e))?,
        Some(_) => return Err(SheetqlError::validation(&operator_path, "must be a string")),
        None => return Err(SheetqlError::validation(&operator_path, "is required")),
    };

    let value_path = format!("{path}.value");
    let raw_value = lookup(obj, FILTER_VALUE_KEYS)
        .ok_or_else(|| SheetqlError::validation(&value_path, "is required"))?;

    let value = match operator {
        FilterOperator::Eq | FilterOperator::Contains => {
            FilterValue::Text(scalar_text(raw_value, &value_path)?)
        }
        FilterOperator::Gt | FilterOperator::Lt => {
            let text = scalar_text(raw_value, &value_path)?;
            if parse_amount(&text).is_none() {
                return Err(SheetqlError::validation(
                    &value_path,
                    format!("'{text}' is not a number"),
                ));
            }
            FilterValue::Text(text)
        }
        FilterOperator::Between => date_range(raw_value, &value_path)?,
        FilterOperator::YearEq => {
            let text = scalar_text(raw_value, &value_path)?;
            let year = text
                .trim()
                .parse::<i32>()
                .ok()
                .filter(|y| (1..=9999).contains(y))
                .ok_or_else(|| {
                    SheetqlError::validation(&value_path, format!("'{text}' is not a year"))
                })?;
            FilterValue::Year(year)
        }
    };

    Ok(Filter {
        column,
        operator,
        value,
    })
}

/// Re-checks a validated intent against the current schema of its table.
///
/// A table re-ingested with different headers after the intent was validated
/// must fail here, naming the first column that no longer exists.
pub fn check_columns(intent: &Intent, table: &TableSchema) -> Result<()> {
    let filters = intent
        .filters
        .iter()
        .enumerate()
        .map(|(i, f)| (format!("filters[{i}].column"), f.column.as_str()));
    let group = intent
        .group_by
        .iter()
        .map(|c| ("groupBy".to_string(), c.as_str()));
    let value = intent
        .value_column
        .iter()
        .map(|c| ("valueColumn".to_string(), c.as_str()));
    let display = intent
        .display_columns
        .iter()
        .flatten()
        .enumerate()
        .map(|(i, c)| (format!("displayColumns[{i}]"), c.as_str()));

    match filters
        .chain(group)
        .chain(value)
        .chain(display)
        .find(|(_, column)| !table.has_column(column))
    {
        Some((field, column)) => Err(SheetqlError::validation(
            field,
            format!(
                "column '{}' no longer exists in table '{}' (reloaded)",
                column, table.name
            ),
        )),
        None => Ok(()),
    }
}

/// Parses a BETWEEN pair into ascending ISO dates.
fn date_range(raw: &Value, path: &str) -> Result<FilterValue> {
    let items = match raw {
        Value::Array(items) if items.len() == 2 => items,
        _ => {
            return Err(SheetqlError::validation(
                path,
                "BETWEEN expects exactly two values",
            ))
        }
    };

    let mut bounds = Vec::with_capacity(2);
    for (idx, item) in items.iter().enumerate() {
        let item_path = format!("{path}[{idx}]");
        let text = scalar_text(item, &item_path)?;
        let date = parse_date(&text).ok_or_else(|| {
            SheetqlError::validation(&item_path, format!("'{text}' is not a date"))
        })?;
        bounds.push(date);
    }
    bounds.sort();

    Ok(FilterValue::Range(
        bounds[0].format(crate::normalize::ISO_DATE).to_string(),
        bounds[1].format(crate::normalize::ISO_DATE).to_string(),
    ))
}

fn parse_limit(raw: &Value) -> Result<u32> {
    let parsed = match raw {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0 && *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };

    parsed
        .filter(|n| *n > 0)
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| SheetqlError::validation("limit", "must be a positive integer"))
}

fn default_column(table: &TableSchema, name: &str, field: &str) -> Result<String> {
    if table.has_column(name) {
        Ok(name.to_string())
    } else {
        Err(SheetqlError::validation(
            field,
            format!(
                "not given and default column '{}' does not exist in '{}'",
                name, table.name
            ),
        ))
    }
}

fn optional_column(
    table: &TableSchema,
    obj: &Map<String, Value>,
    keys: &[&str],
    field: &str,
) -> Result<Option<String>> {
    lookup(obj, keys)
        .map(|value| resolve_column(table, value, field))
        .transpose()
}

/// Resolves a column reference to the catalog's exact column name.
///
/// Accepts the exact name, its slug, or the original source header.
fn resolve_column(table: &TableSchema, raw: &Value, field: &str) -> Result<String> {
    let name = match raw {
        Value::String(s) if !s.trim().is_empty() => s.as_str(),
        Value::Null => return Err(SheetqlError::validation(field, "is required")),
        _ => return Err(SheetqlError::validation(field, "must be a column name")),
    };

    let slug = slugify(name);
    table
        .columns
        .iter()
        .find(|c| c.name == name)
        .or_else(|| table.columns.iter().find(|c| c.name == slug))
        .or_else(|| table.columns.iter().find(|c| c.original_header == name))
        .map(|c| c.name.clone())
        .ok_or_else(|| {
            SheetqlError::validation(
                field,
                format!(
                    "unknown column '{}' in table '{}' (available: {})",
                    name,
                    table.name,
                    available(table.column_names())
                ),
            )
        })
}

fn scalar_text(raw: &Value, path: &str) -> Result<String> {
    match raw {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Array(_) => Err(SheetqlError::validation(path, "expects a single value")),
        Value::Null | Value::Object(_) => {
            Err(SheetqlError::validation(path, "must be a string or number"))
        }
    }
}

fn required_str<'v>(obj: &'v Map<String, Value>, keys: &[&str], field: &str) -> Result<&'v str> {
    match lookup(obj, keys) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.as_str()),
        Some(_) => Err(SheetqlError::validation(field, "must be a non-empty string")),
        None => Err(SheetqlError::validation(field, "is required")),
    }
}

/// Finds the first non-null value under any of the accepted keys.
fn lookup<'v>(obj: &'v Map<String, Value>, keys: &[&str]) -> Option<&'v Value> {
    keys.iter()
        .filter_map(|k| obj.get(*k))
        .find(|v| !v.is_null())
}

fn available(names: Vec<&str>) -> String {
    if names.is_empty() {
        "none".to_string()
    } else {
        names.join(", ")
    }
}
