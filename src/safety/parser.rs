//! Structural read-only check.
//!
//! Parses query text with sqlparser-rs (SQLite dialect) and reports what kind
//! of statement it is, recursing into CTEs, set operations and derived tables
//! so a mutation cannot hide inside an otherwise innocent SELECT.

use sqlparser::ast::{Query, Select, SetExpr, Statement, TableFactor, TableWithJoins};
use sqlparser::dialect::SQLiteDialect;
use sqlparser::parser::Parser;

use super::StatementType;

/// Parses and classifies SQL text.
#[derive(Debug)]
pub struct SqlClassifier {
    dialect: SQLiteDialect,
}

impl Default for SqlClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl SqlClassifier {
    /// Creates a classifier for the SQLite dialect.
    pub fn new() -> Self {
        Self {
            dialect: SQLiteDialect {},
        }
    }

    /// Classifies the text. Only a single read-only query counts as safe;
    /// unparseable text, empty text and multiple statements never do.
    pub fn classify(&self, sql: &str) -> StatementType {
        let statements = match Parser::parse_sql(&self.dialect, sql) {
            Ok(statements) => statements,
            Err(e) => return StatementType::Unparseable(e.to_string()),
        };

        match statements.as_slice() {
            [] => StatementType::Empty,
            [statement] => classify_statement(statement),
            many => StatementType::Multiple(many.len()),
        }
    }
}

/// Convenience function to classify SQL without creating a classifier instance.
pub fn classify_sql(sql: &str) -> StatementType {
    SqlClassifier::new().classify(sql)
}

fn classify_statement(statement: &Statement) -> StatementType {
    match statement {
        Statement::Query(query) => classify_query(query),
        Statement::Insert(_) => StatementType::Insert,
        Statement::Update { .. } => StatementType::Update,
        Statement::Delete(_) => StatementType::Delete,
        other => StatementType::Other(leading_keyword(other)),
    }
}

fn classify_query(query: &Query) -> StatementType {
    if let Some(with) = &query.with {
        for cte in &with.cte_tables {
            let inner = classify_query(&cte.query);
            if !inner.is_read_only() {
                return inner;
            }
        }
    }

    match classify_set_expr(&query.body) {
        StatementType::Select if query.with.is_some() => StatementType::With,
        other => other,
    }
}

fn classify_set_expr(set_expr: &SetExpr) -> StatementType {
    match set_expr {
        SetExpr::Select(select) => classify_select(select),
        SetExpr::Query(query) => classify_query(query),
        SetExpr::SetOperation { left, right, .. } => {
            let left = classify_set_expr(left);
            if !left.is_read_only() {
                return left;
            }
            let right = classify_set_expr(right);
            if !right.is_read_only() {
                return right;
            }
            StatementType::Select
        }
        SetExpr::Values(_) | SetExpr::Table(_) => StatementType::Select,
        SetExpr::Insert(stmt) | SetExpr::Update(stmt) => classify_statement(stmt),
        #[allow(unreachable_patterns)]
        _ => StatementType::Other("nested statement".to_string()),
    }
}

fn classify_select(select: &Select) -> StatementType {
    select
        .from
        .iter()
        .map(classify_table_with_joins)
        .find(|t| !t.is_read_only())
        .unwrap_or(StatementType::Select)
}

fn classify_table_with_joins(twj: &TableWithJoins) -> StatementType {
    std::iter::once(&twj.relation)
        .chain(twj.joins.iter().map(|j| &j.relation))
        .map(classify_table_factor)
        .find(|t| !t.is_read_only())
        .unwrap_or(StatementType::Select)
}

fn classify_table_factor(factor: &TableFactor) -> StatementType {
    match factor {
        TableFactor::Derived { subquery, .. } => classify_query(subquery),
        TableFactor::NestedJoin {
            table_with_joins, ..
        } => classify_table_with_joins(table_with_joins),
        _ => StatementType::Select,
    }
}

fn leading_keyword(statement: &Statement) -> String {
    statement
        .to_string()
        .split_whitespace()
        .next()
        .unwrap_or("UNKNOWN")
        .to_uppercase()
}
