//! Typed intent produced by the validator.
//!
//! An [`Intent`] only exists once a candidate has passed validation against a
//! catalog snapshot; the compiler consumes it without re-checking.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What the question asks the data to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    /// Return matching rows, no aggregation.
    Filter,
    /// Sum of the value column.
    Sum,
    /// Average of the value column.
    Avg,
    /// Largest value (scalar, per group, or the record holding it).
    Max,
    /// Smallest value (scalar, per group, or the record holding it).
    Min,
    /// Groups ranked by their summed value.
    TopN,
}

impl Action {
    /// Returns the canonical wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Filter => "FILTER",
            Self::Sum => "SUM",
            Self::Avg => "AVG",
            Self::Max => "MAX",
            Self::Min => "MIN",
            Self::TopN => "TOP_N",
        }
    }

    /// Returns true if the action aggregates a value column.
    pub fn needs_value_column(&self) -> bool {
        !matches!(self, Self::Filter)
    }

    /// Every action, in declaration order.
    pub const ALL: [Action; 6] = [
        Self::Filter,
        Self::Sum,
        Self::Avg,
        Self::Max,
        Self::Min,
        Self::TopN,
    ];
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_uppercase().replace([' ', '-'].as_slice(), "_");
        match normalized.as_str() {
            "FILTER" | "FILTRER" => Ok(Self::Filter),
            "SUM" | "SOMMER" => Ok(Self::Sum),
            "AVG" | "AVERAGE" | "MOYENNE" => Ok(Self::Avg),
            "MAX" => Ok(Self::Max),
            "MIN" => Ok(Self::Min),
            "TOP_N" | "TOPN" => Ok(Self::TopN),
            _ => Err(format!("unsupported action '{s}'")),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Comparison applied by one filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FilterOperator {
    /// Exact text equality.
    Eq,
    /// Substring match.
    Contains,
    /// Numeric greater-than after amount normalization.
    Gt,
    /// Numeric less-than after amount normalization.
    Lt,
    /// Inclusive date range after date normalization.
    Between,
    /// Calendar year of the normalized date.
    YearEq,
}

impl FilterOperator {
    /// Returns the canonical wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "EQ",
            Self::Contains => "CONTAINS",
            Self::Gt => "GT",
            Self::Lt => "LT",
            Self::Between => "BETWEEN",
            Self::YearEq => "YEAR_EQ",
        }
    }
}

impl FromStr for FilterOperator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_uppercase().replace([' ', '-'].as_slice(), "_");
        match normalized.as_str() {
            "EQ" | "EQUALS" | "=" | "EGALE" | "EGAL" => Ok(Self::Eq),
            "CONTAINS" | "CONTIENT" => Ok(Self::Contains),
            "GT" | ">" | "SUPERIEUR_A" => Ok(Self::Gt),
            "LT" | "<" | "INFERIEUR_A" => Ok(Self::Lt),
            "BETWEEN" | "ENTRE" => Ok(Self::Between),
            "YEAR_EQ" | "ANNEE_EGALE" => Ok(Self::YearEq),
            _ => Err(format!("unsupported filter operator '{s}'")),
        }
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sort direction requested by the question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    /// Returns the SQL keyword.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "ASC" | "ASCENDING" | "ASCENDANT" => Ok(Self::Asc),
            "DESC" | "DESCENDING" | "DESCENDANT" => Ok(Self::Desc),
            _ => Err(format!("unsupported order '{s}'")),
        }
    }
}

/// Validated value of a filter, shaped by its operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    /// EQ, CONTAINS, GT and LT compare against one text value.
    Text(String),
    /// BETWEEN bounds, in ascending order.
    Range(String, String),
    /// YEAR_EQ target year.
    Year(i32),
}

/// One condition of the conjunction applied to the table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub column: String,
    pub operator: FilterOperator,
    pub value: FilterValue,
}

/// The validated meaning of one question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Intent {
    pub action: Action,
    pub table: String,
    pub filters: Vec<Filter>,
    pub group_by: Option<String>,
    pub value_column: Option<String>,
    pub order: Option<SortOrder>,
    pub limit: Option<u32>,
    pub display_columns: Option<Vec<String>>,
}

impl Intent {
    /// Creates an intent with no filters, grouping, ordering or limit.
    pub fn new(action: Action, table: impl Into<String>) -> Self {
        Self {
            action,
            table: table.into(),
            filters: Vec::new(),
            group_by: None,
            value_column: None,
            order: None,
            limit: None,
            display_columns: None,
        }
    }
}
