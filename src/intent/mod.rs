//! Structured intents: the only shape a question may take before compilation.

mod types;
mod validate;

pub use types::{Action, Filter, FilterOperator, FilterValue, Intent, SortOrder};
pub use validate::{check_columns, validate};

use serde::{Deserialize, Serialize};

/// Default amount column used when an aggregate names none.
pub const DEFAULT_AMOUNT_COLUMN: &str = "montant_reglement";

/// Default grouping column (supplier code) used by TOP_N.
pub const DEFAULT_GROUP_COLUMN: &str = "trigramme";

/// Column names substituted when a candidate intent leaves them out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntentDefaults {
    /// Value column for SUM, AVG, MAX, MIN and TOP_N.
    pub amount_column: String,

    /// Grouping column for TOP_N.
    pub group_column: String,
}

impl Default for IntentDefaults {
    fn default() -> Self {
        Self {
            amount_column: DEFAULT_AMOUNT_COLUMN.to_string(),
            group_column: DEFAULT_GROUP_COLUMN.to_string(),
        }
    }
}
