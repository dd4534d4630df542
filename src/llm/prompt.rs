//! Prompt construction for intent translation.
//!
//! The system prompt carries the catalog (tables, columns and heuristic
//! column hints), the intent vocabulary, the date context for relative
//! periods and a few worked examples. The question goes in the user message.

use chrono::{Datelike, Local, NaiveDate};

use crate::catalog::CatalogSnapshot;
use crate::intent::IntentDefaults;
use crate::llm::types::Message;
use crate::normalize::ISO_DATE;

const SYSTEM_PROMPT_TEMPLATE: &str = r#"You translate a user's question about uploaded spreadsheet data into a JSON intent.
Reply with ONE JSON object and nothing else.

AVAILABLE DATA (use table and column names exactly as written):
{schema}
INTENT SHAPE:
{
  "action": "FILTER|SUM|AVG|MAX|MIN|TOP_N",
  "table": "<table name>",
  "filters": [{"column": "<column>", "operator": "EQ|CONTAINS|GT|LT|BETWEEN|YEAR_EQ", "value": "<text>" or ["<from>", "<to>"]}],
  "groupBy": "<column or null>",
  "valueColumn": "<column or null>",
  "order": "ASC|DESC|null",
  "limit": <positive integer or null>,
  "displayColumns": ["<column>", ...] or null
}

RULES:
- Never invent a table or column that is not listed above.
- Amounts: use only likely amount columns for valueColumn and GT/LT filters. Default amount column: {amount_column}.
- Dates: use only likely date columns for BETWEEN and YEAR_EQ filters. BETWEEN takes two YYYY-MM-DD dates.
- A year mentioned in the question ("in 2024") becomes {"column": "<date column>", "operator": "YEAR_EQ", "value": "2024"}.
- Suppliers are usually identified by the column {group_column}.
- "top N" means action TOP_N, order DESC unless the question asks otherwise, limit N.
- "largest", "highest", "maximum" means MAX; "smallest", "lowest", "cheapest" means MIN.
- To return the record holding the extreme (an invoice or order number), set groupBy to the identifier column and displayColumns to [identifier, amount].

DATE CONTEXT (today is {today}):
- this month: {current_month_start} to {current_month_end}
- last month: {last_month_start} to {last_month_end}
- this year: {current_year}
- last year: {last_year}

EXAMPLES:
Question: "Top 5 suppliers in 2024 by amount"
{"action": "TOP_N", "table": "decaissements_2024", "filters": [{"column": "date_reglement", "operator": "YEAR_EQ", "value": "2024"}], "groupBy": "trigramme", "valueColumn": "montant_reglement", "order": "DESC", "limit": 5}

Question: "Which invoice has the highest amount?"
{"action": "MAX", "table": "decaissements_2024", "filters": [], "groupBy": "n_facture", "valueColumn": "montant_reglement", "limit": 1, "displayColumns": ["n_facture", "montant_reglement"]}

Question: "Total paid last month"
{"action": "SUM", "table": "decaissements_2024", "filters": [{"column": "date_reglement", "operator": "BETWEEN", "value": ["{last_month_start}", "{last_month_end}"]}], "valueColumn": "montant_reglement"}
"#;

/// Calendar ranges used to resolve relative periods.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateContext {
    pub today: NaiveDate,
    pub current_month: (NaiveDate, NaiveDate),
    pub last_month: (NaiveDate, NaiveDate),
    pub current_year: i32,
    pub last_year: i32,
}

impl DateContext {
    /// Date context for the local current date.
    pub fn now() -> Self {
        Self::for_date(Local::now().date_naive())
    }

    /// Date context as seen from `today`.
    pub fn for_date(today: NaiveDate) -> Self {
        let current_start = today.with_day(1).unwrap_or(today);
        let last_end = current_start.pred_opt().unwrap_or(current_start);
        let last_start = last_end.with_day(1).unwrap_or(last_end);

        Self {
            today,
            current_month: (current_start, month_end(current_start)),
            last_month: (last_start, last_end),
            current_year: today.year(),
            last_year: today.year() - 1,
        }
    }
}

fn month_end(first_of_month: NaiveDate) -> NaiveDate {
    let (year, month) = if first_of_month.month() == 12 {
        (first_of_month.year() + 1, 1)
    } else {
        (first_of_month.year(), first_of_month.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|next| next.pred_opt())
        .unwrap_or(first_of_month)
}

fn iso(date: NaiveDate) -> String {
    date.format(ISO_DATE).to_string()
}

/// Builds the system prompt for the given catalog, defaults and dates.
pub fn build_system_prompt(
    catalog: &CatalogSnapshot,
    defaults: &IntentDefaults,
    dates: &DateContext,
) -> String {
    SYSTEM_PROMPT_TEMPLATE
        .replace("{schema}", &catalog.format_for_llm())
        .replace("{amount_column}", &defaults.amount_column)
        .replace("{group_column}", &defaults.group_column)
        .replace("{today}", &iso(dates.today))
        .replace("{current_month_start}", &iso(dates.current_month.0))
        .replace("{current_month_end}", &iso(dates.current_month.1))
        .replace("{last_month_start}", &iso(dates.last_month.0))
        .replace("{last_month_end}", &iso(dates.last_month.1))
        .replace("{current_year}", &dates.current_year.to_string())
        .replace("{last_year}", &dates.last_year.to_string())
}

/// Builds the complete message list for one translation request.
pub fn build_messages(
    catalog: &CatalogSnapshot,
    defaults: &IntentDefaults,
    dates: &DateContext,
    question: &str,
) -> Vec<Message> {
    vec![
        Message::system(build_system_prompt(catalog, defaults, dates)),
        Message::user(format!("Question: {}", question.trim())),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::TableSchema;
    use crate::llm::types::Role;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn sample_catalog() -> CatalogSnapshot {
        CatalogSnapshot::from_tables([TableSchema::from_headers(
            "decaissements_2024",
            &["Trigramme", "Montant règlement", "Date règlement", "N° facture"],
        )])
    }

    #[test]
    fn test_date_context_mid_year() {
        let ctx = DateContext::for_date(ymd(2024, 3, 15));
        assert_eq!(ctx.current_month, (ymd(2024, 3, 1), ymd(2024, 3, 31)));
        assert_eq!(ctx.last_month, (ymd(2024, 2, 1), ymd(2024, 2, 29)));
        assert_eq!(ctx.current_year, 2024);
        assert_eq!(ctx.last_year, 2023);
    }

    #[test]
    fn test_date_context_january_wraps_year() {
        let ctx = DateContext::for_date(ymd(2025, 1, 2));
        assert_eq!(ctx.current_month, (ymd(2025, 1, 1), ymd(2025, 1, 31)));
        assert_eq!(ctx.last_month, (ymd(2024, 12, 1), ymd(2024, 12, 31)));
    }

    #[test]
    fn test_date_context_december() {
        let ctx = DateContext::for_date(ymd(2024, 12, 31));
        assert_eq!(ctx.current_month.1, ymd(2024, 12, 31));
    }

    #[test]
    fn test_system_prompt_contents() {
        let prompt = build_system_prompt(
            &sample_catalog(),
            &IntentDefaults::default(),
            &DateContext::for_date(ymd(2024, 3, 15)),
        );

        assert!(prompt.contains("Table: decaissements_2024"));
        assert!(prompt.contains("  - montant_reglement (header: Montant règlement)"));
        assert!(prompt.contains("Likely identifier columns: n_facture"));
        assert!(prompt.contains("last month: 2024-02-01 to 2024-02-29"));
        assert!(prompt.contains("\"value\": [\"2024-02-01\", \"2024-02-29\"]"));
        assert!(prompt.contains("Default amount column: montant_reglement"));
        assert!(!prompt.contains("{schema}"));
        assert!(!prompt.contains("{last_month_end}"));
    }

    #[test]
    fn test_build_messages() {
        let messages = build_messages(
            &sample_catalog(),
            &IntentDefaults::default(),
            &DateContext::for_date(ymd(2024, 3, 15)),
            "  Top 5 suppliers ",
        );
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[1].content, "Question: Top 5 suppliers");
    }
}
