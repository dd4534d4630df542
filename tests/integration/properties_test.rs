//! Property tests for quoting, the execution gate and normalization.

use chrono::NaiveDate;
use proptest::prelude::*;

use sheetql::compiler::{compile, quote_ident, quote_literal};
use sheetql::error::SheetqlError;
use sheetql::intent::{Action, Filter, FilterOperator, FilterValue, Intent};
use sheetql::normalize::{parse_amount, parse_date};
use sheetql::safety::{classify_sql, ExecutionGate, StatementType, DENYLIST};

fn unquote(quoted: &str, quote: char) -> Option<String> {
    let inner = quoted.strip_prefix(quote)?.strip_suffix(quote)?;
    let doubled = format!("{quote}{quote}");
    // Every embedded quote must be doubled.
    if inner.replace(&doubled, "").contains(quote) {
        return None;
    }
    Some(inner.replace(&doubled, &quote.to_string()))
}

fn with_random_case(word: &str, mask: &[bool]) -> String {
    word.chars()
        .zip(mask.iter().cycle())
        .map(|(c, upper)| if *upper { c.to_ascii_uppercase() } else { c })
        .collect()
}

fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::new();
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(' ');
        }
        out.push(ch);
    }
    out
}

proptest! {
    #[test]
    fn prop_identifiers_round_trip(name in "\\PC{1,24}") {
        let quoted = quote_ident(&name);
        prop_assert_eq!(unquote(&quoted, '"'), Some(name));
    }

    #[test]
    fn prop_literals_round_trip(value in "\\PC{0,24}") {
        let quoted = quote_literal(&value);
        prop_assert_eq!(unquote(&quoted, '\''), Some(value));
    }

    #[test]
    fn prop_compiled_text_is_one_select(
        table in "\\PC{1,16}",
        column in "\\PC{1,16}",
        value in "[^\\p{C}\\\\]{0,16}",
    ) {
        let mut intent = Intent::new(Action::Filter, table.clone());
        intent.filters.push(Filter {
            column: column.clone(),
            operator: FilterOperator::Eq,
            value: FilterValue::Text(value),
        });
        let sql = compile(&intent).unwrap().into_sql();

        let expected_prefix = format!("SELECT * FROM {} WHERE {} = ", quote_ident(&table), quote_ident(&column));
        prop_assert!(sql.starts_with(&expected_prefix));
        prop_assert_eq!(classify_sql(&sql), StatementType::Select);
    }

    #[test]
    fn prop_denylisted_keywords_rejected_in_any_case(
        keyword in prop::sample::select(DENYLIST),
        mask in prop::collection::vec(any::<bool>(), 1..8),
        prefix in "[ (;,']{0,3}",
        suffix in "[ );,']{0,3}",
    ) {
        let gate = ExecutionGate::new().unwrap();
        let word = with_random_case(keyword, &mask);
        let sql = format!("SELECT * FROM \"t\" WHERE \"a\" = 'x {prefix}{word}{suffix} y'");

        let err = gate.check(&sql).unwrap_err();
        prop_assert!(matches!(err, SheetqlError::ForbiddenOperation(_)), "SQL: {}", sql);
    }

    #[test]
    fn prop_french_amounts_normalize(euros in 0u64..10_000_000, cents in 0u64..100) {
        let text = format!("{},{:02} €", group_thousands(euros), cents);
        let expected = euros as f64 + cents as f64 / 100.0;
        let parsed = parse_amount(&text).unwrap();
        prop_assert!((parsed - expected).abs() < 1e-6, "{} -> {}", text, parsed);
    }

    #[test]
    fn prop_date_formats_agree(days in 0i64..73_000) {
        let date = NaiveDate::from_ymd_opt(1950, 1, 1).unwrap() + chrono::Duration::days(days);
        for format in ["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y"] {
            let text = date.format(format).to_string();
            prop_assert_eq!(parse_date(&text), Some(date), "{}", text);
        }
    }
}

#[test]
fn test_serial_day_count_resolves() {
    assert_eq!(parse_date("45322"), NaiveDate::from_ymd_opt(2024, 1, 31));
    assert_eq!(parse_date("not-a-date"), None);
}
