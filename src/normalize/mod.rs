//! Query-time normalization of text columns.
//!
//! Source spreadsheets mix number and date formats inside a single column, so
//! nothing is typed at ingestion. Instead the compiler wraps column references
//! in the expressions produced here. The coercions themselves are the pure
//! functions [`parse_amount`] and [`parse_date`], which the store registers as
//! the SQL scalar functions [`AMOUNT_FN`] and [`DATE_FN`].
//!
//! Both coercions are total: unparseable input yields `None` (SQL `NULL`),
//! which makes a comparison evaluate to "no match" rather than failing the
//! whole query.

use chrono::{Days, NaiveDate, NaiveDateTime};

/// SQL function name of the numeric coercion.
pub const AMOUNT_FN: &str = "norm_amount";

/// SQL function name of the date coercion.
pub const DATE_FN: &str = "norm_date";

/// Format of dates produced by [`DATE_FN`]; ISO text compares correctly as text.
pub const ISO_DATE: &str = "%Y-%m-%d";

const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

/// Coerces free-form amount text into a number.
///
/// Keeps only digits, `,`, `.` and `-`, turns `,` into the decimal point and
/// parses the rest. `"1 234,56 €"` becomes `1234.56`; `"abc"` becomes `None`.
pub fn parse_amount(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, ',' | '.' | '-'))
        .map(|c| if c == ',' { '.' } else { c })
        .collect();

    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Coerces date text into a calendar date.
///
/// Tries, in order: a plain ISO date, an ISO timestamp truncated to its date,
/// `%Y-%m-%d` with relaxed padding, `DD/MM/YYYY`, `DD-MM-YYYY`, and finally a
/// spreadsheet serial day count anchored at 1899-12-30. The first success wins.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let text = raw.trim();
    if text.is_empty() {
        return None;
    }

    parse_iso_date(text)
        .or_else(|| parse_timestamp_date(text))
        .or_else(|| NaiveDate::parse_from_str(text, ISO_DATE).ok())
        .or_else(|| NaiveDate::parse_from_str(text, "%d/%m/%Y").ok())
        .or_else(|| NaiveDate::parse_from_str(text, "%d-%m-%Y").ok())
        .or_else(|| parse_serial_date(text))
}

fn parse_iso_date(text: &str) -> Option<NaiveDate> {
    let bytes = text.as_bytes();
    let shaped = bytes.len() == 10
        && bytes[4] == b'-'
        && bytes[7] == b'-'
        && bytes
            .iter()
            .enumerate()
            .all(|(i, b)| i == 4 || i == 7 || b.is_ascii_digit());
    if !shaped {
        return None;
    }
    NaiveDate::parse_from_str(text, ISO_DATE).ok()
}

fn parse_timestamp_date(text: &str) -> Option<NaiveDate> {
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .map(|ts| ts.date())
}

fn parse_serial_date(text: &str) -> Option<NaiveDate> {
    let serial = text.parse::<f64>().ok().filter(|v| v.is_finite())?.round();
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    if serial >= 0.0 {
        epoch.checked_add_days(Days::new(serial as u64))
    } else {
        epoch.checked_sub_days(Days::new(serial.abs() as u64))
    }
}

/// Same as [`parse_date`], rendered as ISO text (`YYYY-MM-DD`).
pub fn parse_date_iso(raw: &str) -> Option<String> {
    parse_date(raw).map(|d| d.format(ISO_DATE).to_string())
}

/// Expression coercing a quoted column reference (or literal) into a number.
pub fn amount_expr(quoted: &str) -> String {
    format!("{AMOUNT_FN}(CAST({quoted} AS TEXT))")
}

/// Expression coercing a quoted column reference (or literal) into an ISO date.
pub fn date_expr(quoted: &str) -> String {
    format!("{DATE_FN}(CAST({quoted} AS TEXT))")
}

/// Expression extracting the calendar year of a normalized date.
pub fn year_expr(quoted: &str) -> String {
    format!("CAST(strftime('%Y', {}) AS INTEGER)", date_expr(quoted))
}
