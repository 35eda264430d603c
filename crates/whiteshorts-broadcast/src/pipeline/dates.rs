// Date columns normalized to ISO `YYYY-MM-DD` text.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use whiteshorts_core::{Batch, Scalar};

/// Tokens that upstream tooling writes for "no date".
const SENTINELS: &[&str] = &["nat", "none", "null", "nan"];

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%Y.%m.%d",
    "%m/%d/%Y",
    "%d %B %Y",
    "%d %b %Y",
    "%B %d, %Y",
    "%b %d, %Y",
];

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M"];

/// Parse a cell as a calendar date. Returns `None` for nulls, sentinel
/// tokens and anything unrecognized.
pub fn parse_date(value: &Scalar) -> Option<NaiveDate> {
    match value {
        Scalar::Text(s) => parse_date_text(s),
        Scalar::Int(i) => compact_date(&i.to_string()),
        Scalar::Float(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < 1.0e9 => {
            compact_date(&format!("{}", *f as i64))
        }
        _ => None,
    }
}

fn parse_date_text(text: &str) -> Option<NaiveDate> {
    let t = text.trim();
    if t.is_empty() || SENTINELS.iter().any(|s| t.eq_ignore_ascii_case(s)) {
        return None;
    }
    if let Some(date) = compact_date(t) {
        return Some(date);
    }
    if let Some(date) = DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(t, fmt).ok())
    {
        return Some(date);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(t) {
        return Some(dt.date_naive());
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(t, fmt).ok())
        .map(|dt| dt.date())
}

/// `YYYYMMDD`, exactly eight digits.
fn compact_date(text: &str) -> Option<NaiveDate> {
    if text.len() != 8 || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let year: i32 = text[0..4].parse().ok()?;
    let month: u32 = text[4..6].parse().ok()?;
    let day: u32 = text[6..8].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Whether a column is treated as a date column.
pub fn is_date_column(column: &str) -> bool {
    column.contains("date")
}

/// Rewrite every date column: parseable values become `YYYY-MM-DD` text,
/// everything else becomes null.
pub fn normalize_dates(batch: Batch) -> Batch {
    let columns: Vec<String> = batch
        .columns()
        .into_iter()
        .filter(|c| is_date_column(c))
        .collect();
    if columns.is_empty() {
        return batch;
    }

    batch
        .into_iter()
        .map(|mut row| {
            for column in &columns {
                if let Some(slot) = row.get_mut(column) {
                    *slot = parse_date(slot)
                        .map(|d| Scalar::Text(d.format("%Y-%m-%d").to_string()))
                        .unwrap_or(Scalar::Null);
                }
            }
            row
        })
        .collect()
}
