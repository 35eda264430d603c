// Opportunistic numeric typing of text columns.

use tracing::debug;
use whiteshorts_core::{parse_number, Batch, Scalar};

/// Minimum share of cleanly parsed values for a column to become numeric.
pub const NUMERIC_SHARE: f64 = 0.8;

/// Parse one cell as a number. Nulls, booleans, NaN and unparsable text are
/// invalid.
pub fn parse_cell(value: &Scalar) -> Option<Scalar> {
    match value {
        Scalar::Int(i) => Some(Scalar::Int(*i)),
        Scalar::Float(f) if f.is_nan() => None,
        Scalar::Float(f) => Some(Scalar::Float(*f)),
        Scalar::Text(s) => parse_number(s),
        Scalar::Bool(_) | Scalar::Null => None,
    }
}

/// Convert each column to numbers when at least [`NUMERIC_SHARE`] of the
/// batch's rows parse cleanly; invalid cells in a converted column become
/// null. Rows lacking the column count as invalid and stay without it.
pub fn coerce_types(batch: Batch) -> Batch {
    if batch.is_empty() {
        return batch;
    }
    let total = batch.len() as f64;

    let numeric: Vec<String> = batch
        .columns()
        .into_iter()
        .filter(|column| {
            let valid = batch
                .iter()
                .filter(|row| row.get(column).and_then(parse_cell).is_some())
                .count();
            let share = valid as f64 / total;
            let keep = share >= NUMERIC_SHARE;
            if keep {
                debug!("coercing column '{column}' to numeric ({:.0}% parsed)", share * 100.0);
            }
            keep
        })
        .collect();

    if numeric.is_empty() {
        return batch;
    }

    batch
        .into_iter()
        .map(|mut row| {
            for column in &numeric {
                if let Some(slot) = row.get_mut(column) {
                    *slot = parse_cell(slot).unwrap_or(Scalar::Null);
                }
            }
            row
        })
        .collect()
}
