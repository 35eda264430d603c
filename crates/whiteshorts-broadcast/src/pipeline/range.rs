// Inclusive numeric range filtering.

use whiteshorts_core::config::RangeMap;
use whiteshorts_core::{Batch, Row};

/// Whether `row` satisfies every bound whose column it carries. A present
/// value that is null or not a number fails; absent columns are skipped.
pub fn row_in_range(row: &Row, ranges: &RangeMap) -> bool {
    ranges.iter().all(|(column, bounds)| match row.get(column) {
        None => true,
        Some(value) => value.as_number().is_some_and(|v| bounds.contains(v)),
    })
}

/// Keep the rows that pass [`row_in_range`], in input order.
pub fn filter_by_range(batch: Batch, ranges: &RangeMap) -> Batch {
    if ranges.is_empty() {
        return batch;
    }
    batch
        .into_iter()
        .filter(|row| row_in_range(row, ranges))
        .collect()
}
