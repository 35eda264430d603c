// Final drop of rows missing a required column.

use whiteshorts_core::Batch;

/// Keep rows where every required column is present and not null.
pub fn drop_missing_required(batch: Batch, required: &[String]) -> Batch {
    if required.is_empty() {
        return batch;
    }
    batch
        .into_iter()
        .filter(|row| required.iter().all(|c| !row.is_missing(c)))
        .collect()
}
