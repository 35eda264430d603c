// Clamp numeric columns into configured bounds.

use whiteshorts_core::config::RangeMap;
use whiteshorts_core::{Batch, Scalar};

/// Clamp every listed column a row carries. Values that are not numbers
/// become null; no row is dropped. An integer already inside its bounds
/// stays an integer.
pub fn clip_columns(batch: Batch, clip: &RangeMap) -> Batch {
    if clip.is_empty() {
        return batch;
    }
    batch
        .into_iter()
        .map(|mut row| {
            for (column, bounds) in clip {
                if let Some(slot) = row.get_mut(column) {
                    *slot = match (&*slot, slot.as_number()) {
                        (Scalar::Int(i), Some(v)) if bounds.contains(v) => Scalar::Int(*i),
                        (_, Some(v)) => Scalar::Float(bounds.clamp(v)),
                        (_, None) => Scalar::Null,
                    };
                }
            }
            row
        })
        .collect()
}
