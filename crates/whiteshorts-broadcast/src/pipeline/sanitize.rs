// JSON-safety pass: no NaN, no infinities, no ragged rows.

use whiteshorts_core::{Batch, Row, Scalar};

/// Replace every non-finite float with null and give every row every batch
/// column, in batch column order. Absent cells become explicit nulls.
///
/// Total and idempotent.
pub fn nullify_non_finite(batch: Batch) -> Batch {
    let columns = batch.columns();
    batch
        .into_iter()
        .map(|mut row| {
            let mut out = Row::with_capacity(columns.len());
            for column in &columns {
                let value = match row.remove(column) {
                    Some(v) if v.is_non_finite() => Scalar::Null,
                    Some(v) => v,
                    None => Scalar::Null,
                };
                out.insert(column.as_str(), value);
            }
            out
        })
        .collect()
}
