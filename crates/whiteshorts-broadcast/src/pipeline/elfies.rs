// Elfies number: predicted mean scaled down by the q10..q90 spread.
//
//   elfies = mean / (1 + (q90 - q10))
//
// A sharp, high prediction scores above a wide one with the same mean.

use whiteshorts_core::config::RankingPass;
use whiteshorts_core::{Batch, Scalar};

/// Compute one score. `None` when the mean is missing, the denominator is
/// non-finite or not positive, or the quotient is non-finite.
pub fn elfies_number(mean: Option<f64>, q10: Option<f64>, q90: Option<f64>) -> Option<f64> {
    let mean = mean?;
    let spread = match (q10, q90) {
        (Some(lo), Some(hi)) => hi - lo,
        _ => f64::NAN,
    };
    let denom = 1.0 + spread;
    if !denom.is_finite() || denom <= 0.0 {
        return None;
    }
    let value = mean / denom;
    value.is_finite().then_some(value)
}

/// Column names used by [`add_elfies_number`].
#[derive(Debug, Clone, Copy)]
pub struct ElfiesColumns<'a> {
    pub pred: &'a str,
    pub q10: &'a str,
    pub q90: &'a str,
    pub out: &'a str,
}

impl<'a> From<&'a RankingPass> for ElfiesColumns<'a> {
    fn from(pass: &'a RankingPass) -> Self {
        Self {
            pred: &pass.pred_col,
            q10: &pass.q10_col,
            q90: &pass.q90_col,
            out: &pass.out_col,
        }
    }
}

/// Write the score into `cols.out` of every row (null where undefined).
pub fn add_elfies_number(batch: Batch, cols: ElfiesColumns<'_>) -> Batch {
    batch
        .into_iter()
        .map(|mut row| {
            let read = |column: &str| row.get(column).and_then(Scalar::as_number);
            let score = elfies_number(read(cols.pred), read(cols.q10), read(cols.q90));
            row.insert(cols.out, score);
            row
        })
        .collect()
}
