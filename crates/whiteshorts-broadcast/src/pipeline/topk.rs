// Per-group top-K selection by score.

use std::cmp::Ordering;

use tracing::debug;
use whiteshorts_core::{Batch, Row, Scalar};

/// Parameters for [`top_k_per_group`].
#[derive(Debug, Clone, Copy)]
pub struct TopKOptions<'a> {
    /// One column or a compound key such as `(team, target)`.
    pub group_by: &'a [String],
    pub score_col: &'a str,
    pub top_k: usize,
    /// Keep every row scoring at least the K-th score, even past `top_k`.
    pub keep_ties: bool,
}

/// Descending by score with missing scores last.
fn score_desc(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// `score >= boundary` with a missing score below every number and equal
/// to another missing score.
fn at_or_above(score: Option<f64>, boundary: Option<f64>) -> bool {
    match (score, boundary) {
        (_, None) => true,
        (None, Some(_)) => false,
        (Some(s), Some(b)) => s >= b,
    }
}

fn key_cmp(a: &[Scalar], b: &[Scalar]) -> Ordering {
    a.iter()
        .zip(b)
        .map(|(x, y)| x.key_cmp(y))
        .find(|o| o.is_ne())
        .unwrap_or(Ordering::Equal)
}

struct Ranked {
    index: usize,
    key: Vec<Scalar>,
    score: Option<f64>,
}

/// Keep the best `top_k` rows of every group.
///
/// Rows are ordered by group key ascending, score descending (missing and
/// non-finite scores last), then input position, and that order is the
/// output order. Rows with a null group value belong to no group and are
/// dropped. When the score column or any group column appears in no row,
/// the batch is returned unchanged.
pub fn top_k_per_group(batch: Batch, opts: TopKOptions<'_>) -> Batch {
    if batch.is_empty() {
        return batch;
    }
    if !batch.has_column(opts.score_col) || opts.group_by.iter().any(|c| !batch.has_column(c)) {
        debug!("top-k skipped: score column '{}' or a group column is absent", opts.score_col);
        return batch;
    }

    let mut ranked: Vec<Ranked> = batch
        .iter()
        .enumerate()
        .filter_map(|(index, row)| {
            let key: Vec<Scalar> = opts
                .group_by
                .iter()
                .map(|c| row.get(c).cloned().unwrap_or(Scalar::Null))
                .collect();
            if key.iter().any(Scalar::is_null) {
                return None;
            }
            let score = row.get(opts.score_col).and_then(Scalar::as_finite);
            Some(Ranked { index, key, score })
        })
        .collect();

    ranked.sort_by(|a, b| {
        key_cmp(&a.key, &b.key)
            .then_with(|| score_desc(a.score, b.score))
            .then_with(|| a.index.cmp(&b.index))
    });

    let mut keep: Vec<usize> = Vec::new();
    let mut start = 0;
    while start < ranked.len() {
        let end = ranked[start..]
            .iter()
            .position(|r| key_cmp(&r.key, &ranked[start].key).is_ne())
            .map_or(ranked.len(), |offset| start + offset);
        let group = &ranked[start..end];
        keep.extend(select(group, opts).map(|r| r.index));
        start = end;
    }

    let mut slots: Vec<Option<Row>> = batch.into_iter().map(Some).collect();
    keep.into_iter().filter_map(|i| slots[i].take()).collect()
}

fn select<'r>(group: &'r [Ranked], opts: TopKOptions<'_>) -> impl Iterator<Item = &'r Ranked> + 'r {
    let take = if opts.top_k == 0 {
        0
    } else if opts.keep_ties {
        let boundary = group[group.len().min(opts.top_k) - 1].score;
        let n = group
            .iter()
            .take_while(|r| at_or_above(r.score, boundary))
            .count();
        if n > opts.top_k {
            debug!("keeping {n} rows for top_k={}: ties at the boundary", opts.top_k);
        }
        n
    } else {
        opts.top_k.min(group.len())
    };
    group.iter().take(take)
}
