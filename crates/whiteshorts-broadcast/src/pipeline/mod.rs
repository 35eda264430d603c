// Broadcast post-processing: raw prediction dump -> clean ranked payload.
//
// Every stage consumes a batch and returns a new one. Value-level defects
// degrade to null or row exclusion; no stage returns an error.

pub mod clip;
pub mod coerce;
pub mod columns;
pub mod dates;
pub mod elfies;
pub mod ids;
pub mod range;
pub mod required;
pub mod sanitize;
pub mod topk;

use std::fmt;

use tracing::{debug, info};
use whiteshorts_core::config::PipelineConfig;
use whiteshorts_core::Batch;

use elfies::ElfiesColumns;
use topk::TopKOptions;

/// Pipeline stages, in run order. Ranking stages carry the pass index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Columns,
    Coerce,
    Identifiers,
    Dates,
    Plausibility,
    Clip,
    PreFilter(usize),
    Elfies(usize),
    TopK(usize),
    PostRank,
    Sanitize,
    Required,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Columns => f.write_str("columns"),
            Stage::Coerce => f.write_str("coerce"),
            Stage::Identifiers => f.write_str("identifiers"),
            Stage::Dates => f.write_str("dates"),
            Stage::Plausibility => f.write_str("plausibility"),
            Stage::Clip => f.write_str("clip"),
            Stage::PreFilter(i) => write!(f, "ranking[{i}].pre_filter"),
            Stage::Elfies(i) => write!(f, "ranking[{i}].elfies"),
            Stage::TopK(i) => write!(f, "ranking[{i}].top_k"),
            Stage::PostRank => f.write_str("post_rank"),
            Stage::Sanitize => f.write_str("sanitize"),
            Stage::Required => f.write_str("required"),
        }
    }
}

/// Row counts around one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageReport {
    pub stage: Stage,
    pub rows_in: usize,
    pub rows_out: usize,
}

#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub batch: Batch,
    pub report: Vec<StageReport>,
}

impl PipelineOutput {
    /// Row count before the first stage.
    pub fn rows_in(&self) -> usize {
        self.report.first().map_or(self.batch.len(), |r| r.rows_in)
    }
}

/// Applies stages in order and records what each one did.
struct Runner {
    batch: Batch,
    report: Vec<StageReport>,
}

impl Runner {
    fn apply(mut self, stage: Stage, f: impl FnOnce(Batch) -> Batch) -> Self {
        let rows_in = self.batch.len();
        self.batch = f(self.batch);
        let rows_out = self.batch.len();
        debug!("stage {stage}: {rows_in} -> {rows_out} rows");
        self.report.push(StageReport {
            stage,
            rows_in,
            rows_out,
        });
        self
    }
}

/// Run the full pipeline over `batch`.
pub fn run(batch: Batch, config: &PipelineConfig) -> PipelineOutput {
    let mut runner = Runner {
        batch,
        report: Vec::new(),
    };

    runner = runner
        .apply(Stage::Columns, |b| columns::normalize_columns(b, &config.rename_map))
        .apply(Stage::Coerce, coerce::coerce_types)
        .apply(Stage::Identifiers, |b| ids::normalize_identifiers(b, &config.id_cols))
        .apply(Stage::Dates, dates::normalize_dates)
        .apply(Stage::Plausibility, |b| range::filter_by_range(b, &config.plausibility))
        .apply(Stage::Clip, |b| clip::clip_columns(b, &config.clip));

    for (i, pass) in config.ranking.iter().enumerate() {
        runner = runner
            .apply(Stage::PreFilter(i), |b| range::filter_by_range(b, &pass.pre_filter))
            .apply(Stage::Elfies(i), |b| elfies::add_elfies_number(b, ElfiesColumns::from(pass)))
            .apply(Stage::TopK(i), |b| {
                topk::top_k_per_group(
                    b,
                    TopKOptions {
                        group_by: &pass.group_by,
                        score_col: &pass.out_col,
                        top_k: pass.top_k,
                        keep_ties: pass.keep_ties,
                    },
                )
            });
    }

    let runner = runner
        .apply(Stage::PostRank, |b| range::filter_by_range(b, &config.post_rank))
        .apply(Stage::Sanitize, sanitize::nullify_non_finite)
        .apply(Stage::Required, |b| {
            required::drop_missing_required(b, &config.required_cols)
        });

    let output = PipelineOutput {
        batch: runner.batch,
        report: runner.report,
    };
    info!(
        "pipeline kept {} of {} rows ({} ranking passes)",
        output.batch.len(),
        output.rows_in(),
        config.ranking.len()
    );
    output
}
