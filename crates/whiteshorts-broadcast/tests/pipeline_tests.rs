// End-to-end tests for the broadcast pipeline.
//
// These drive `whiteshorts_broadcast::run` through its public API, with
// configs built in code and with the shipped defaults/broadcast.toml.

use std::fs;
use std::path::{Path, PathBuf};

use whiteshorts_broadcast::input::load_batch;
use whiteshorts_broadcast::pipeline::sanitize::nullify_non_finite;
use whiteshorts_broadcast::{run, Stage};
use whiteshorts_core::config::{load_config_from, Bounds, Overrides, PipelineConfig, RankingPass};
use whiteshorts_core::{Batch, Row, Scalar};

// ===========================================================================
// Test helpers
// ===========================================================================

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name)
}

/// A pipeline with no identifier, plausibility or post-rank settings, so a
/// test only sees the stages it configures.
fn plain_pipeline() -> PipelineConfig {
    PipelineConfig {
        id_cols: Vec::new(),
        ranking: Vec::new(),
        ..PipelineConfig::default()
    }
}

fn row<const N: usize>(cells: [(&str, Scalar); N]) -> Row {
    cells.into_iter().collect()
}

fn texts(batch: &Batch, column: &str) -> Vec<String> {
    batch
        .iter()
        .map(|r| r.get(column).map(ToString::to_string).unwrap_or_default())
        .collect()
}

// ===========================================================================
// Scenarios
// ===========================================================================

#[test]
fn three_row_team_ranks_by_elfies_number() {
    let batch = Batch::new(vec![
        row([
            ("id", "row1".into()),
            ("team", "A".into()),
            ("mean", Scalar::Int(5)),
            ("q10", Scalar::Int(1)),
            ("q90", Scalar::Int(2)),
        ]),
        row([
            ("id", "row2".into()),
            ("team", "A".into()),
            ("mean", Scalar::Int(3)),
            ("q10", Scalar::Int(0)),
            ("q90", Scalar::Int(1)),
        ]),
        row([
            ("id", "row3".into()),
            ("team", "A".into()),
            ("mean", Scalar::Int(5)),
            ("q10", Scalar::Int(0)),
            ("q90", Scalar::Int(0)),
        ]),
    ]);
    let config = PipelineConfig {
        ranking: vec![RankingPass {
            pred_col: "mean".into(),
            top_k: 2,
            keep_ties: false,
            ..RankingPass::default()
        }],
        ..plain_pipeline()
    };

    let out = run(batch, &config);
    assert_eq!(texts(&out.batch, "id"), vec!["row3", "row1"]);
    assert_eq!(out.batch.rows()[0].get("elfies_number"), Some(&Scalar::Float(5.0)));
    assert_eq!(out.batch.rows()[1].get("elfies_number"), Some(&Scalar::Float(2.5)));
}

#[test]
fn plausibility_bounds_keep_only_in_range_means() {
    let batch: Batch = ["0.3", "1.0", "20.5"]
        .into_iter()
        .map(|v| row([("pred_mean", Scalar::from(v))]))
        .collect();
    let mut config = plain_pipeline();
    config.plausibility.insert("pred_mean".into(), Bounds::between(0.5, 10.0));

    let out = run(batch, &config);
    assert_eq!(out.batch.len(), 1);
    assert_eq!(out.batch.rows()[0].get("pred_mean"), Some(&Scalar::Float(1.0)));
}

#[test]
fn dates_normalize_or_null() {
    let batch = Batch::new(vec![
        row([("date", "2025/10/07".into())]),
        row([("date", "not-a-date".into())]),
    ]);
    let out = run(batch, &plain_pipeline());
    assert_eq!(out.batch.rows()[0].get("date"), Some(&Scalar::from("2025-10-07")));
    assert_eq!(out.batch.rows()[1].get("date"), Some(&Scalar::Null));
}

#[test]
fn required_player_id_drops_null_rows() {
    let batch = Batch::new(vec![
        row([("player_id", Scalar::Null), ("name", "a".into())]),
        row([("player_id", "123".into()), ("name", "b".into())]),
    ]);
    let config = PipelineConfig {
        required_cols: vec!["player_id".into()],
        ..plain_pipeline()
    };
    let out = run(batch, &config);
    assert_eq!(texts(&out.batch, "name"), vec!["b"]);
}

#[test]
fn empty_batch_flows_through_every_stage() {
    let out = run(Batch::default(), &PipelineConfig::default());
    assert!(out.batch.is_empty());
    assert!(out.report.iter().all(|r| r.rows_in == 0 && r.rows_out == 0));
}

#[test]
fn output_is_json_safe_and_sanitizer_is_idempotent() {
    let batch = Batch::new(vec![
        row([
            ("team", "A".into()),
            ("lambda_or_mu", Scalar::Float(2.0)),
            ("q10", Scalar::Float(0.0)),
            ("q90", Scalar::Float(f64::INFINITY)),
            ("extra", Scalar::Float(f64::NAN)),
        ]),
        row([
            ("team", "A".into()),
            ("lambda_or_mu", Scalar::Float(1.0)),
            ("q10", Scalar::Float(0.0)),
            ("q90", Scalar::Float(1.0)),
        ]),
    ]);
    let config = PipelineConfig {
        ranking: vec![RankingPass::default()],
        ..plain_pipeline()
    };

    let out = run(batch, &config);
    assert_eq!(out.batch.len(), 2);
    assert!(out.batch.iter().all(|r| !r.has_non_finite()));
    assert_eq!(nullify_non_finite(out.batch.clone()), out.batch);

    let json = serde_json::to_string(&out.batch).unwrap();
    assert!(!json.contains("NaN") && !json.contains("inf"));
    for r in &out.batch {
        assert_eq!(r.columns().count(), 6);
    }
}

#[test]
fn top_k_selection_stable_under_input_permutation() {
    let rows: Vec<Row> = [("a", 3.0), ("b", 1.0), ("c", 4.0), ("d", 2.0), ("e", 0.5)]
        .into_iter()
        .map(|(id, mu)| {
            row([
                ("id", id.into()),
                ("team", "T".into()),
                ("lambda_or_mu", Scalar::Float(mu)),
                ("q10", Scalar::Float(1.0)),
                ("q90", Scalar::Float(1.0)),
            ])
        })
        .collect();
    let config = PipelineConfig {
        ranking: vec![RankingPass {
            top_k: 3,
            ..RankingPass::default()
        }],
        ..plain_pipeline()
    };

    let mut rotated = rows.clone();
    rotated.rotate_left(2);
    let a = run(Batch::new(rows), &config);
    let b = run(Batch::new(rotated), &config);
    assert_eq!(texts(&a.batch, "id"), vec!["c", "a", "d"]);
    assert_eq!(texts(&a.batch, "id"), texts(&b.batch, "id"));
}

#[test]
fn two_ranking_passes_with_compound_key() {
    let mut rows = Vec::new();
    for (i, (team, target, mu)) in [
        ("A", "goals", 3.0),
        ("A", "goals", 2.0),
        ("A", "points", 4.0),
        ("A", "points", 1.0),
        ("B", "goals", 5.0),
    ]
    .into_iter()
    .enumerate()
    {
        rows.push(row([
            ("id", Scalar::Int(i as i64)),
            ("team", team.into()),
            ("target", target.into()),
            ("lambda_or_mu", Scalar::Float(mu)),
            ("q10", Scalar::Float(0.0)),
            ("q90", Scalar::Float(0.0)),
        ]));
    }
    let mut first = RankingPass {
        top_k: 1,
        group_by: vec!["team".into(), "target".into()],
        ..RankingPass::default()
    };
    first.pre_filter.insert("lambda_or_mu".into(), Bounds::at_least(1.5));
    let second = RankingPass {
        top_k: 1,
        ..RankingPass::default()
    };
    let config = PipelineConfig {
        ranking: vec![first, second],
        ..plain_pipeline()
    };

    let out = run(Batch::new(rows), &config);
    // Pass 1 keeps ids 0, 2 and 4; pass 2 keeps the best per team.
    assert_eq!(texts(&out.batch, "id"), vec!["2", "4"]);
    let pre = out.report.iter().find(|r| r.stage == Stage::PreFilter(0)).unwrap();
    assert_eq!((pre.rows_in, pre.rows_out), (5, 4));
}

// ===========================================================================
// Shipped defaults against a fixture dump
// ===========================================================================

#[test]
fn fixture_dump_with_default_config() {
    let tmp = std::env::temp_dir().join("ws_pipeline_test_fixture");
    let _ = fs::remove_dir_all(&tmp);
    fs::create_dir_all(tmp.join("config")).unwrap();
    fs::copy(
        Path::new(env!("CARGO_MANIFEST_DIR")).join("../../defaults/broadcast.toml"),
        tmp.join("config/broadcast.toml"),
    )
    .unwrap();
    let overrides = Overrides {
        backend: Some("file".into()),
        ..Overrides::default()
    };
    let config = load_config_from(&tmp, &overrides).unwrap();

    let batch = load_batch(&fixture("predictions_sample.csv")).unwrap();
    assert_eq!(batch.len(), 7);

    let out = run(batch, &config.pipeline);
    let rows = out.batch.rows();
    assert_eq!(
        texts(&out.batch, "name"),
        vec!["Cole Caufield", "Nick Suzuki", "Auston Matthews"]
    );

    let matthews = &rows[2];
    assert_eq!(matthews.get("player_id"), Some(&Scalar::from("8478402")));
    assert_eq!(matthews.get("game_id"), Some(&Scalar::from("2025020001")));
    assert_eq!(matthews.get("date"), Some(&Scalar::from("2025-10-07")));
    assert_eq!(matthews.get("elfies_number"), Some(&Scalar::Float(2.5)));
    assert_eq!(rows[1].get("date"), Some(&Scalar::Null));

    let columns: Vec<&str> = matthews.columns().collect();
    assert_eq!(
        columns,
        vec![
            "date",
            "game_id",
            "team",
            "opponent",
            "player_id",
            "name",
            "target",
            "lambda_or_mu",
            "q10",
            "q90",
            "elfies_number",
        ]
    );

    let _ = fs::remove_dir_all(&tmp);
}
