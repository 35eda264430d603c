// Loading raw prediction dumps (CSV or JSON) into a `Batch`.
//
// Cells are kept as text; numeric typing is left to the pipeline's coercion
// stage so that a dirty column never fails the whole load.

use std::io::Read;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};
use whiteshorts_core::{Batch, Row, Scalar};

/// Fallback input when no `predictions_*.csv` exists.
pub const DEFAULT_INPUT: &str = "predictions.csv";

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum InputError {
    #[error("failed to read file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("CSV error in {path}: {source}")]
    Csv { path: String, source: csv::Error },

    #[error("JSON error in {path}: {source}")]
    Json {
        path: String,
        source: serde_json::Error,
    },

    #[error("{path}: expected a JSON array of objects")]
    NotAnArray { path: String },
}

// ---------------------------------------------------------------------------
// Reader-based loaders (enable testing without temp files)
// ---------------------------------------------------------------------------

/// Read a headed CSV. Empty cells become null, everything else text.
/// Short rows leave trailing columns absent; extra cells are dropped.
pub fn load_csv_from_reader<R: Read>(rdr: R) -> Result<Batch, csv::Error> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(rdr);
    let headers = reader.headers()?.clone();
    let mut rows = Vec::new();

    for (line, result) in reader.records().enumerate() {
        match result {
            Ok(record) => {
                if record.len() > headers.len() {
                    warn!(
                        "row {}: {} cells for {} columns, extra cells ignored",
                        line + 1,
                        record.len(),
                        headers.len()
                    );
                }
                let row: Row = headers
                    .iter()
                    .zip(record.iter())
                    .map(|(name, cell)| {
                        let value = if cell.is_empty() {
                            Scalar::Null
                        } else {
                            Scalar::Text(cell.to_string())
                        };
                        (name, value)
                    })
                    .collect();
                rows.push(row);
            }
            Err(e) => {
                warn!("skipping malformed CSV row: {}", e);
            }
        }
    }
    Ok(Batch::new(rows))
}

/// Convert one JSON value to a cell. Nested arrays and objects are kept as
/// their JSON text.
pub fn scalar_from_json(value: &Value) -> Scalar {
    match value {
        Value::Null => Scalar::Null,
        Value::Bool(b) => Scalar::Bool(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Scalar::Int(i),
            None => n.as_f64().map_or(Scalar::Null, Scalar::Float),
        },
        Value::String(s) => Scalar::Text(s.clone()),
        Value::Array(_) | Value::Object(_) => Scalar::Text(value.to_string()),
    }
}

/// Build a batch from a parsed JSON document. Returns `None` unless the
/// document is an array; non-object elements are skipped.
pub fn batch_from_json(doc: &Value) -> Option<Batch> {
    let items = doc.as_array()?;
    let mut rows = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        match item.as_object() {
            Some(obj) => rows.push(
                obj.iter()
                    .map(|(k, v)| (k.as_str(), scalar_from_json(v)))
                    .collect::<Row>(),
            ),
            None => warn!("skipping JSON element {i}: not an object"),
        }
    }
    Some(Batch::new(rows))
}

// ---------------------------------------------------------------------------
// Public path-based loaders
// ---------------------------------------------------------------------------

pub fn load_csv(path: &Path) -> Result<Batch, InputError> {
    let file = std::fs::File::open(path).map_err(|e| InputError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    load_csv_from_reader(file).map_err(|e| InputError::Csv {
        path: path.display().to_string(),
        source: e,
    })
}

pub fn load_json(path: &Path) -> Result<Batch, InputError> {
    let file = std::fs::File::open(path).map_err(|e| InputError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    let doc: Value =
        serde_json::from_reader(std::io::BufReader::new(file)).map_err(|e| InputError::Json {
            path: path.display().to_string(),
            source: e,
        })?;
    batch_from_json(&doc).ok_or_else(|| InputError::NotAnArray {
        path: path.display().to_string(),
    })
}

/// Load a dump, choosing the format by extension (`.json` or CSV).
pub fn load_batch(path: &Path) -> Result<Batch, InputError> {
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));
    let batch = if is_json { load_json(path)? } else { load_csv(path)? };
    debug!("loaded {} rows from {}", batch.len(), path.display());
    Ok(batch)
}

// ---------------------------------------------------------------------------
// Input discovery
// ---------------------------------------------------------------------------

fn is_dated_dump(name: &str) -> bool {
    name.starts_with("predictions_") && name.ends_with(".csv")
}

/// The most recently modified `predictions_*.csv` in `dir`, if any.
pub fn find_latest_input(dir: &Path) -> Option<PathBuf> {
    let entries = std::fs::read_dir(dir).ok()?;
    entries
        .filter_map(Result::ok)
        .filter(|entry| entry.file_name().to_str().is_some_and(is_dated_dump))
        .filter_map(|entry| {
            let modified = entry.metadata().and_then(|m| m.modified()).ok()?;
            Some((modified, entry.path()))
        })
        .max_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)))
        .map(|(_, path)| path)
}

/// The explicit path when given, else the latest dated dump in `dir`, else
/// `dir/predictions.csv`.
pub fn resolve_input(explicit: Option<&Path>, dir: &Path) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    find_latest_input(dir).unwrap_or_else(|| dir.join(DEFAULT_INPUT))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::{Duration, SystemTime};

    #[test]
    fn csv_cells_are_text_and_empty_is_null() {
        let csv_data = "\
date,team,player_id,pred_mean,q10,q90
2025-10-07,TOR,8478402,2.5,,3
2025-10-07,MTL,8480018,1.1,0.2,1.9";

        let batch = load_csv_from_reader(csv_data.as_bytes()).unwrap();
        assert_eq!(batch.len(), 2);
        let first = &batch.rows()[0];
        assert_eq!(first.get("team"), Some(&Scalar::from("TOR")));
        assert_eq!(first.get("pred_mean"), Some(&Scalar::from("2.5")));
        assert_eq!(first.get("q10"), Some(&Scalar::Null));
        assert_eq!(
            first.columns().collect::<Vec<_>>(),
            vec!["date", "team", "player_id", "pred_mean", "q10", "q90"]
        );
    }

    #[test]
    fn ragged_csv_rows_tolerated() {
        let csv_data = "a,b,c\n1,2\n1,2,3,4\n";
        let batch = load_csv_from_reader(csv_data.as_bytes()).unwrap();
        assert_eq!(batch.len(), 2);
        assert!(!batch.rows()[0].contains("c"));
        assert_eq!(batch.rows()[1].len(), 3);
    }

    #[test]
    fn header_only_csv_is_empty() {
        let batch = load_csv_from_reader("a,b\n".as_bytes()).unwrap();
        assert!(batch.is_empty());
    }

    #[test]
    fn json_values_keep_their_types() {
        let doc: Value = serde_json::from_str(
            r#"[{"team":"A","q10":1,"q90":2.5,"ok":true,"x":null,"tags":["a","b"]}, 7]"#,
        )
        .unwrap();
        let batch = batch_from_json(&doc).unwrap();
        assert_eq!(batch.len(), 1);
        let row = &batch.rows()[0];
        assert_eq!(row.get("q10"), Some(&Scalar::Int(1)));
        assert_eq!(row.get("q90"), Some(&Scalar::Float(2.5)));
        assert_eq!(row.get("ok"), Some(&Scalar::Bool(true)));
        assert_eq!(row.get("x"), Some(&Scalar::Null));
        assert_eq!(row.get("tags"), Some(&Scalar::from(r#"["a","b"]"#)));
    }

    #[test]
    fn json_keeps_document_column_order() {
        let doc: Value = serde_json::from_str(
            r#"[{"team":"A","date":"2025-10-07","player_id":1,"lambda_or_mu":2,"q10":0,"q90":1}]"#,
        )
        .unwrap();
        let batch = batch_from_json(&doc).unwrap();
        assert_eq!(
            batch.columns(),
            vec!["team", "date", "player_id", "lambda_or_mu", "q10", "q90"]
        );
    }

    #[test]
    fn json_object_document_is_rejected() {
        let doc: Value = serde_json::from_str(r#"{"rows": []}"#).unwrap();
        assert!(batch_from_json(&doc).is_none());
    }

    #[test]
    fn load_batch_dispatches_on_extension() {
        let tmp = std::env::temp_dir().join("ws_input_test_dispatch");
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(&tmp).unwrap();
        fs::write(tmp.join("dump.json"), r#"[{"team":"A"}]"#).unwrap();
        fs::write(tmp.join("dump.csv"), "team\nB\n").unwrap();
        fs::write(tmp.join("bad.json"), r#"{"team":"A"}"#).unwrap();

        let json = load_batch(&tmp.join("dump.json")).unwrap();
        assert_eq!(json.rows()[0].get("team"), Some(&Scalar::from("A")));
        let csv = load_batch(&tmp.join("dump.csv")).unwrap();
        assert_eq!(csv.rows()[0].get("team"), Some(&Scalar::from("B")));

        match load_batch(&tmp.join("bad.json")).unwrap_err() {
            InputError::NotAnArray { path } => assert!(path.ends_with("bad.json")),
            other => panic!("expected NotAnArray, got: {other}"),
        }
        match load_batch(&tmp.join("missing.csv")).unwrap_err() {
            InputError::Io { path, .. } => assert!(path.ends_with("missing.csv")),
            other => panic!("expected Io, got: {other}"),
        }

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn resolve_input_prefers_newest_dated_dump() {
        let tmp = std::env::temp_dir().join("ws_input_test_latest");
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(&tmp).unwrap();

        assert_eq!(resolve_input(None, &tmp), tmp.join("predictions.csv"));

        let old = tmp.join("predictions_20251006.csv");
        let new = tmp.join("predictions_20251007.csv");
        fs::write(&old, "team\nA\n").unwrap();
        fs::write(&new, "team\nB\n").unwrap();
        fs::write(tmp.join("notes.csv"), "x\n").unwrap();
        let past = SystemTime::now() - Duration::from_secs(3600);
        fs::File::options()
            .write(true)
            .open(&old)
            .unwrap()
            .set_modified(past)
            .unwrap();

        assert_eq!(find_latest_input(&tmp), Some(new.clone()));
        assert_eq!(resolve_input(None, &tmp), new);
        assert_eq!(resolve_input(Some(&old), &tmp), old);

        let _ = fs::remove_dir_all(&tmp);
    }
}
