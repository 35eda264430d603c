// Column renaming and snake-casing.

use std::collections::{BTreeMap, HashMap};

use whiteshorts_core::{Batch, Row};

/// Snake-case a column name: every run of characters outside `[0-9A-Za-z]`
/// becomes one underscore, leading and trailing underscores are dropped and
/// the result is lowercased.
pub fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_sep = false;
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.push(ch.to_ascii_lowercase());
        } else {
            pending_sep = true;
        }
    }
    out
}

/// Apply `rename_map`, then snake-case every column name.
///
/// Values are untouched and no row is dropped. When two source columns end
/// up with the same name, the one later in the row overwrites the value of
/// the earlier one, which keeps its position.
pub fn normalize_columns(batch: Batch, rename_map: &BTreeMap<String, String>) -> Batch {
    let names: HashMap<String, String> = batch
        .columns()
        .into_iter()
        .map(|raw| {
            let renamed = rename_map.get(&raw).map_or(raw.as_str(), String::as_str);
            let canonical = snake_case(renamed);
            (raw, canonical)
        })
        .collect();

    batch
        .into_iter()
        .map(|row| {
            let mut out = Row::with_capacity(row.len());
            for (raw, value) in row {
                let name = names.get(&raw).cloned().unwrap_or_else(|| snake_case(&raw));
                out.insert(name, value);
            }
            out
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use whiteshorts_core::Scalar;

    #[test]
    fn snake_case_examples() {
        assert_eq!(snake_case("Player ID"), "player_id");
        assert_eq!(snake_case("  Game-Date "), "game_date");
        assert_eq!(snake_case("__q10__"), "q10");
        assert_eq!(snake_case("P(>=2) goals"), "p_2_goals");
        assert_eq!(snake_case("lambda_or_mu"), "lambda_or_mu");
        assert_eq!(snake_case("PlayerID"), "playerid");
        assert_eq!(snake_case("Élan"), "lan");
        assert_eq!(snake_case("---"), "");
    }

    #[test]
    fn rename_then_snake_case() {
        let row: Row = [("Pred Mean", Scalar::Float(2.5)), ("Team", Scalar::from("A"))]
            .into_iter()
            .collect();
        let mut rename = BTreeMap::new();
        rename.insert("Pred Mean".to_string(), "Lambda Or Mu".to_string());

        let out = normalize_columns(Batch::new(vec![row]), &rename);
        let row = &out.rows()[0];
        assert_eq!(row.columns().collect::<Vec<_>>(), vec!["lambda_or_mu", "team"]);
        assert_eq!(row.get("lambda_or_mu"), Some(&Scalar::Float(2.5)));
    }

    #[test]
    fn collision_keeps_later_value_in_earlier_slot() {
        let row: Row = [
            ("Player ID", Scalar::from("1")),
            ("name", Scalar::from("x")),
            ("player_id", Scalar::from("2")),
        ]
        .into_iter()
        .collect();

        let out = normalize_columns(Batch::new(vec![row]), &BTreeMap::new());
        let row = &out.rows()[0];
        assert_eq!(row.columns().collect::<Vec<_>>(), vec!["player_id", "name"]);
        assert_eq!(row.get("player_id"), Some(&Scalar::from("2")));
    }

    #[test]
    fn empty_batch_passes_through() {
        let out = normalize_columns(Batch::default(), &BTreeMap::new());
        assert!(out.is_empty());
    }
}
