// Local SQLite mirror of the REST upsert.
//
// Each row is stored as its JSON payload under a key built from the upsert
// columns, so re-publishing the same (date, player_id, target) replaces the
// earlier row just as the REST backend's merge-duplicates does.

use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use rusqlite::{params, Connection};
use tracing::{debug, info};
use whiteshorts_core::config::Backend;
use whiteshorts_core::{Row, Scalar};

use crate::{check_finite, PublishError, Publisher};

fn sqlite_error(source: rusqlite::Error) -> PublishError {
    PublishError::Sqlite {
        backend: Backend::Sqlite,
        source,
    }
}

fn serialize_error(source: serde_json::Error) -> PublishError {
    PublishError::Serialize {
        backend: Backend::Sqlite,
        source,
    }
}

/// Double-quote an identifier for use in SQL text.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

static NULL: Scalar = Scalar::Null;

/// JSON array of the key columns' values; absent columns count as null.
pub fn row_key(row: &Row, upsert_on: &[String]) -> Result<String, serde_json::Error> {
    let values: Vec<&Scalar> = upsert_on
        .iter()
        .map(|c| row.get(c).unwrap_or(&NULL))
        .collect();
    serde_json::to_string(&values)
}

/// SQLite-backed publisher keyed by the composite upsert key.
pub struct SqlitePublisher {
    conn: Mutex<Connection>,
    table: String,
    upsert_on: Vec<String>,
}

impl SqlitePublisher {
    /// Open (or create) the database at `path` and ensure `table` exists.
    /// Pass `":memory:"` for an ephemeral database.
    pub fn open(path: &str, table: &str, upsert_on: Vec<String>) -> Result<Self, PublishError> {
        let conn = Connection::open(path).map_err(sqlite_error)?;
        conn.execute_batch("PRAGMA busy_timeout = 5000;")
            .map_err(sqlite_error)?;
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {} (
                row_key      TEXT PRIMARY KEY,
                payload      TEXT NOT NULL,
                published_at TEXT NOT NULL
            );",
            quote_ident(table)
        ))
        .map_err(sqlite_error)?;

        Ok(Self {
            conn: Mutex::new(conn),
            table: table.to_string(),
            upsert_on,
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Upsert every row in one transaction.
    fn upsert(&self, rows: &[Row]) -> Result<usize, PublishError> {
        let published_at = chrono::Utc::now().to_rfc3339();
        let sql = format!(
            "INSERT OR REPLACE INTO {} (row_key, payload, published_at) VALUES (?1, ?2, ?3)",
            quote_ident(&self.table)
        );

        let mut conn = self.conn();
        let tx = conn.transaction().map_err(sqlite_error)?;
        {
            let mut stmt = tx.prepare(&sql).map_err(sqlite_error)?;
            for row in rows {
                let key = row_key(row, &self.upsert_on).map_err(serialize_error)?;
                let payload = serde_json::to_string(row).map_err(serialize_error)?;
                stmt.execute(params![key, payload, published_at])
                    .map_err(sqlite_error)?;
            }
        }
        tx.commit().map_err(sqlite_error)?;
        Ok(rows.len())
    }

    /// Every stored row, ordered by key.
    pub fn load_rows(&self) -> Result<Vec<Row>, PublishError> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT payload FROM {} ORDER BY row_key",
                quote_ident(&self.table)
            ))
            .map_err(sqlite_error)?;
        let payloads = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(sqlite_error)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(sqlite_error)?;

        payloads
            .iter()
            .map(|p| serde_json::from_str(p).map_err(serialize_error))
            .collect()
    }
}

#[async_trait]
impl Publisher for SqlitePublisher {
    fn backend(&self) -> Backend {
        Backend::Sqlite
    }

    async fn publish(&self, rows: &[Row]) -> Result<usize, PublishError> {
        if rows.is_empty() {
            debug!("no rows to store in {}", self.table);
            return Ok(0);
        }
        check_finite(Backend::Sqlite, rows)?;
        let stored = self.upsert(rows)?;
        info!("stored {} rows in sqlite table {}", stored, self.table);
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys() -> Vec<String> {
        vec!["date".into(), "player_id".into(), "target".into()]
    }

    fn test_publisher() -> SqlitePublisher {
        SqlitePublisher::open(":memory:", "broadcast_rows", keys()).expect("in-memory database should open")
    }

    fn prediction(player_id: &str, elfies: f64) -> Row {
        [
            ("date", Scalar::from("2025-10-07")),
            ("player_id", Scalar::from(player_id)),
            ("target", Scalar::from("goals")),
            ("elfies_number", Scalar::Float(elfies)),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn row_key_is_json_of_key_values() {
        let row = prediction("123", 1.0);
        assert_eq!(row_key(&row, &keys()).unwrap(), r#"["2025-10-07","123","goals"]"#);
        let partial: Row = [("date", "2025-10-07")].into_iter().collect();
        assert_eq!(row_key(&partial, &keys()).unwrap(), r#"["2025-10-07",null,null]"#);
    }

    #[tokio::test]
    async fn republishing_same_key_replaces() {
        let publisher = test_publisher();
        publisher
            .publish(&[prediction("1", 1.0), prediction("2", 2.0)])
            .await
            .unwrap();
        publisher.publish(&[prediction("1", 9.5)]).await.unwrap();

        let stored = publisher.load_rows().unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].get("elfies_number"), Some(&Scalar::Float(9.5)));
        assert_eq!(stored[1].get("player_id"), Some(&Scalar::from("2")));
    }

    #[tokio::test]
    async fn empty_and_non_finite_batches() {
        let publisher = test_publisher();
        assert_eq!(publisher.publish(&[]).await.unwrap(), 0);

        let err = publisher
            .publish(&[prediction("1", f64::NAN)])
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::NonFinite { .. }));
        assert!(publisher.load_rows().unwrap().is_empty());
    }

    #[test]
    fn table_name_is_quoted() {
        assert_eq!(quote_ident("broadcast_rows"), "\"broadcast_rows\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }
}
