// File publisher: pretty-printed JSON array on disk.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::{debug, info};
use whiteshorts_core::config::Backend;
use whiteshorts_core::Row;

use crate::{check_finite, PublishError, Publisher};

pub struct FilePublisher {
    path: PathBuf,
}

impl FilePublisher {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn io_error(&self, source: std::io::Error) -> PublishError {
        PublishError::Io {
            backend: Backend::File,
            path: self.path.display().to_string(),
            source,
        }
    }
}

#[async_trait]
impl Publisher for FilePublisher {
    fn backend(&self) -> Backend {
        Backend::File
    }

    async fn publish(&self, rows: &[Row]) -> Result<usize, PublishError> {
        if rows.is_empty() {
            debug!("no rows, leaving {} untouched", self.path.display());
            return Ok(0);
        }
        check_finite(Backend::File, rows)?;
        let body = serde_json::to_vec_pretty(rows).map_err(|e| PublishError::Serialize {
            backend: Backend::File,
            source: e,
        })?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_error(e))?;
        }
        tokio::fs::write(&self.path, body)
            .await
            .map_err(|e| self.io_error(e))?;

        info!("wrote {} rows to {}", rows.len(), self.path.display());
        Ok(rows.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use whiteshorts_core::Scalar;

    #[tokio::test]
    async fn writes_pretty_json_array() {
        let tmp = std::env::temp_dir().join("ws_file_pub_test_write");
        let _ = fs::remove_dir_all(&tmp);
        let path = tmp.join("nested/out.json");

        let rows: Vec<Row> = vec![
            [("team", Scalar::from("A")), ("elfies_number", Scalar::Float(2.5))]
                .into_iter()
                .collect(),
            [("team", Scalar::from("B")), ("elfies_number", Scalar::Null)]
                .into_iter()
                .collect(),
        ];
        let publisher = FilePublisher::new(path.clone());
        assert_eq!(publisher.publish(&rows).await.unwrap(), 2);

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("[\n"));
        let back: Vec<Row> = serde_json::from_str(&text).unwrap();
        assert_eq!(back, rows);

        let _ = fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn empty_batch_writes_nothing() {
        let tmp = std::env::temp_dir().join("ws_file_pub_test_empty");
        let _ = fs::remove_dir_all(&tmp);
        let path = tmp.join("out.json");

        let publisher = FilePublisher::new(path.clone());
        assert_eq!(publisher.publish(&[]).await.unwrap(), 0);
        assert!(!path.exists());
    }
}
