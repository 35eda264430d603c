// Publishers: hand a processed batch to its sink (REST upsert, webhook,
// JSON file or a local SQLite mirror).

pub mod file;
pub mod rest;
pub mod sqlite;
pub mod webhook;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;
use whiteshorts_core::config::{Backend, BroadcastConfig, PipelineConfig, PublishConfig};
use whiteshorts_core::{Batch, Row};

pub use file::FilePublisher;
pub use rest::RestPublisher;
pub use sqlite::SqlitePublisher;
pub use webhook::WebhookPublisher;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("{backend}: HTTP request failed: {source}")]
    Http {
        backend: Backend,
        source: reqwest::Error,
    },

    #[error("{backend}: server returned {status}: {body}")]
    Status {
        backend: Backend,
        status: u16,
        body: String,
    },

    #[error("{backend}: invalid header `{name}`")]
    InvalidHeader { backend: Backend, name: String },

    #[error("{backend}: failed to write {path}: {source}")]
    Io {
        backend: Backend,
        path: String,
        source: std::io::Error,
    },

    #[error("{backend}: failed to serialize payload: {source}")]
    Serialize {
        backend: Backend,
        source: serde_json::Error,
    },

    #[error("{backend}: row {index} holds a non-finite value in `{column}`")]
    NonFinite {
        backend: Backend,
        index: usize,
        column: String,
    },

    #[error("{backend}: sqlite error: {source}")]
    Sqlite {
        backend: Backend,
        source: rusqlite::Error,
    },
}

// ---------------------------------------------------------------------------
// Publisher trait
// ---------------------------------------------------------------------------

/// A sink for processed rows.
#[async_trait]
pub trait Publisher: Send + Sync {
    fn backend(&self) -> Backend;

    /// Deliver `rows`, returning how many were sent. An empty slice is a
    /// no-op that returns 0 without touching the sink.
    async fn publish(&self, rows: &[Row]) -> Result<usize, PublishError>;
}

/// Refuse rows holding NaN or an infinity. serde_json would silently write
/// those as `null`, which hides a pipeline defect.
pub fn check_finite(backend: Backend, rows: &[Row]) -> Result<(), PublishError> {
    for (index, row) in rows.iter().enumerate() {
        if let Some((column, _)) = row.iter().find(|(_, v)| v.is_non_finite()) {
            return Err(PublishError::NonFinite {
                backend,
                index,
                column: column.to_string(),
            });
        }
    }
    Ok(())
}

/// Compact JSON array body for HTTP publishers.
pub fn json_payload(backend: Backend, rows: &[Row]) -> Result<Vec<u8>, PublishError> {
    check_finite(backend, rows)?;
    serde_json::to_vec(rows).map_err(|e| PublishError::Serialize { backend, source: e })
}

pub(crate) fn http_client(backend: Backend, timeout_secs: u64) -> Result<reqwest::Client, PublishError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| PublishError::Http { backend, source: e })
}

// ---------------------------------------------------------------------------
// Orchestration
// ---------------------------------------------------------------------------

/// Build the publisher selected by `config.backend`.
pub fn build_publisher(config: &PublishConfig) -> Result<Box<dyn Publisher>, PublishError> {
    let publisher: Box<dyn Publisher> = match config.backend {
        Backend::Supabase => Box::new(RestPublisher::new(
            config.rest.clone(),
            config.upsert_on.clone(),
            config.timeout_secs,
        )?),
        Backend::Webhook => Box::new(WebhookPublisher::new(config.webhook.clone(), config.timeout_secs)?),
        Backend::File => Box::new(FilePublisher::new(config.file.path.clone())),
        Backend::Sqlite => Box::new(SqlitePublisher::open(
            &config.sqlite.path,
            &config.sqlite.table,
            config.upsert_on.clone(),
        )?),
    };
    Ok(publisher)
}

/// Run the pipeline over `batch` and publish the result through `publisher`.
/// Returns the processed batch.
pub async fn publish_with(
    batch: Batch,
    pipeline: &PipelineConfig,
    publisher: &dyn Publisher,
) -> Result<Batch, PublishError> {
    let output = whiteshorts_broadcast::run(batch, pipeline);
    let sent = publisher.publish(output.batch.rows()).await?;
    info!(
        "published {} of {} processed rows via {}",
        sent,
        output.batch.len(),
        publisher.backend()
    );
    Ok(output.batch)
}

/// Run the pipeline and publish through the configured backend.
pub async fn publish_results(batch: Batch, config: &BroadcastConfig) -> Result<Batch, PublishError> {
    let publisher = build_publisher(&config.publish)?;
    publish_with(batch, &config.pipeline, publisher.as_ref()).await
}
