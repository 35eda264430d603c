// Supabase / PostgREST bulk upsert.

use async_trait::async_trait;
use tracing::{debug, info, warn};
use whiteshorts_core::config::{Backend, RestConfig};
use whiteshorts_core::Row;

use crate::{http_client, json_payload, PublishError, Publisher};

/// Merge on conflict and echo the stored rows back.
const PREFER: &str = "resolution=merge-duplicates,return=representation";

/// `{url}/rest/v1/{table}?on_conflict=k1,k2,...`
pub fn upsert_url(base_url: &str, table: &str, upsert_on: &[String]) -> String {
    format!(
        "{}/rest/v1/{}?on_conflict={}",
        base_url.trim_end_matches('/'),
        table,
        upsert_on.join(",")
    )
}

/// Headers sent with every upsert.
pub fn upsert_headers(key: &str) -> Vec<(&'static str, String)> {
    vec![
        ("apikey", key.to_string()),
        ("Authorization", format!("Bearer {key}")),
        ("Content-Type", "application/json".to_string()),
        ("Prefer", PREFER.to_string()),
    ]
}

pub struct RestPublisher {
    http: reqwest::Client,
    config: RestConfig,
    upsert_on: Vec<String>,
}

impl RestPublisher {
    pub fn new(config: RestConfig, upsert_on: Vec<String>, timeout_secs: u64) -> Result<Self, PublishError> {
        Ok(Self {
            http: http_client(Backend::Supabase, timeout_secs)?,
            config,
            upsert_on,
        })
    }

    pub fn url(&self) -> String {
        upsert_url(&self.config.url, &self.config.table, &self.upsert_on)
    }
}

#[async_trait]
impl Publisher for RestPublisher {
    fn backend(&self) -> Backend {
        Backend::Supabase
    }

    async fn publish(&self, rows: &[Row]) -> Result<usize, PublishError> {
        if rows.is_empty() {
            debug!("no rows to upsert into {}", self.config.table);
            return Ok(0);
        }
        let body = json_payload(Backend::Supabase, rows)?;

        let mut request = self.http.post(self.url());
        for (name, value) in upsert_headers(&self.config.key) {
            request = request.header(name, value);
        }
        let response = request
            .body(body)
            .send()
            .await
            .map_err(|e| PublishError::Http {
                backend: Backend::Supabase,
                source: e,
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("upsert into {} failed with {status}", self.config.table);
            return Err(PublishError::Status {
                backend: Backend::Supabase,
                status: status.as_u16(),
                body,
            });
        }

        info!("upserted {} rows into {}", rows.len(), self.config.table);
        Ok(rows.len())
    }
}
