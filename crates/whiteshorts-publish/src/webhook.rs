// Webhook publisher: POST the payload as a JSON array.

use std::collections::BTreeMap;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::{debug, info, warn};
use whiteshorts_core::config::{Backend, WebhookConfig};
use whiteshorts_core::Row;

use crate::{http_client, json_payload, PublishError, Publisher};

/// `Content-Type: application/json` plus the configured headers. Names are
/// case-insensitive and a configured header replaces the default.
pub fn merged_headers(custom: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    let mut headers = BTreeMap::new();
    headers.insert("content-type".to_string(), "application/json".to_string());
    for (name, value) in custom {
        headers.insert(name.trim().to_ascii_lowercase(), value.clone());
    }
    headers
}

fn header_map(custom: &BTreeMap<String, String>) -> Result<HeaderMap, PublishError> {
    let mut map = HeaderMap::new();
    for (name, value) in merged_headers(custom) {
        let invalid = || PublishError::InvalidHeader {
            backend: Backend::Webhook,
            name: name.clone(),
        };
        let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| invalid())?;
        let header_value = HeaderValue::from_str(&value).map_err(|_| invalid())?;
        map.insert(header_name, header_value);
    }
    Ok(map)
}

pub struct WebhookPublisher {
    http: reqwest::Client,
    url: String,
    headers: HeaderMap,
}

impl WebhookPublisher {
    pub fn new(config: WebhookConfig, timeout_secs: u64) -> Result<Self, PublishError> {
        Ok(Self {
            http: http_client(Backend::Webhook, timeout_secs)?,
            headers: header_map(&config.headers)?,
            url: config.url,
        })
    }
}

#[async_trait]
impl Publisher for WebhookPublisher {
    fn backend(&self) -> Backend {
        Backend::Webhook
    }

    async fn publish(&self, rows: &[Row]) -> Result<usize, PublishError> {
        if rows.is_empty() {
            debug!("no rows to post to webhook");
            return Ok(0);
        }
        let body = json_payload(Backend::Webhook, rows)?;

        let response = self
            .http
            .post(&self.url)
            .headers(self.headers.clone())
            .body(body)
            .send()
            .await
            .map_err(|e| PublishError::Http {
                backend: Backend::Webhook,
                source: e,
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("webhook responded {status}");
            return Err(PublishError::Status {
                backend: Backend::Webhook,
                status: status.as_u16(),
                body,
            });
        }

        info!("posted {} rows to webhook", rows.len());
        Ok(rows.len())
    }
}
