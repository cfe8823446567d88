//! REST client for the tripsync document store.

use std::time::Duration;

use async_trait::async_trait;
use log::{debug, error, info, warn};
use rand::Rng;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tripsync_core::sync::{
    backoff_millis, notification_stream, NotificationStream, RemoteStore, StoreNotification,
};
use tripsync_core::{DocumentPath, StoreError};

use crate::error::{ApiRetryClass, DocumentStoreError, Result};
use crate::types::*;

pub const DEFAULT_STORE_URL: &str = "http://127.0.0.1:8787";
const ENV_STORE_URL: &str = "TRIPSYNC_STORE_URL";

/// Default timeout for API requests.
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_LONG_POLL_SECS: u64 = 25;
const MAX_LOG_BODY_CHARS: usize = 512;
/// Consecutive retryable failures after which the change feed gives up.
const MAX_FEED_FAILURES: u32 = 8;

fn backoff_with_jitter(consecutive_failures: u32) -> Duration {
    let backoff = backoff_millis(consecutive_failures);
    let jitter = rand::thread_rng().gen_range(0..=(backoff / 5).max(1));
    Duration::from_millis(backoff.saturating_add(jitter))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentClientConfig {
    pub base_url: String,
    pub document_path: DocumentPath,
    pub request_timeout: Duration,
    pub long_poll_timeout: Duration,
}

impl DocumentClientConfig {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            document_path: DocumentPath::default(),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            long_poll_timeout: Duration::from_secs(DEFAULT_LONG_POLL_SECS),
        }
    }

    /// Base URL from `TRIPSYNC_STORE_URL`, falling back to the local default.
    pub fn from_env() -> Self {
        let base_url = std::env::var(ENV_STORE_URL)
            .ok()
            .map(|v| v.trim().trim_end_matches('/').to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_STORE_URL.to_string());
        Self::new(&base_url)
    }

    pub fn with_document_path(mut self, document_path: DocumentPath) -> Self {
        self.document_path = document_path;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_long_poll_timeout(mut self, timeout: Duration) -> Self {
        self.long_poll_timeout = timeout;
        self
    }
}

/// Client for one document on the tripsync document server.
#[derive(Debug, Clone)]
pub struct DocumentStoreClient {
    client: reqwest::Client,
    config: DocumentClientConfig,
}

impl DocumentStoreClient {
    pub fn new(config: DocumentClientConfig) -> Result<Self> {
        if config.base_url.is_empty() {
            return Err(DocumentStoreError::invalid_request("base URL is empty"));
        }
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &DocumentClientConfig {
        &self.config
    }

    fn document_url(&self) -> String {
        format!(
            "{}/api/v1/documents/{}/{}",
            self.config.base_url,
            self.config.document_path.collection(),
            self.config.document_path.document()
        )
    }

    fn log_response(status: reqwest::StatusCode, body: &str) {
        if status.is_success() {
            debug!("[DocumentStore] Response status: {}", status);
            return;
        }

        let mut preview = body.chars().take(MAX_LOG_BODY_CHARS).collect::<String>();
        if body.chars().count() > MAX_LOG_BODY_CHARS {
            preview.push_str("...");
        }
        debug!("[DocumentStore] Response error ({}): {}", status, preview);
    }

    /// Parse a JSON response body.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T> {
        let status = response.status();
        let body = response.text().await?;
        Self::log_response(status, &body);

        if !status.is_success() {
            if let Ok(error) = serde_json::from_str::<ApiErrorResponse>(&body) {
                return Err(DocumentStoreError::api(
                    status.as_u16(),
                    format!("{}: {}", error.code, error.message),
                ));
            }
            return Err(DocumentStoreError::api(
                status.as_u16(),
                format!("Request failed: {}", body),
            ));
        }

        serde_json::from_str(&body).map_err(|e| {
            error!("[DocumentStore] Failed to deserialize response: {}", e);
            DocumentStoreError::from(e)
        })
    }

    /// Point read. `None` when the server has no such document.
    ///
    /// GET /api/v1/documents/{collection}/{document}
    pub async fn get_document(&self) -> Result<Option<DocumentEnvelope>> {
        let response = self.client.get(self.document_url()).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Self::parse_response(response).await.map(Some)
    }

    /// Full overwrite.
    ///
    /// PUT /api/v1/documents/{collection}/{document}
    pub async fn put_document(&self, document: &Value) -> Result<WriteAck> {
        if !document.is_object() {
            return Err(DocumentStoreError::invalid_request(
                "document must be a JSON object",
            ));
        }
        let response = self
            .client
            .put(self.document_url())
            .json(document)
            .send()
            .await?;
        Self::parse_response(response).await
    }

    /// Long-polls for a version newer than `after`.
    ///
    /// GET /api/v1/documents/{collection}/{document}/changes?after=&timeoutMs=
    pub async fn wait_for_change(&self, after: u64) -> Result<ChangeResponse> {
        let url = format!("{}/changes", self.document_url());
        let timeout_ms = self.config.long_poll_timeout.as_millis().to_string();
        let query = [("after", after.to_string()), ("timeoutMs", timeout_ms)];
        let response = self
            .client
            .get(&url)
            .query(&query)
            .timeout(self.config.long_poll_timeout + self.config.request_timeout)
            .send()
            .await?;
        Self::parse_response(response).await
    }

    async fn run_change_feed(
        self,
        mut version: u64,
        tx: mpsc::UnboundedSender<std::result::Result<StoreNotification, StoreError>>,
    ) {
        let mut failures: u32 = 0;
        while !tx.is_closed() {
            match self.wait_for_change(version).await {
                Ok(change) => {
                    failures = 0;
                    if !change.changed || change.version == version {
                        continue;
                    }
                    if change.version < version {
                        warn!(
                            "[DocumentStore] Server version went back from {} to {}, resetting cursor",
                            version, change.version
                        );
                    }
                    version = change.version;
                    debug!("[DocumentStore] Change feed now at version {}", version);
                    if tx
                        .send(Ok(StoreNotification::confirmed(change.document)))
                        .is_err()
                    {
                        break;
                    }
                }
                Err(err) if err.retry_class() == ApiRetryClass::Retryable => {
                    failures += 1;
                    if failures > MAX_FEED_FAILURES {
                        error!("[DocumentStore] Change feed giving up: {}", err);
                        let _ = tx.send(Err(err.into()));
                        break;
                    }
                    let delay = backoff_with_jitter(failures);
                    match err.status_code() {
                        Some(status) => warn!(
                            "[DocumentStore] Change feed got HTTP {} (attempt {}), retrying in {:?}",
                            status, failures, delay
                        ),
                        None => warn!(
                            "[DocumentStore] Change feed error (attempt {}), retrying in {:?}: {}",
                            failures, delay, err
                        ),
                    }
                    sleep(delay).await;
                }
                Err(err) => {
                    error!("[DocumentStore] Change feed failed: {}", err);
                    let _ = tx.send(Err(err.into()));
                    break;
                }
            }
        }
        debug!("[DocumentStore] Change feed stopped");
    }
}

#[async_trait]
impl RemoteStore for DocumentStoreClient {
    async fn set(&self, document: Value) -> std::result::Result<(), StoreError> {
        let ack = self.put_document(&document).await?;
        debug!(
            "[DocumentStore] Wrote {} (version {}, lastUpdated {:?})",
            ack.path, ack.version, ack.last_updated
        );
        Ok(())
    }

    async fn get(&self) -> std::result::Result<Option<Value>, StoreError> {
        Ok(self.get_document().await?.map(|envelope| envelope.document))
    }

    async fn subscribe(&self) -> std::result::Result<NotificationStream, StoreError> {
        let current = self
            .get_document()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        let version = current.as_ref().map(|c| c.version).unwrap_or(0);
        info!(
            "[DocumentStore] Subscribed to {} at version {}",
            self.config.document_path, version
        );

        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(Ok(StoreNotification::confirmed(
            current.map(|envelope| envelope.document),
        )));
        tokio::spawn(self.clone().run_change_feed(version, tx));
        Ok(notification_stream(rx))
    }
}
