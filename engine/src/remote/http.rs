//! JSON-over-HTTP transport for sync batches.
//!
//! `POST {base}/sync` with a [`SyncBatchRequest`]; any 2xx is a confirmation,
//! 4xx a rejection, everything else (including connection failures) a
//! retryable transport error.

use super::RemoteSyncClient;
use crate::{error::Result, Cart, Error, PendingMutation};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Body of a sync request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncBatchRequest {
    /// Identifies whose cart the batch applies to
    pub client_id: String,
    /// Mutations to apply, oldest first
    pub mutations: Vec<PendingMutation>,
}

/// Body of a successful sync response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncBatchResponse {
    /// Mutations applied by this request
    pub accepted: usize,
    /// Mutations skipped because they were applied before
    pub duplicates: usize,
    /// Authoritative cart after the batch
    pub cart: Cart,
}

/// Body of an error response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// HTTP implementation of [`RemoteSyncClient`].
#[derive(Debug, Clone)]
pub struct HttpSyncClient {
    http: reqwest::Client,
    endpoint: String,
    client_id: String,
}

impl HttpSyncClient {
    /// Client for the server at `base_url` (e.g. `http://localhost:3000`).
    pub fn new(base_url: &str, client_id: impl Into<String>) -> Result<Self> {
        Self::with_timeout(base_url, client_id, Duration::from_secs(10))
    }

    pub fn with_timeout(
        base_url: &str,
        client_id: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Unreachable(e.to_string()))?;

        Ok(Self {
            http,
            endpoint: format!("{}/sync", base_url.trim_end_matches('/')),
            client_id: client_id.into(),
        })
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Send a batch and return the server's view of the cart.
    pub async fn send(&self, batch: &[PendingMutation]) -> Result<SyncBatchResponse> {
        let request = SyncBatchRequest {
            client_id: self.client_id.clone(),
            mutations: batch.to_vec(),
        };

        let response = self
            .http
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Unreachable(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<SyncBatchResponse>()
                .await
                .map_err(|e| Error::Unreachable(format!("malformed response: {e}")));
        }

        let message = match response.json::<ErrorBody>().await {
            Ok(body) => body.error,
            Err(_) => status.to_string(),
        };

        if status.is_client_error() {
            Err(Error::Remote(message))
        } else {
            Err(Error::Unreachable(message))
        }
    }
}

#[async_trait]
impl RemoteSyncClient for HttpSyncClient {
    async fn sync_batch(&self, batch: &[PendingMutation]) -> Result<()> {
        let response = self.send(batch).await?;
        tracing::debug!(
            accepted = response.accepted,
            duplicates = response.duplicates,
            "Remote confirmed batch"
        );
        Ok(())
    }
}
