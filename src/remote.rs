//! Client for a remote aggregation endpoint
//!
//! Posts each batch as a JSON array of events and decodes the raw-count summary the
//! endpoint answers with. Timeouts are enforced by the scheduler, per call; this client
//! only reports transport, status and decoding failures. Nothing is retried.

use crate::error::{AnalysisError, RemoteCallError};
use crate::models::BatchSummary;
use crate::scheduler::{Batch, BatchAnalyzer};
use crate::wire::{ErrorBody, WireSummary};
use async_trait::async_trait;
use tracing::debug;

pub struct RemoteAnalyzer {
    client: reqwest::Client,
    endpoint: String,
}

impl RemoteAnalyzer {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), endpoint)
    }

    pub fn with_client(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl BatchAnalyzer for RemoteAnalyzer {
    fn name(&self) -> &str {
        "remote"
    }

    async fn analyze_batch(&self, batch: Batch) -> Result<BatchSummary, AnalysisError> {
        debug!(
            endpoint = %self.endpoint,
            batch_index = batch.index,
            records = batch.events.len(),
            "Submitting batch"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .json(&batch.events)
            .send()
            .await
            .map_err(|e| RemoteCallError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let fallback = status.canonical_reason().unwrap_or("unknown status").to_string();
            let message = match response.json::<ErrorBody>().await {
                Ok(body) => body.error,
                Err(_) => fallback,
            };
            return Err(RemoteCallError::Status {
                status: status.as_u16(),
                message,
            }
            .into());
        }

        let wire: WireSummary = response
            .json()
            .await
            .map_err(|e| RemoteCallError::Decode(e.to_string()))?;

        Ok(BatchSummary::from(wire))
    }
}
