//! Record fetching client and the lookup wiring that feeds fetches through
//! an [`OperationController`].

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use lifecycle::{ControllerError, OperationController, OperationStatus};
use reqwest::{Client, StatusCode};
use shared::{
    domain::RecordId,
    error::{ApiError, ErrorCode},
    protocol::RecordPayload,
};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::debug;

/// Failure payload of a record fetch. Cloneable so it can flow through
/// controller state snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("record request failed: {0}")]
    Transport(String),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("invalid record payload from server: {0}")]
    InvalidPayload(String),
}

#[async_trait]
pub trait RecordSource: Send + Sync {
    async fn fetch_record(&self, record_id: RecordId) -> Result<RecordPayload, FetchError>;
}

pub struct MissingRecordSource;

#[async_trait]
impl RecordSource for MissingRecordSource {
    async fn fetch_record(&self, record_id: RecordId) -> Result<RecordPayload, FetchError> {
        Err(FetchError::Transport(format!(
            "no record source configured; cannot fetch record {record_id}"
        )))
    }
}

pub struct HttpRecordSource {
    http: Client,
    server_url: String,
    artificial_delay: Option<Duration>,
}

impl HttpRecordSource {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            server_url: server_url.into(),
            artificial_delay: None,
        }
    }

    /// Delays every request, mainly so demo consumers get an observable
    /// pending phase against fast local servers.
    pub fn with_artificial_delay(mut self, delay: Duration) -> Self {
        self.artificial_delay = Some(delay);
        self
    }
}

#[async_trait]
impl RecordSource for HttpRecordSource {
    async fn fetch_record(&self, record_id: RecordId) -> Result<RecordPayload, FetchError> {
        if let Some(delay) = self.artificial_delay {
            tokio::time::sleep(delay).await;
        }

        let response = self
            .http
            .get(format!("{}/records/{}", self.server_url, record_id))
            .send()
            .await
            .map_err(|err| FetchError::Transport(err.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            let api_error = response.json::<ApiError>().await.unwrap_or_else(|_| {
                ApiError::new(
                    ErrorCode::NotFound,
                    format!("no record with id {record_id}"),
                )
            });
            return Err(FetchError::Api(api_error));
        }
        if !status.is_success() {
            return Err(FetchError::Transport(format!(
                "server returned status {status} for record {record_id}"
            )));
        }

        response
            .json::<RecordPayload>()
            .await
            .map_err(|err| FetchError::InvalidPayload(err.to_string()))
    }
}

/// Consumer-side wiring: one record source plus the controller that owns the
/// fetch lifecycle. Seeded `Pending` when a record id is already known at
/// construction, `Idle` otherwise.
pub struct RecordLookup {
    source: Arc<dyn RecordSource>,
    controller: Arc<OperationController<RecordPayload, FetchError>>,
}

impl RecordLookup {
    pub fn new(source: Arc<dyn RecordSource>, initial_record: Option<RecordId>) -> Self {
        let seed = if initial_record.is_some() {
            OperationStatus::Pending
        } else {
            OperationStatus::Idle
        };
        Self {
            source,
            controller: OperationController::new(seed),
        }
    }

    pub fn controller(&self) -> &Arc<OperationController<RecordPayload, FetchError>> {
        &self.controller
    }

    /// Starts fetching `record_id` through the controller.
    pub async fn submit(&self, record_id: RecordId) -> Result<JoinHandle<()>, ControllerError> {
        debug!(record_id = record_id.0, "submitting record fetch");
        let source = Arc::clone(&self.source);
        self.controller
            .track(async move { source.fetch_record(record_id).await })
            .await
    }

    /// Must be called exactly once when the owning consumer is retired.
    pub async fn dispose(&self) {
        self.controller.dispose().await;
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
