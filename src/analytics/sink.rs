//! Fire-and-forget exposure delivery.

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;

use crate::analytics::event::ExposureEvent;
use crate::config::AnalyticsConfig;
use crate::observability::metrics;
use crate::resilience::backoff::calculate_backoff;

/// Errors from a delivery attempt. Never surfaced to a client.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("analytics request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("analytics endpoint rejected event with {0}")]
    Rejected(StatusCode),
}

impl SinkError {
    fn is_retryable(&self) -> bool {
        match self {
            SinkError::Transport(_) => true,
            SinkError::Rejected(status) => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
        }
    }
}

/// Posts one JSON body per exposure event to the analytics endpoint.
#[derive(Clone)]
pub struct TrackingSink {
    client: reqwest::Client,
    config: Arc<AnalyticsConfig>,
}

impl TrackingSink {
    pub fn new(config: AnalyticsConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self::with_client(client, config))
    }

    pub fn with_client(client: reqwest::Client, config: AnalyticsConfig) -> Self {
        Self {
            client,
            config: Arc::new(config),
        }
    }

    /// Spawn delivery and return immediately.
    pub fn dispatch(&self, event: ExposureEvent) {
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                tracing::warn!(experiment = %event.experiment_key, "No runtime, exposure dropped");
                return;
            }
        };

        let sink = self.clone();
        handle.spawn(async move {
            if let Err(e) = sink.deliver(&event).await {
                tracing::warn!(
                    experiment = %event.experiment_key,
                    insert_id = %event.insert_id,
                    error = %e,
                    "Exposure delivery failed"
                );
            }
        });
    }

    /// Deliver one event, retrying transient failures with the same
    /// insert id.
    pub async fn deliver(&self, event: &ExposureEvent) -> Result<(), SinkError> {
        let body = event.payload(
            self.config.payload,
            self.config.token.as_deref(),
            &self.config.environment,
        );

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.post(&body).await {
                Ok(()) => {
                    metrics::record_exposure("delivered");
                    tracing::debug!(
                        experiment = %event.experiment_key,
                        variation = %event.variation_id,
                        attempt,
                        "Exposure delivered"
                    );
                    return Ok(());
                }
                Err(e) if attempt < self.config.max_attempts && e.is_retryable() => {
                    let delay = calculate_backoff(
                        attempt,
                        self.config.base_delay_ms,
                        self.config.max_delay_ms,
                    );
                    tracing::debug!(attempt, delay = ?delay, error = %e, "Retrying exposure");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    metrics::record_exposure("failed");
                    return Err(e);
                }
            }
        }
    }

    async fn post(&self, body: &serde_json::Value) -> Result<(), SinkError> {
        let response = self
            .client
            .post(&self.config.endpoint)
            .header(reqwest::header::ACCEPT, "text/plain")
            .json(body)
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(SinkError::Rejected(response.status()))
        }
    }
}
