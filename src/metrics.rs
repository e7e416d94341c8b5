use crate::state::AppState;
use anyhow::Context;
use axum::{
    extract::State,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use http::StatusCode;
use prometheus::{Encoder, IntCounter, Registry, TextEncoder};
use std::sync::Arc;

/// Counters describing email delivery, exposed in the Prometheus text format.
#[derive(Clone)]
pub struct DeliveryMetrics {
    registry: Registry,
    emails_sent: IntCounter,
    emails_failed: IntCounter,
    broadcast_runs: IntCounter,
}

impl DeliveryMetrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let emails_sent = IntCounter::new("emails_sent_total", "Broadcast emails delivered")
            .context("Failed to create `emails_sent_total` counter")?;
        registry
            .register(Box::new(emails_sent.clone()))
            .context("Failed to register `emails_sent_total` metric")?;

        let emails_failed = IntCounter::new(
            "emails_failed_total",
            "Broadcast emails the provider did not accept",
        )
        .context("Failed to create `emails_failed_total` counter")?;
        registry
            .register(Box::new(emails_failed.clone()))
            .context("Failed to register `emails_failed_total` metric")?;

        let broadcast_runs = IntCounter::new("broadcast_runs_total", "Completed broadcast passes")
            .context("Failed to create `broadcast_runs_total` counter")?;
        registry
            .register(Box::new(broadcast_runs.clone()))
            .context("Failed to register `broadcast_runs_total` metric")?;

        Ok(Self {
            registry,
            emails_sent,
            emails_failed,
            broadcast_runs,
        })
    }

    pub fn record_sent(&self) {
        self.emails_sent.inc();
    }

    pub fn record_failed(&self) {
        self.emails_failed.inc();
    }

    pub fn record_run(&self) {
        self.broadcast_runs.inc();
    }

    /// Render all registered metrics.
    pub fn encode(&self) -> anyhow::Result<String> {
        let mut buffer = vec![];
        let encoder = TextEncoder::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .context("Failed to encode metrics")?;

        String::from_utf8(buffer).context("Failed to convert metrics to a valid string")
    }
}

impl std::fmt::Debug for DeliveryMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryMetrics")
            .field("emails_sent", &self.emails_sent.get())
            .field("emails_failed", &self.emails_failed.get())
            .field("broadcast_runs", &self.broadcast_runs.get())
            .finish()
    }
}

pub fn create_router() -> Router<AppState> {
    Router::new().route("/", get(metrics_endpoint))
}

#[tracing::instrument(skip(metrics))]
#[utoipa::path(
    get,
    path = "/metrics",
    responses((status = OK, description = "Delivery metrics in the Prometheus text format"))
)]
pub(crate) async fn metrics_endpoint(
    State(metrics): State<Arc<DeliveryMetrics>>,
) -> Result<String, MetricsError> {
    metrics.encode().map_err(MetricsError::UnexpectedError)
}

#[derive(thiserror::Error)]
pub enum MetricsError {
    #[error("Unexpected error when generating metrics")]
    UnexpectedError(#[source] anyhow::Error),
}

impl IntoResponse for MetricsError {
    fn into_response(self) -> Response {
        (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()).into_response()
    }
}
