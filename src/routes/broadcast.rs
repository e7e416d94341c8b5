use crate::{
    authorization::SharedSecret,
    broadcast::{run_broadcast, BroadcastError, BroadcastReport},
    configuration::BroadcastSettings,
    email_client::EmailClient,
    metrics::DeliveryMetrics,
    state::AppState,
    store::SubscriberStore,
};
use axum::{
    extract::State,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use http::StatusCode;
use sqlx::PgPool;
use std::sync::Arc;
use utoipa::ToSchema;

/// Create a router to serve endpoints.
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/", get(trigger_broadcast).post(trigger_broadcast))
        .route("/reset", post(reset_broadcast))
}

#[derive(Debug, serde::Serialize, ToSchema)]
pub struct BroadcastResponse {
    success: bool,
    #[serde(flatten)]
    report: BroadcastReport,
}

#[derive(Debug, serde::Serialize, ToSchema)]
pub struct ResetResponse {
    success: bool,
    reset: u64,
}

/// Run one broadcast pass over the pending subscribers.
///
/// Accepts both GET and POST so it can be called from a plain cron job.
#[tracing::instrument(
    name = "Trigger broadcast",
    skip(db_pool, email_client, settings, metrics)
)]
#[utoipa::path(
    get,
    path = "/broadcast",
    params(("secret" = Option<String>, Query, description = "Shared secret, when not sent as a bearer token")),
    responses(
        (status = OK, description = "Counts of the pass", body = BroadcastResponse),
        (status = UNAUTHORIZED, description = "Shared secret is missing or wrong"),
        (status = INTERNAL_SERVER_ERROR, description = "Subscribers could not be read or flagged"),
    )
)]
async fn trigger_broadcast(
    _secret: SharedSecret,
    State(db_pool): State<Arc<PgPool>>,
    State(email_client): State<Arc<EmailClient>>,
    State(settings): State<Arc<BroadcastSettings>>,
    State(metrics): State<Arc<DeliveryMetrics>>,
) -> Result<Json<BroadcastResponse>, BroadcastError> {
    let report = run_broadcast(&*db_pool, &email_client, &settings, &metrics).await?;

    Ok(Json(BroadcastResponse {
        success: true,
        report,
    }))
}

/// Clear every sent-flag so next year's broadcast reaches everyone again.
#[tracing::instrument(name = "Reset broadcast", skip(db_pool))]
#[utoipa::path(
    post,
    path = "/broadcast/reset",
    responses(
        (status = OK, description = "Amount of subscribers reset", body = ResetResponse),
        (status = UNAUTHORIZED, description = "Shared secret is missing or wrong"),
        (status = INTERNAL_SERVER_ERROR, description = "Sent-flags could not be reset"),
    )
)]
async fn reset_broadcast(
    _secret: SharedSecret,
    State(db_pool): State<Arc<PgPool>>,
) -> Result<Json<ResetResponse>, ResetError> {
    let reset = db_pool
        .reset_sent_flags()
        .await
        .map_err(ResetError::FailedToResetSentFlags)?;
    tracing::info!("Reset the sent-flag of {reset} subscribers");

    Ok(Json(ResetResponse {
        success: true,
        reset,
    }))
}

impl IntoResponse for BroadcastError {
    fn into_response(self) -> Response {
        tracing::error!(
            error.cause_chain = ?self,
            error.message = %self,
            "Broadcast failed"
        );
        (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()).into_response()
    }
}

#[derive(thiserror::Error)]
pub enum ResetError {
    #[error("Failed to reset the sent-flags")]
    FailedToResetSentFlags(#[source] sqlx::Error),
}

impl IntoResponse for ResetError {
    fn into_response(self) -> Response {
        tracing::error!(
            error.cause_chain = ?self,
            error.message = %self,
            "Reset failed"
        );
        (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()).into_response()
    }
}
