use crate::state::AppState;
use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use sqlx::PgPool;
use std::sync::Arc;
use utoipa::ToSchema;

/// Create a router to serve health checks.
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/", get(is_alive))
        .route("/status", get(status))
}

/// Simple `is_alive` endpoint that will always return a 200 OK.
/// Used to indicate when the webserver is up and running.
#[tracing::instrument]
#[utoipa::path(
    get,
    path = "/health",
    responses((status = OK, description = "Check if service is alive"))
)]
pub(crate) async fn is_alive() -> StatusCode {
    tracing::debug!("Service is alive");
    StatusCode::OK
}

#[derive(Debug, serde::Serialize, ToSchema)]
pub struct Status {
    db_connected: bool,
}

/// Status endpoint to whether the database can be reached.
#[tracing::instrument(skip(db_pool))]
#[utoipa::path(
    get,
    path = "/health/status",
    responses(
        (status = OK, description = "Current status of all dependent services", body = Status)
    )
)]
pub(crate) async fn status(State(db_pool): State<Arc<PgPool>>) -> Json<Status> {
    let db_connected = db_pool
        .acquire()
        .await
        .map_err(|e| {
            tracing::error!("{:?}", e);
            e
        })
        .is_ok();

    let status = Status { db_connected };
    tracing::info!("Status: {:?}", status);
    Json(status)
}
