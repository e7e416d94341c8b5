use crate::routes::*;
use axum::{
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use http::{
    header::{self, ACCEPT},
    HeaderMap, StatusCode,
};
use utoipa::OpenApi;

/// Documentation for the service. Can be converted into JSON or YAML.
#[derive(OpenApi)]
#[openapi(
    paths(
        health::is_alive,
        health::status,
        subscriptions::subscribe,
        subscriptions::unsubscribe::unsubscribe,
        broadcast::trigger_broadcast,
        broadcast::reset_broadcast,
        crate::metrics::metrics_endpoint,
    ),
    components(schemas(
        health::Status,
        subscriptions::SubscribeResponse,
        broadcast::BroadcastResponse,
        broadcast::ResetResponse,
        crate::broadcast::BroadcastReport,
    ))
)]
struct ApiDoc;

pub fn create_router() -> Router {
    Router::new()
        .route("/openapi", get(serve_openapi_docs))
        .route("/openapi.json", get(serve_openapi_docs_as_json))
        .route("/openapi.yaml", get(serve_openapi_docs_as_yaml))
}

/// Serve OpenApi docs based on the `Accept` header.
#[tracing::instrument(skip(headers))]
pub async fn serve_openapi_docs(headers: HeaderMap) -> Response {
    match headers.get(ACCEPT).and_then(|x| x.to_str().ok()) {
        Some("application/yaml") => serve_openapi_docs_as_yaml().await,
        _ => serve_openapi_docs_as_json().await,
    }
}

/// Endpoint to serve OpenApi docs as JSON.
#[tracing::instrument]
pub async fn serve_openapi_docs_as_json() -> Response {
    with_content_type(ApiDoc::openapi().to_json(), "application/json")
}

/// Endpoint to serve OpenApi docs as YAML.
#[tracing::instrument]
pub async fn serve_openapi_docs_as_yaml() -> Response {
    with_content_type(ApiDoc::openapi().to_yaml(), "application/yaml")
}

fn with_content_type<E: std::fmt::Display>(
    document: Result<String, E>,
    content_type: &'static str,
) -> Response {
    match document {
        Ok(body) => ([(header::CONTENT_TYPE, content_type)], body).into_response(),
        Err(e) => {
            tracing::error!("Failed to serialize the OpenApi document: {e}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
