use crate::state::AppState;
use axum::Router;

pub mod broadcast;
pub mod docs;
pub mod health;
pub mod subscriptions;

pub fn build_router(app_state: &AppState) -> Router {
    Router::new()
        .nest("/health", health::create_router().with_state(app_state.clone()))
        .nest(
            "/subscriptions",
            subscriptions::create_router().with_state(app_state.clone()),
        )
        .nest(
            "/broadcast",
            broadcast::create_router().with_state(app_state.clone()),
        )
        .nest(
            "/metrics",
            crate::metrics::create_router().with_state(app_state.clone()),
        )
        .nest("/docs", docs::create_router())
}
