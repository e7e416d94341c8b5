pub mod authorization;
pub mod broadcast;
mod broadcast_worker;
pub mod configuration;
pub mod domain;
pub mod email_client;
mod error;
pub mod metrics;
mod routes;
mod state;
pub mod store;
pub mod telemetry;

use anyhow::Context;
use axum::{body::Body, routing::IntoMakeService, Router, Server};
use configuration::{DatabaseSettings, Settings};
use email_client::EmailClient;
use http::Request;
use hyper::server::conn::AddrIncoming;
use metrics::DeliveryMetrics;
use sqlx::{postgres::PgPoolOptions, PgPool};
use state::AppState;
use std::{net::TcpListener, time::Duration};

/// The running service: the HTTP server and, when configured, the scheduled
/// broadcast.
pub struct App {
    port: u16,
    server: Server<AddrIncoming, IntoMakeService<Router>>,
    app_state: AppState,
    broadcast_interval: Option<Duration>,
}

impl App {
    /// Bind the configured address and wire every dependency of the app.
    pub fn build(config: Settings) -> anyhow::Result<Self> {
        config
            .broadcast
            .validate()
            .map_err(|e| anyhow::anyhow!(e))
            .context("Invalid broadcast settings")?;

        let listener = TcpListener::bind(config.application.address())
            .context("Failed to bind the application address")?;
        let port = listener.local_addr()?.port();

        let db_pool = get_connection_pool(&config.database);
        let email_client = EmailClient::try_from(&config.email_client)
            .map_err(|e| anyhow::anyhow!(e))
            .context("Failed to create email client")?;
        let metrics = DeliveryMetrics::new()?;
        let broadcast_interval = config.broadcast.schedule_interval();

        let app_state = AppState::create(db_pool, email_client, config.broadcast, metrics);
        let router = Self::build_router(&app_state);

        tracing::info!("Server running at {}", listener.local_addr()?);
        let server = Server::from_tcp(listener)?.serve(router.into_make_service());

        Ok(Self {
            port,
            server,
            app_state,
            broadcast_interval,
        })
    }

    /// The port the server listens on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Serve requests until the server fails, running the scheduled broadcast
    /// next to it when an interval is configured.
    pub async fn run_until_stopped(self) -> anyhow::Result<()> {
        match self.broadcast_interval {
            Some(interval) => {
                let app_state = self.app_state;
                let worker = broadcast_worker::worker_loop(
                    &**app_state.db_pool(),
                    app_state.email_client(),
                    app_state.broadcast_settings(),
                    app_state.metrics(),
                    interval,
                );
                tokio::select! {
                    outcome = self.server => outcome?,
                    outcome = worker => outcome?,
                }
            }
            None => self.server.await?,
        }
        Ok(())
    }

    /// Builder the router for the application.
    fn build_router(app_state: &AppState) -> Router {
        use tower::ServiceBuilder;
        use tower_http::{
            request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
            trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer},
        };
        use tracing::Level;

        routes::build_router(app_state).layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(|request: &Request<Body>| {
                            let request_id = request
                                .headers()
                                .get("x-request-id")
                                .and_then(|value| value.to_str().ok())
                                .unwrap_or_default();
                            tracing::info_span!(
                                "request",
                                method = %request.method(),
                                uri = %request.uri(),
                                request_id = %request_id,
                            )
                        })
                        .on_request(DefaultOnRequest::new().level(Level::INFO))
                        .on_response(DefaultOnResponse::new().level(Level::INFO)),
                )
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
    }
}

/// Create a lazily connected pool to the configured database.
pub fn get_connection_pool(config: &DatabaseSettings) -> PgPool {
    PgPoolOptions::new()
        .acquire_timeout(Duration::from_secs(2))
        .connect_lazy_with(config.with_db())
}
