use crate::{
    configuration::BroadcastSettings, email_client::EmailClient, metrics::DeliveryMetrics,
};
use axum::extract::FromRef;
use derive_getters::Getters;
use duplicate::duplicate_item;
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Debug, Clone, Getters)]
pub struct AppState {
    db_pool: Arc<PgPool>,
    email_client: Arc<EmailClient>,
    broadcast_settings: Arc<BroadcastSettings>,
    metrics: Arc<DeliveryMetrics>,
}

impl AppState {
    pub fn create(
        db_pool: PgPool,
        email_client: EmailClient,
        broadcast_settings: BroadcastSettings,
        metrics: DeliveryMetrics,
    ) -> Self {
        Self {
            db_pool: Arc::new(db_pool),
            email_client: Arc::new(email_client),
            broadcast_settings: Arc::new(broadcast_settings),
            metrics: Arc::new(metrics),
        }
    }
}

#[duplicate_item(
    service_type          field;
    [ PgPool ]            [ db_pool ];
    [ EmailClient ]       [ email_client ];
    [ BroadcastSettings ] [ broadcast_settings ];
    [ DeliveryMetrics ]   [ metrics ];
)]
impl FromRef<AppState> for Arc<service_type> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.field.clone()
    }
}
