use crate::{
    broadcast::run_broadcast, configuration::BroadcastSettings, email_client::EmailClient,
    metrics::DeliveryMetrics, store::SubscriberStore,
};
use std::time::Duration;

/// Run a broadcast pass every `interval`, for deployments without an
/// external cron job calling the broadcast endpoint.
///
/// A failed pass is logged and retried on the next tick.
pub(crate) async fn worker_loop(
    store: &dyn SubscriberStore,
    email_client: &EmailClient,
    settings: &BroadcastSettings,
    metrics: &DeliveryMetrics,
    interval: Duration,
) -> anyhow::Result<()> {
    use tokio::time::sleep;

    tracing::info!(
        "Scheduled broadcast every {} milliseconds",
        interval.as_millis()
    );
    loop {
        match run_broadcast(store, email_client, settings, metrics).await {
            Ok(report) => {
                tracing::info!(
                    sent = report.sent,
                    failed = report.failed,
                    total = report.total,
                    "Scheduled broadcast pass completed"
                );
            }
            Err(e) => {
                tracing::error!(
                    error.cause_chain = ?e,
                    error.message = %e,
                    "Scheduled broadcast pass failed"
                );
            }
        }
        sleep(interval).await;
    }
}
