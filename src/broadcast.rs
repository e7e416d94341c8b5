//! A single broadcast pass: pending subscribers are emailed one after the
//! other and flagged as soon as the provider accepts their email.

use crate::{
    configuration::BroadcastSettings,
    domain::SubscriberEmail,
    email_client::{EmailClient, EmailClientError},
    metrics::DeliveryMetrics,
    store::{PendingSubscriber, SubscriberStore},
};
use chrono::{DateTime, Datelike, Utc};
use tracing::{field::display, Span};

/// Summary of a broadcast pass.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, utoipa::ToSchema)]
pub struct BroadcastReport {
    pub sent: u32,
    pub failed: u32,
    pub total: u32,
    pub timestamp: DateTime<Utc>,
}

/// Run one broadcast pass over at most `batch_size` pending subscribers.
///
/// Sends are sequential with a fixed delay in between. A subscriber is flagged
/// right after the provider accepted its email; failed deliveries are counted
/// and left pending so the next pass retries them. `sent` only counts the
/// subscribers this pass flagged itself.
///
/// Passes are not coordinated with each other, so two overlapping passes can
/// email the same pending subscriber.
#[tracing::instrument(
    name = "Run broadcast",
    skip_all,
    fields(batch_size = settings.batch_size, sent = tracing::field::Empty, failed = tracing::field::Empty)
)]
pub async fn run_broadcast(
    store: &dyn SubscriberStore,
    email_client: &EmailClient,
    settings: &BroadcastSettings,
    metrics: &DeliveryMetrics,
) -> Result<BroadcastReport, BroadcastError> {
    let subscribers = store
        .pending_subscribers(settings.batch_size)
        .await
        .map_err(BroadcastError::FailedToGetPendingSubscribers)?;

    let total = subscribers.len() as u32;
    if subscribers.is_empty() {
        tracing::info!("No pending subscribers");
    } else {
        tracing::info!("Sending broadcast to {total} subscribers");
    }

    let mut sent = 0;
    let mut failed = 0;
    for (index, subscriber) in subscribers.iter().enumerate() {
        if index > 0 {
            tokio::time::sleep(settings.send_delay()).await;
        }

        match deliver(email_client, settings, subscriber).await {
            Ok(()) => {
                let flagged = store.mark_as_sent(subscriber.id).await.map_err(|e| {
                    BroadcastError::FailedToMarkAsSent(e, subscriber.email.clone())
                })?;
                metrics.record_sent();
                if flagged {
                    sent += 1;
                } else {
                    tracing::warn!(
                        subscriber_email = %subscriber.email,
                        "Subscriber was flagged as sent by an overlapping pass and got the email twice"
                    );
                }
            }
            Err(e) => {
                tracing::error!(
                    error.cause_chain = ?e,
                    error.message = %e,
                    subscriber_email = %subscriber.email,
                    "Failed to deliver broadcast to a subscriber. Leaving it pending",
                );
                failed += 1;
                metrics.record_failed();
            }
        }
    }

    metrics.record_run();
    Span::current()
        .record("sent", display(sent))
        .record("failed", display(failed));
    tracing::info!("Broadcast finished. Sent: {sent}, failed: {failed}");

    Ok(BroadcastReport {
        sent,
        failed,
        total,
        timestamp: Utc::now(),
    })
}

/// Send the broadcast to a single subscriber.
async fn deliver(
    email_client: &EmailClient,
    settings: &BroadcastSettings,
    subscriber: &PendingSubscriber,
) -> Result<(), DeliveryError> {
    let email = SubscriberEmail::parse(subscriber.email.clone())
        .map_err(DeliveryError::InvalidStoredEmail)?;
    let unsubscribe_link = settings.unsubscribe_link(&subscriber.unsubscribe_token);
    let content = BroadcastContent::new(Utc::now().year(), &settings.site_url, &unsubscribe_link);

    email_client
        .send_email(&email, &settings.subject, &content.html, &content.text)
        .await
        .map_err(DeliveryError::SendFailed)
}

/// Body of the broadcast email, as HTML and plain text.
struct BroadcastContent {
    html: String,
    text: String,
}

impl BroadcastContent {
    fn new(year: i32, site_url: &str, unsubscribe_link: &str) -> Self {
        let html = format!(
            "<p>Hi,</p>\
            <p>We wish you a {year} full of goals reached and dreams come true.</p>\
            <p>Happy New Year!</p>\
            <p><a href=\"{site_url}\">{site_url}</a> \
            <a href=\"{unsubscribe_link}\">Unsubscribe</a></p>"
        );
        let text = format!(
            "Hi,\n\n\
            We wish you a {year} full of goals reached and dreams come true.\n\n\
            Happy New Year!\n\n\
            {site_url}\n\
            Unsubscribe: {unsubscribe_link}\n"
        );

        Self { html, text }
    }
}

#[derive(thiserror::Error)]
pub enum BroadcastError {
    #[error("Failed to get pending subscribers")]
    FailedToGetPendingSubscribers(#[source] sqlx::Error),
    #[error("Failed to flag {1} as sent")]
    FailedToMarkAsSent(#[source] sqlx::Error, String),
}

#[derive(thiserror::Error)]
pub enum DeliveryError {
    #[error("Stored contact details are invalid: {0}")]
    InvalidStoredEmail(String),
    #[error("Failed to send the broadcast email")]
    SendFailed(#[source] EmailClientError),
}
