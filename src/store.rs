//! Persistence of subscribers and their sent-flag.

#[cfg(test)]
pub(crate) mod in_memory;

use crate::domain::{NewSubscriber, UnsubscribeToken};
use axum::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

/// Name Postgres gives the unique constraint on `subscribers.email`.
const EMAIL_UNIQUE_CONSTRAINT: &str = "subscribers_email_key";

/// A subscriber who has not received this year's broadcast yet.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct PendingSubscriber {
    pub id: Uuid,
    pub email: String,
    pub unsubscribe_token: String,
}

/// Result of trying to store a new subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    AlreadySubscribed,
}

/// Storage operations needed to collect subscribers and run a broadcast.
#[async_trait]
pub trait SubscriberStore: Send + Sync {
    /// Insert a new subscriber. Inserting an email that is already stored is
    /// not an error.
    async fn insert_subscriber(
        &self,
        new_subscriber: &NewSubscriber,
    ) -> Result<InsertOutcome, sqlx::Error>;

    /// Get at most `limit` subscribers whose sent-flag is still false, oldest
    /// first.
    async fn pending_subscribers(&self, limit: u32)
        -> Result<Vec<PendingSubscriber>, sqlx::Error>;

    /// Flip the sent-flag of a subscriber. Returns `false` when the flag was
    /// already set, or the subscriber is gone.
    async fn mark_as_sent(&self, subscriber_id: Uuid) -> Result<bool, sqlx::Error>;

    /// Clear every sent-flag so the broadcast can run again. Returns the
    /// amount of subscribers that were reset.
    async fn reset_sent_flags(&self) -> Result<u64, sqlx::Error>;

    /// Remove the subscriber owning the token. Returns `false` when no
    /// subscriber matched.
    async fn remove_subscriber(&self, token: &UnsubscribeToken) -> Result<bool, sqlx::Error>;
}

#[async_trait]
impl SubscriberStore for PgPool {
    #[tracing::instrument(
        name = "Saving new subscriber details in database",
        skip(self, new_subscriber)
    )]
    async fn insert_subscriber(
        &self,
        new_subscriber: &NewSubscriber,
    ) -> Result<InsertOutcome, sqlx::Error> {
        let result = sqlx::query(
            r#"INSERT INTO subscribers (id, email, unsubscribe_token, subscribed_at)
               VALUES ($1, $2, $3, $4)"#,
        )
        .bind(Uuid::new_v4())
        .bind(new_subscriber.email.as_ref())
        .bind(new_subscriber.unsubscribe_token.as_ref())
        .bind(Utc::now())
        .execute(self)
        .await;

        match result {
            Ok(_) => {
                tracing::info!("New subscriber details have been saved");
                Ok(InsertOutcome::Inserted)
            }
            Err(sqlx::Error::Database(e))
                if e.is_unique_violation() && e.constraint() == Some(EMAIL_UNIQUE_CONSTRAINT) =>
            {
                tracing::info!("Subscriber was already stored");
                Ok(InsertOutcome::AlreadySubscribed)
            }
            Err(e) => {
                tracing::error!("Failed to execute query: {e:?}");
                Err(e)
            }
        }
    }

    #[tracing::instrument(name = "Get pending subscribers", skip(self))]
    async fn pending_subscribers(
        &self,
        limit: u32,
    ) -> Result<Vec<PendingSubscriber>, sqlx::Error> {
        sqlx::query_as::<_, PendingSubscriber>(
            r#"SELECT id, email, unsubscribe_token
               FROM subscribers
               WHERE newsletter_sent = FALSE
               ORDER BY subscribed_at
               LIMIT $1"#,
        )
        .bind(i64::from(limit))
        .fetch_all(self)
        .await
        .map_err(|e| {
            tracing::error!("Failed to execute query: {e:?}");
            e
        })
    }

    #[tracing::instrument(name = "Mark subscriber as sent", skip(self))]
    async fn mark_as_sent(&self, subscriber_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"UPDATE subscribers SET newsletter_sent = TRUE
               WHERE id = $1 AND newsletter_sent = FALSE"#,
        )
        .bind(subscriber_id)
        .execute(self)
        .await
        .map_err(|e| {
            tracing::error!("Failed to execute query: {e:?}");
            e
        })?;

        Ok(result.rows_affected() == 1)
    }

    #[tracing::instrument(name = "Reset sent-flag of all subscribers", skip(self))]
    async fn reset_sent_flags(&self) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"UPDATE subscribers SET newsletter_sent = FALSE WHERE newsletter_sent = TRUE"#,
        )
        .execute(self)
        .await
        .map_err(|e| {
            tracing::error!("Failed to execute query: {e:?}");
            e
        })?;

        Ok(result.rows_affected())
    }

    #[tracing::instrument(name = "Remove subscriber by unsubscribe token", skip(self, token))]
    async fn remove_subscriber(&self, token: &UnsubscribeToken) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(r#"DELETE FROM subscribers WHERE unsubscribe_token = $1"#)
            .bind(token.as_ref())
            .execute(self)
            .await
            .map_err(|e| {
                tracing::error!("Failed to execute query: {e:?}");
                e
            })?;

        Ok(result.rows_affected() > 0)
    }
}
