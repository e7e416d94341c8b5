use super::{InsertOutcome, PendingSubscriber, SubscriberStore};
use crate::domain::{NewSubscriber, UnsubscribeToken};
use axum::async_trait;
use std::sync::{
    atomic::{AtomicU32, Ordering},
    Mutex,
};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub(crate) struct StoredSubscriber {
    pub id: Uuid,
    pub email: String,
    pub unsubscribe_token: String,
    pub newsletter_sent: bool,
}

/// Store keeping subscribers in insertion order, used to exercise the
/// broadcast without a database.
#[derive(Debug, Default)]
pub(crate) struct InMemoryStore {
    rows: Mutex<Vec<StoredSubscriber>>,
    pending_queries: AtomicU32,
    pending_query_failures: AtomicU32,
    fail_mark_as_sent: bool,
    flagged_elsewhere: bool,
}

impl InMemoryStore {
    pub fn with_emails(emails: &[&str]) -> Self {
        let store = Self::default();
        for email in emails {
            store.push(email, false);
        }
        store
    }

    pub fn failing_pending_query(self) -> Self {
        self.failing_pending_query_times(u32::MAX)
    }

    /// Fail the next `times` pending queries, then behave normally.
    pub fn failing_pending_query_times(self, times: u32) -> Self {
        self.pending_query_failures.store(times, Ordering::SeqCst);
        self
    }

    /// Simulate another pass flagging each subscriber right before this one
    /// does.
    pub fn flagged_elsewhere(mut self) -> Self {
        self.flagged_elsewhere = true;
        self
    }

    pub fn pending_queries(&self) -> u32 {
        self.pending_queries.load(Ordering::SeqCst)
    }

    pub fn failing_mark_as_sent(mut self) -> Self {
        self.fail_mark_as_sent = true;
        self
    }

    pub fn push(&self, email: &str, newsletter_sent: bool) -> Uuid {
        let id = Uuid::new_v4();
        self.rows.lock().unwrap().push(StoredSubscriber {
            id,
            email: email.to_string(),
            unsubscribe_token: UnsubscribeToken::generate().as_ref().to_string(),
            newsletter_sent,
        });
        id
    }

    pub fn rows(&self) -> Vec<StoredSubscriber> {
        self.rows.lock().unwrap().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.rows().iter().filter(|r| r.newsletter_sent).count()
    }
}

#[async_trait]
impl SubscriberStore for InMemoryStore {
    async fn insert_subscriber(
        &self,
        new_subscriber: &NewSubscriber,
    ) -> Result<InsertOutcome, sqlx::Error> {
        let mut rows = self.rows.lock().unwrap();
        if rows.iter().any(|r| r.email == new_subscriber.email.as_ref()) {
            return Ok(InsertOutcome::AlreadySubscribed);
        }
        rows.push(StoredSubscriber {
            id: Uuid::new_v4(),
            email: new_subscriber.email.as_ref().to_string(),
            unsubscribe_token: new_subscriber.unsubscribe_token.as_ref().to_string(),
            newsletter_sent: false,
        });
        Ok(InsertOutcome::Inserted)
    }

    async fn pending_subscribers(
        &self,
        limit: u32,
    ) -> Result<Vec<PendingSubscriber>, sqlx::Error> {
        self.pending_queries.fetch_add(1, Ordering::SeqCst);
        let should_fail = self
            .pending_query_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(sqlx::Error::PoolTimedOut);
        }
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|r| !r.newsletter_sent)
            .take(limit as usize)
            .map(|r| PendingSubscriber {
                id: r.id,
                email: r.email.clone(),
                unsubscribe_token: r.unsubscribe_token.clone(),
            })
            .collect())
    }

    async fn mark_as_sent(&self, subscriber_id: Uuid) -> Result<bool, sqlx::Error> {
        if self.fail_mark_as_sent {
            return Err(sqlx::Error::PoolTimedOut);
        }
        let mut rows = self.rows.lock().unwrap();
        match rows
            .iter_mut()
            .find(|r| r.id == subscriber_id && !r.newsletter_sent)
        {
            Some(row) => {
                row.newsletter_sent = true;
                Ok(!self.flagged_elsewhere)
            }
            None => Ok(false),
        }
    }

    async fn reset_sent_flags(&self) -> Result<u64, sqlx::Error> {
        let mut rows = self.rows.lock().unwrap();
        let mut count = 0;
        for row in rows.iter_mut().filter(|r| r.newsletter_sent) {
            row.newsletter_sent = false;
            count += 1;
        }
        Ok(count)
    }

    async fn remove_subscriber(&self, token: &UnsubscribeToken) -> Result<bool, sqlx::Error> {
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|r| r.unsubscribe_token != token.as_ref());
        Ok(rows.len() < before)
    }
}
