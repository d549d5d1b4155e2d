use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::db_types::{Notification, PatronId};

#[derive(Debug, Clone, Error)]
pub enum NotificationApiError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("The notification with id {0} does not exist")]
    NotificationNotFound(i64),
}

impl From<sqlx::Error> for NotificationApiError {
    fn from(e: sqlx::Error) -> Self {
        NotificationApiError::DatabaseError(e.to_string())
    }
}

/// The `NotificationManagement` trait is the outbox for messages to patrons.
///
/// Any component wanting to reach a patron through the external channel enqueues a notification here. The dispatcher
/// worker consumes them oldest-first, one at a time.
#[allow(async_fn_in_trait)]
pub trait NotificationManagement {
    /// Queues a message for the given patron.
    async fn enqueue_notification(&self, to: &PatronId, body: &str) -> Result<Notification, NotificationApiError>;

    /// The oldest notification that has not been sent yet, if any.
    async fn fetch_oldest_unsent(&self) -> Result<Option<Notification>, NotificationApiError>;

    /// Marks the notification as sent after a delivery attempt, incrementing `delivery_attempts` and recording the
    /// attempt error, if any. The notification is marked sent regardless of the attempt outcome; the error field is
    /// what keeps the failure visible.
    async fn mark_notification_sent(
        &self,
        id: i64,
        now: DateTime<Utc>,
        error: Option<&str>,
    ) -> Result<Notification, NotificationApiError>;

    /// The number of notifications still waiting to be sent.
    async fn unsent_notification_count(&self) -> Result<i64, NotificationApiError>;
}
