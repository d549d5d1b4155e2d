use chrono::{DateTime, Utc};
use log::{debug, trace};
use sqlx::SqliteConnection;

use crate::{
    db_types::{Notification, PatronId},
    traits::NotificationApiError,
};

pub async fn enqueue(
    to: &PatronId,
    body: &str,
    conn: &mut SqliteConnection,
) -> Result<Notification, NotificationApiError> {
    let notification: Notification = sqlx::query_as(
        r#"
            INSERT INTO notifications (patron_id, body) VALUES ($1, $2)
            RETURNING *;
        "#,
    )
    .bind(to.as_str())
    .bind(body)
    .fetch_one(conn)
    .await?;
    debug!("📬️ Notification [{}] queued for {to}", notification.id);
    Ok(notification)
}

/// The oldest unsent notification. Creation order is insertion order, so ordering by id is sufficient.
pub async fn oldest_unsent(conn: &mut SqliteConnection) -> Result<Option<Notification>, NotificationApiError> {
    let notification =
        sqlx::query_as("SELECT * FROM notifications WHERE sent = 0 ORDER BY id ASC LIMIT 1")
            .fetch_optional(conn)
            .await?;
    Ok(notification)
}

/// Marks the notification as sent and records the outcome of the delivery attempt.
pub async fn mark_sent(
    id: i64,
    now: DateTime<Utc>,
    error: Option<&str>,
    conn: &mut SqliteConnection,
) -> Result<Notification, NotificationApiError> {
    let notification = sqlx::query_as(
        r#"
            UPDATE notifications
            SET sent = 1, sent_at = $1, delivery_attempts = delivery_attempts + 1, last_error = $2
            WHERE id = $3
            RETURNING *;
        "#,
    )
    .bind(now)
    .bind(error)
    .bind(id)
    .fetch_optional(conn)
    .await?
    .ok_or(NotificationApiError::NotificationNotFound(id))?;
    trace!("📬️ Notification [{id}] marked as sent");
    Ok(notification)
}

pub async fn unsent_count(conn: &mut SqliteConnection) -> Result<i64, NotificationApiError> {
    let count = sqlx::query_scalar("SELECT COUNT(*) FROM notifications WHERE sent = 0").fetch_one(conn).await?;
    Ok(count)
}
