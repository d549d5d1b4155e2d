//! The notification dispatcher.
//!
//! Drains the outbox oldest-first through the external [`MessageChannel`] adapter, one message in flight at a time.
//! Every attempt is bounded by a timeout so a slow channel cannot stall the queue, and the outcome is recorded on
//! the notification record. Delivery is at-most-once: a failed attempt is logged and surfaced via
//! `delivery_attempts`/`last_error`, never retried here.
use std::sync::Arc;

use chrono::Utc;
use log::*;
use tokio::{sync::watch, task::JoinHandle, time::timeout};

use crate::{
    config::PoolConfig,
    traits::{MessageChannel, NotificationApiError, NotificationManagement},
    SqliteDatabase,
};

/// A handle to a running dispatcher.
pub struct DispatcherHandle {
    join: JoinHandle<()>,
    idle: watch::Receiver<bool>,
}

impl DispatcherHandle {
    /// Blocks until the outbox is empty and the dispatcher is idle. This is a genuine wait on the worker's idle
    /// signal, not a poll loop. Returns early only if the dispatcher itself has stopped.
    pub async fn wait_until_idle(&mut self) {
        while !*self.idle.borrow_and_update() {
            if self.idle.changed().await.is_err() {
                break;
            }
        }
    }

    pub async fn join(self) {
        let _ = self.join.await;
    }
}

/// Starts the notification dispatcher. Stop it by signalling `shutdown`; the in-flight delivery always completes
/// first.
pub fn start_notification_dispatcher(
    db: SqliteDatabase,
    channel: Arc<dyn MessageChannel>,
    config: &PoolConfig,
    mut shutdown: watch::Receiver<bool>,
) -> DispatcherHandle {
    let interval = config.worker_interval;
    let delivery_timeout = config.delivery_timeout;
    let (idle_tx, idle_rx) = watch::channel(false);
    let join = tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        info!("📮️ Notification dispatcher started");
        'outer: loop {
            tokio::select! {
                _ = timer.tick() => {},
                _ = shutdown.changed() => break,
            }
            loop {
                match dispatch_next(&db, channel.as_ref(), delivery_timeout).await {
                    Ok(true) => {
                        let _ = idle_tx.send(false);
                    },
                    Ok(false) => {
                        // Outbox drained.
                        let _ = idle_tx.send(true);
                        break;
                    },
                    Err(e) => {
                        // Unsent notifications may remain, so the idle signal stays off until a cycle drains them.
                        error!("📮️ Error dispatching notification: {e}");
                        break;
                    },
                }
                if *shutdown.borrow() {
                    break 'outer;
                }
            }
        }
        info!("📮️ Notification dispatcher stopped");
    });
    DispatcherHandle { join, idle: idle_rx }
}

/// Delivers the oldest unsent notification, if there is one. Returns `true` if a notification was processed.
///
/// The notification is marked sent regardless of the attempt outcome; a failure or timeout is recorded in
/// `last_error` instead of blocking the queue.
pub async fn dispatch_next<B>(
    db: &B,
    channel: &dyn MessageChannel,
    delivery_timeout: std::time::Duration,
) -> Result<bool, NotificationApiError>
where
    B: NotificationManagement,
{
    let Some(notification) = db.fetch_oldest_unsent().await? else {
        return Ok(false);
    };
    debug!("📮️ Sending notification [{}] to {}", notification.id, notification.patron_id);
    let attempt = timeout(
        delivery_timeout,
        channel.deliver_direct_message(&notification.patron_id, &notification.body),
    )
    .await;
    let error = match attempt {
        Ok(Ok(())) => {
            debug!("📮️ Delivered notification [{}] to {}", notification.id, notification.patron_id);
            None
        },
        Ok(Err(e)) => {
            error!("📮️ Failed to deliver notification [{}] to {}: {e}", notification.id, notification.patron_id);
            Some(e.to_string())
        },
        Err(_) => {
            error!(
                "📮️ Delivery of notification [{}] to {} timed out after {delivery_timeout:?}",
                notification.id, notification.patron_id
            );
            Some(format!("delivery timed out after {delivery_timeout:?}"))
        },
    };
    db.mark_notification_sent(notification.id, Utc::now(), error.as_deref()).await?;
    Ok(true)
}
