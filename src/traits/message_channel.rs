use async_trait::async_trait;
use thiserror::Error;

use crate::db_types::PatronId;

#[derive(Debug, Clone, Error)]
pub enum MessageChannelError {
    #[error("Failed to deliver message: {0}")]
    DeliveryFailed(String),
}

/// The adapter to the external channel (e.g. a chat service) that the notification dispatcher delivers through.
///
/// Implementations should not retry internally; the dispatcher bounds each call with a timeout and records the
/// outcome on the notification record.
#[async_trait]
pub trait MessageChannel: Send + Sync {
    /// Sends `body` as a direct message to the given patron.
    async fn deliver_direct_message(&self, to: &PatronId, body: &str) -> Result<(), MessageChannelError>;
}
