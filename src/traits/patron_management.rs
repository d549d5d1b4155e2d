use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::db_types::{Patron, PatronId, PoolStats};

#[derive(Debug, Clone, Error)]
pub enum PatronApiError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("The patron {0} does not exist")]
    PatronNotFound(PatronId),
}

impl From<sqlx::Error> for PatronApiError {
    fn from(e: sqlx::Error) -> Self {
        PatronApiError::DatabaseError(e.to_string())
    }
}

/// The `PatronManagement` trait defines behaviour for managing patron records.
///
/// Patrons are created on first contact and are never hard-deleted in normal operation. The trait also exposes the
/// two "most recent received event" queries that the cooldown computations on [`Patron`] are built on.
#[allow(async_fn_in_trait)]
pub trait PatronManagement {
    /// Fetches the patron with the given id. If no patron exists, `None` is returned.
    async fn fetch_patron(&self, id: &PatronId) -> Result<Option<Patron>, PatronApiError>;

    /// Fetches the patron with the given id, creating an inactive record on first contact.
    /// Returns `true` in the second field if the patron was created by this call.
    async fn fetch_or_create_patron(&self, id: &PatronId) -> Result<(Patron, bool), PatronApiError>;

    /// Marks the patron as active and refreshes `last_activated_at`. Persisted immediately.
    async fn activate_patron(&self, id: &PatronId, now: DateTime<Utc>) -> Result<Patron, PatronApiError>;

    /// Marks the patron as inactive. This is the penalty applied to unresponsive fulfillers.
    async fn deactivate_patron(&self, id: &PatronId) -> Result<Patron, PatronApiError>;

    /// Replaces the patron's access token with a fresh one and returns the updated record.
    async fn rotate_access_token(&self, id: &PatronId) -> Result<Patron, PatronApiError>;

    /// Administrative override: force the greedy and/or sleepy cooldown checks off for this patron.
    async fn set_cooldown_overrides(
        &self,
        id: &PatronId,
        force_not_greedy: bool,
        force_not_sleeping: bool,
    ) -> Result<Patron, PatronApiError>;

    /// The time of the patron's most recent *received* incoming delivery, if any.
    async fn last_received_delivery(&self, id: &PatronId) -> Result<Option<DateTime<Utc>>, PatronApiError>;

    /// The time of the patron's most recent *received* outgoing delivery, if any.
    async fn last_completed_delivery(&self, id: &PatronId) -> Result<Option<DateTime<Utc>>, PatronApiError>;

    /// Aggregate patron and delivery counters for the pool.
    async fn pool_stats(&self) -> Result<PoolStats, PatronApiError>;
}
