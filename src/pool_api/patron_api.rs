//! Unified API for accessing and managing patrons.

use std::fmt::Debug;

use chrono::{DateTime, Duration, Utc};
use log::debug;

use crate::{
    db_types::{Patron, PatronId, PoolStats},
    traits::{PatronApiError, PatronManagement},
};

/// The `PatronApi` provides a unified API for patron records and eligibility queries.
pub struct PatronApi<B> {
    db: B,
}

impl<B: Debug> Debug for PatronApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PatronApi ({:?})", self.db)
    }
}

impl<B> PatronApi<B>
where B: PatronManagement
{
    pub fn new(db: B) -> Self {
        Self { db }
    }

    /// Fetches the patron with the given id, if they exist.
    pub async fn patron(&self, id: &PatronId) -> Result<Option<Patron>, PatronApiError> {
        self.db.fetch_patron(id).await
    }

    /// First contact: fetches the patron, creating an inactive record if this id has never been seen before.
    /// The second field is `true` if the patron was created by this call, which callers typically use to send a
    /// welcome message.
    pub async fn fetch_or_create(&self, id: &PatronId) -> Result<(Patron, bool), PatronApiError> {
        self.db.fetch_or_create_patron(id).await
    }

    /// Places the patron in the active pool and refreshes their activation time.
    pub async fn activate(&self, id: &PatronId, now: DateTime<Utc>) -> Result<Patron, PatronApiError> {
        self.db.activate_patron(id, now).await
    }

    /// Removes the patron from the active pool.
    pub async fn deactivate(&self, id: &PatronId) -> Result<Patron, PatronApiError> {
        self.db.deactivate_patron(id).await
    }

    /// Administrative override: force the cooldown checks off for this patron. Used by operators and test setups.
    pub async fn set_cooldown_overrides(
        &self,
        id: &PatronId,
        force_not_greedy: bool,
        force_not_sleeping: bool,
    ) -> Result<Patron, PatronApiError> {
        self.db.set_cooldown_overrides(id, force_not_greedy, force_not_sleeping).await
    }

    /// Rotates the patron's access token and returns the new one. Called on every stats access, so a leaked token
    /// expires as soon as the owner uses theirs again.
    pub async fn rotate_access_token(&self, id: &PatronId) -> Result<String, PatronApiError> {
        let patron = self.db.rotate_access_token(id).await?;
        debug!("🧑️ Issued a fresh access token for {id}");
        Ok(patron.access_token)
    }

    /// The remaining cooldown before the patron may request a delivery. Zero when eligible.
    pub async fn time_until_eligible_to_request(
        &self,
        id: &PatronId,
        now: DateTime<Utc>,
    ) -> Result<Duration, PatronApiError> {
        let patron = self.db.fetch_patron(id).await?.ok_or_else(|| PatronApiError::PatronNotFound(id.clone()))?;
        let last_received = self.db.last_received_delivery(id).await?;
        Ok(patron.time_until_eligible_to_request(last_received, now))
    }

    /// True iff the patron is still in their requester cooldown.
    pub async fn is_greedy(&self, id: &PatronId, now: DateTime<Utc>) -> Result<bool, PatronApiError> {
        Ok(self.time_until_eligible_to_request(id, now).await? > Duration::zero())
    }

    /// The remaining cooldown before the patron may be selected as a fulfiller. Zero when eligible.
    pub async fn time_until_eligible_to_fulfill(
        &self,
        id: &PatronId,
        now: DateTime<Utc>,
    ) -> Result<Duration, PatronApiError> {
        let patron = self.db.fetch_patron(id).await?.ok_or_else(|| PatronApiError::PatronNotFound(id.clone()))?;
        let last_delivered = self.db.last_completed_delivery(id).await?;
        Ok(patron.time_until_eligible_to_fulfill(last_delivered, now))
    }

    /// True iff the patron is still in their fulfiller cooldown.
    pub async fn is_sleeping(&self, id: &PatronId, now: DateTime<Utc>) -> Result<bool, PatronApiError> {
        Ok(self.time_until_eligible_to_fulfill(id, now).await? > Duration::zero())
    }

    /// Aggregate counters for the pool.
    pub async fn pool_stats(&self) -> Result<PoolStats, PatronApiError> {
        self.db.pool_stats().await
    }
}
