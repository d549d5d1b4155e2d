//! `SqliteDatabase` is a concrete implementation of a delivery pool engine backend.
//!
//! Unsurprisingly, it uses SQLite as the backend and implements all the traits defined in the [`crate::traits`]
//! module.
use std::fmt::Debug;

use chrono::{DateTime, Duration, Utc};
use log::*;
use sqlx::SqlitePool;

use super::db::{db_url, new_pool, notifications, packages, patrons};
use crate::{
    db_types::{Notification, Package, Patron, PatronId, PoolStats},
    traits::{
        DeliveryPoolDatabase,
        DeliveryPoolError,
        NotificationApiError,
        NotificationManagement,
        PatronApiError,
        PatronManagement,
        StaleReplacement,
    },
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    /// Creates a new connection pool using the URL from the `POOL_DATABASE_URL` environment variable.
    pub async fn new() -> Result<Self, sqlx::Error> {
        let url = db_url();
        Self::new_with_url(&url).await
    }

    pub async fn new_with_url(url: &str) -> Result<Self, sqlx::Error> {
        let pool = new_pool(url).await?;
        Ok(Self { url: url.to_string(), pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl PatronManagement for SqliteDatabase {
    async fn fetch_patron(&self, id: &PatronId) -> Result<Option<Patron>, PatronApiError> {
        let mut conn = self.pool.acquire().await?;
        patrons::fetch_patron(id, &mut conn).await
    }

    async fn fetch_or_create_patron(&self, id: &PatronId) -> Result<(Patron, bool), PatronApiError> {
        let mut tx = self.pool.begin().await?;
        let result = patrons::fetch_or_create(id, &mut tx).await?;
        tx.commit().await?;
        Ok(result)
    }

    async fn activate_patron(&self, id: &PatronId, now: DateTime<Utc>) -> Result<Patron, PatronApiError> {
        let mut conn = self.pool.acquire().await?;
        patrons::activate(id, now, &mut conn).await
    }

    async fn deactivate_patron(&self, id: &PatronId) -> Result<Patron, PatronApiError> {
        let mut conn = self.pool.acquire().await?;
        patrons::deactivate(id, &mut conn).await
    }

    async fn rotate_access_token(&self, id: &PatronId) -> Result<Patron, PatronApiError> {
        let mut conn = self.pool.acquire().await?;
        patrons::rotate_access_token(id, &mut conn).await
    }

    async fn set_cooldown_overrides(
        &self,
        id: &PatronId,
        force_not_greedy: bool,
        force_not_sleeping: bool,
    ) -> Result<Patron, PatronApiError> {
        let mut conn = self.pool.acquire().await?;
        patrons::set_cooldown_overrides(id, force_not_greedy, force_not_sleeping, &mut conn).await
    }

    async fn last_received_delivery(&self, id: &PatronId) -> Result<Option<DateTime<Utc>>, PatronApiError> {
        let mut conn = self.pool.acquire().await?;
        patrons::last_received_delivery(id, &mut conn).await
    }

    async fn last_completed_delivery(&self, id: &PatronId) -> Result<Option<DateTime<Utc>>, PatronApiError> {
        let mut conn = self.pool.acquire().await?;
        patrons::last_completed_delivery(id, &mut conn).await
    }

    async fn pool_stats(&self) -> Result<PoolStats, PatronApiError> {
        let mut conn = self.pool.acquire().await?;
        patrons::pool_stats(&mut conn).await
    }
}

impl NotificationManagement for SqliteDatabase {
    async fn enqueue_notification(&self, to: &PatronId, body: &str) -> Result<Notification, NotificationApiError> {
        let mut conn = self.pool.acquire().await?;
        notifications::enqueue(to, body, &mut conn).await
    }

    async fn fetch_oldest_unsent(&self) -> Result<Option<Notification>, NotificationApiError> {
        let mut conn = self.pool.acquire().await?;
        notifications::oldest_unsent(&mut conn).await
    }

    async fn mark_notification_sent(
        &self,
        id: i64,
        now: DateTime<Utc>,
        error: Option<&str>,
    ) -> Result<Notification, NotificationApiError> {
        let mut conn = self.pool.acquire().await?;
        notifications::mark_sent(id, now, error, &mut conn).await
    }

    async fn unsent_notification_count(&self) -> Result<i64, NotificationApiError> {
        let mut conn = self.pool.acquire().await?;
        notifications::unsent_count(&mut conn).await
    }
}

impl DeliveryPoolDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn create_unassigned_package(&self, requester: &PatronId) -> Result<Package, DeliveryPoolError> {
        let mut tx = self.pool.begin().await?;
        let package = packages::insert_unassigned(requester, &mut tx).await?;
        tx.commit().await?;
        Ok(package)
    }

    /// Creates the requester's package and assigns a randomly selected eligible fulfiller in a single transaction.
    /// The package is persisted (unassigned) even when no candidate is available, so the requester stays queued.
    async fn create_and_assign_package(
        &self,
        requester: &PatronId,
        now: DateTime<Utc>,
    ) -> Result<(Package, Option<Patron>), DeliveryPoolError> {
        let mut tx = self.pool.begin().await?;
        let package = packages::insert_unassigned(requester, &mut tx).await?;
        let candidate = patrons::pick_random_fulfiller(requester, now, &mut tx).await?;
        let (package, fulfiller) = match candidate {
            Some(patron) => {
                let assigned = packages::assign(package.id, &patron.patron_id, now, &mut tx).await?;
                debug!("🤝️ Package [{}] matched: {requester} ← {}", assigned.id, patron.patron_id);
                (assigned, Some(patron))
            },
            None => {
                debug!("🤝️ No fulfiller available for {requester}; package [{}] stays queued", package.id);
                (package, None)
            },
        };
        tx.commit().await?;
        Ok((package, fulfiller))
    }

    async fn assign_package(
        &self,
        package_id: i64,
        fulfiller: &PatronId,
        now: DateTime<Utc>,
    ) -> Result<Package, DeliveryPoolError> {
        let mut tx = self.pool.begin().await?;
        let package = packages::assign(package_id, fulfiller, now, &mut tx).await?;
        tx.commit().await?;
        Ok(package)
    }

    async fn mark_received(&self, package_id: i64, now: DateTime<Utc>) -> Result<Package, DeliveryPoolError> {
        let mut tx = self.pool.begin().await?;
        let package = packages::mark_received(package_id, now, &mut tx).await?;
        tx.commit().await?;
        Ok(package)
    }

    async fn mark_failed(&self, package_id: i64) -> Result<Package, DeliveryPoolError> {
        let mut tx = self.pool.begin().await?;
        let package = packages::mark_failed(package_id, &mut tx).await?;
        tx.commit().await?;
        Ok(package)
    }

    async fn fetch_package(&self, package_id: i64) -> Result<Option<Package>, DeliveryPoolError> {
        let mut conn = self.pool.acquire().await?;
        packages::fetch_package(package_id, &mut conn).await
    }

    async fn fetch_open_package_for_requester(&self, id: &PatronId) -> Result<Option<Package>, DeliveryPoolError> {
        let mut conn = self.pool.acquire().await?;
        packages::open_package_for_requester(id, &mut conn).await
    }

    async fn fetch_open_package_for_fulfiller(&self, id: &PatronId) -> Result<Option<Package>, DeliveryPoolError> {
        let mut conn = self.pool.acquire().await?;
        packages::open_package_for_fulfiller(id, &mut conn).await
    }

    async fn fetch_stale_packages(
        &self,
        now: DateTime<Utc>,
        timeout: Duration,
    ) -> Result<Vec<Package>, DeliveryPoolError> {
        let mut conn = self.pool.acquire().await?;
        packages::stale_packages(now, timeout, &mut conn).await
    }

    /// Runs the whole stale-recovery transition in one transaction. The `mark_failed` step only matches an open,
    /// assigned package, so a package that has already been recovered (or delivered in the meantime) aborts the
    /// transaction with an `InvalidTransition` error and nothing is applied.
    async fn replace_stale_package(&self, package_id: i64) -> Result<StaleReplacement, DeliveryPoolError> {
        let mut tx = self.pool.begin().await?;
        let failed = packages::mark_failed(package_id, &mut tx).await?;
        let fulfiller = failed
            .fulfiller_id
            .clone()
            .ok_or_else(|| DeliveryPoolError::InvalidTransition(format!(
                "package [{package_id}] has no fulfiller to penalize"
            )))?;
        let deactivated = patrons::deactivate(&fulfiller, &mut tx).await?;
        notifications::enqueue(
            &fulfiller,
            "You did not complete your delivery in time and have been removed from the pool.",
            &mut tx,
        )
        .await?;
        let requeued = packages::insert_unassigned(&failed.requester_id, &mut tx).await?;
        tx.commit().await?;
        info!(
            "♻️ Stale package [{package_id}] replaced: fulfiller {fulfiller} deactivated, requester {} re-queued as \
             package [{}]",
            failed.requester_id, requeued.id
        );
        Ok(StaleReplacement { failed, requeued, deactivated })
    }

    async fn close(&mut self) -> Result<(), DeliveryPoolError> {
        self.pool.close().await;
        Ok(())
    }
}
