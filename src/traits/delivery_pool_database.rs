use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use crate::{
    db_types::{Package, Patron, PatronId},
    traits::{NotificationApiError, NotificationManagement, PatronApiError, PatronManagement},
};

/// This trait defines the highest level of behaviour for backends supporting the delivery pool engine.
///
/// The package lifecycle (`Unassigned` → `Assigned` → terminal `Received` | `Failed`) is owned entirely by this
/// trait; no other component mutates package state. Each mutating method is a single atomic operation with respect
/// to the store, including its precondition checks:
///
/// * [`create_unassigned_package`](Self::create_unassigned_package) checks the "one open package per requester"
///   invariant and inserts in one step.
/// * [`assign_package`](Self::assign_package) checks the "one open package per fulfiller" invariant and mutates in
///   one step.
/// * [`replace_stale_package`](Self::replace_stale_package) performs the whole stale-recovery transition in one
///   transaction so a package can never be half-recovered or recovered twice.
#[allow(async_fn_in_trait)]
pub trait DeliveryPoolDatabase: Clone + PatronManagement + NotificationManagement {
    /// The URL of the database
    fn url(&self) -> &str;

    /// Creates a new `Unassigned` package for the requester.
    ///
    /// Fails with [`DeliveryPoolError::AlreadyRequesting`] if the requester already has an open package.
    async fn create_unassigned_package(&self, requester: &PatronId) -> Result<Package, DeliveryPoolError>;

    /// Creates a package for the requester and, if an eligible fulfiller exists, assigns it, all in one atomic
    /// transaction.
    ///
    /// An eligible fulfiller is an active patron other than the requester who is not sleeping at `now` and has no
    /// open package as fulfiller. Selection among eligible candidates is uniform random, so no candidate is starved.
    ///
    /// When no candidate exists the package is still created (and persisted) in the `Unassigned` state so that the
    /// requester stays queued, and `None` is returned for the fulfiller.
    async fn create_and_assign_package(
        &self,
        requester: &PatronId,
        now: DateTime<Utc>,
    ) -> Result<(Package, Option<Patron>), DeliveryPoolError>;

    /// Assigns the fulfiller to an `Unassigned` package and stamps `assigned_at`.
    ///
    /// Fails with [`DeliveryPoolError::InvalidTransition`] unless the package is `Unassigned`, and with
    /// [`DeliveryPoolError::AlreadyFulfilling`] if the fulfiller already has an open package as fulfiller.
    async fn assign_package(
        &self,
        package_id: i64,
        fulfiller: &PatronId,
        now: DateTime<Utc>,
    ) -> Result<Package, DeliveryPoolError>;

    /// Marks an `Assigned` package as received and stamps `delivered_at`. Terminal.
    ///
    /// Calling this on a package in any other state (including a second call on the same package) fails with
    /// [`DeliveryPoolError::InvalidTransition`] and never re-applies the delivery-time bookkeeping.
    async fn mark_received(&self, package_id: i64, now: DateTime<Utc>) -> Result<Package, DeliveryPoolError>;

    /// Marks an `Assigned` package as failed. Terminal.
    async fn mark_failed(&self, package_id: i64) -> Result<Package, DeliveryPoolError>;

    /// Fetches a package by id.
    async fn fetch_package(&self, package_id: i64) -> Result<Option<Package>, DeliveryPoolError>;

    /// The requester's open (non-terminal) package, if any.
    async fn fetch_open_package_for_requester(&self, id: &PatronId) -> Result<Option<Package>, DeliveryPoolError>;

    /// The fulfiller's open (non-terminal) package, if any.
    async fn fetch_open_package_for_fulfiller(&self, id: &PatronId) -> Result<Option<Package>, DeliveryPoolError>;

    /// All `Assigned` packages that have been outstanding for longer than `timeout` at `now`, oldest
    /// `assigned_at` first.
    async fn fetch_stale_packages(
        &self,
        now: DateTime<Utc>,
        timeout: Duration,
    ) -> Result<Vec<Package>, DeliveryPoolError>;

    /// Recovers a stale package in a single atomic transaction:
    ///
    /// 1. the fulfiller is deactivated (the penalty for non-responsiveness),
    /// 2. a notification informing the fulfiller is enqueued,
    /// 3. the package is marked failed,
    /// 4. a fresh `Unassigned` package is created for the original requester (no penalty).
    ///
    /// Fails with [`DeliveryPoolError::InvalidTransition`] unless the package is still `Assigned`, which also
    /// guarantees a package selected for recovery is never processed twice.
    async fn replace_stale_package(&self, package_id: i64) -> Result<StaleReplacement, DeliveryPoolError>;

    /// Closes the database connection.
    async fn close(&mut self) -> Result<(), DeliveryPoolError> {
        Ok(())
    }
}

/// The outcome of a stale-recovery transition.
#[derive(Debug, Clone)]
pub struct StaleReplacement {
    /// The stale package, now in the terminal `Failed` state.
    pub failed: Package,
    /// The fresh `Unassigned` package created for the original requester.
    pub requeued: Package,
    /// The fulfiller that was deactivated.
    pub deactivated: Patron,
}

#[derive(Debug, Clone, Error)]
pub enum DeliveryPoolError {
    #[error("We have an internal database engine error (configuration/uptime etc.): {0}")]
    DatabaseError(String),
    #[error("Patron {0} already has an incoming request")]
    AlreadyRequesting(PatronId),
    #[error("Patron {0} is already delivering a package")]
    AlreadyFulfilling(PatronId),
    #[error("Invalid package transition: {0}")]
    InvalidTransition(String),
    #[error("The requested package (internal id {0}) does not exist")]
    PackageNotFound(i64),
    #[error("{0}")]
    PatronError(#[from] PatronApiError),
    #[error("{0}")]
    NotificationError(#[from] NotificationApiError),
}

impl From<sqlx::Error> for DeliveryPoolError {
    fn from(e: sqlx::Error) -> Self {
        DeliveryPoolError::DatabaseError(e.to_string())
    }
}
