use chrono::Duration;
use thiserror::Error;

use crate::{
    db_types::{Package, PatronId},
    traits::{DeliveryPoolError, NotificationApiError, PatronApiError},
};

/// The caller-facing error taxonomy for the matchmaking flow.
///
/// Every variant except `DatabaseError` is a precondition violation: synchronous, recoverable by the caller, and
/// translated into user-facing text by the (out-of-scope) command surface. None of them indicate corruption.
/// `NoFulfillerAvailable` is not even a failure in the usual sense; the requester's package was created and stays
/// queued for the recovery path.
#[derive(Debug, Error)]
pub enum MatchmakerError {
    #[error("Patron {0} is not in the pool")]
    NotInPool(PatronId),
    #[error("Patron {0} already has an incoming request")]
    AlreadyRequesting(PatronId),
    #[error("Patron {0} is already delivering a package")]
    AlreadyFulfilling(PatronId),
    #[error("Patron {patron} must wait {}s before requesting again", remaining.num_seconds())]
    StillFull { patron: PatronId, remaining: Duration },
    #[error("No fulfiller is available right now; the request stays queued")]
    NoFulfillerAvailable { queued: Package },
    #[error("Patron {0} has no active delivery")]
    NoActiveDelivery(PatronId),
    #[error("Invalid package transition: {0}")]
    InvalidTransition(String),
    #[error("{0}")]
    PatronError(#[from] PatronApiError),
    #[error("{0}")]
    NotificationError(#[from] NotificationApiError),
    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<DeliveryPoolError> for MatchmakerError {
    fn from(e: DeliveryPoolError) -> Self {
        match e {
            DeliveryPoolError::AlreadyRequesting(id) => MatchmakerError::AlreadyRequesting(id),
            DeliveryPoolError::AlreadyFulfilling(id) => MatchmakerError::AlreadyFulfilling(id),
            DeliveryPoolError::InvalidTransition(msg) => MatchmakerError::InvalidTransition(msg),
            DeliveryPoolError::PatronError(e) => MatchmakerError::PatronError(e),
            DeliveryPoolError::NotificationError(e) => MatchmakerError::NotificationError(e),
            other => MatchmakerError::DatabaseError(other.to_string()),
        }
    }
}
