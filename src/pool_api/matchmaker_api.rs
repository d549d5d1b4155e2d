use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::*;

use crate::{
    db_types::{Package, Patron, PatronId},
    events::{EventProducers, PackageAssignedEvent},
    pool_api::errors::MatchmakerError,
    traits::DeliveryPoolDatabase,
};

/// `MatchmakerApi` is the primary API for the request/fulfilment flow: requesting a delivery, and the two
/// acknowledgement calls made by the fulfiller and the requester.
pub struct MatchmakerApi<B> {
    db: B,
    producers: EventProducers,
}

impl<B> Debug for MatchmakerApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MatchmakerApi")
    }
}

impl<B> MatchmakerApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, producers }
    }
}

impl<B> MatchmakerApi<B>
where B: DeliveryPoolDatabase
{
    /// Requests a delivery on behalf of `requester`.
    ///
    /// Preconditions, checked in order:
    /// 1. the requester must be an active pool member (`NotInPool`),
    /// 2. must not already have an open package as requester (`AlreadyRequesting`),
    /// 3. must not be in their greedy cooldown (`StillFull`, carrying the remaining wait).
    ///
    /// A fulfiller is then selected uniformly at random among eligible candidates and the package is created and
    /// assigned atomically. When no candidate is available the package is still created, `Unassigned`, so the
    /// requester stays queued; the call reports this as `NoFulfillerAvailable`.
    ///
    /// On success a [`PackageAssignedEvent`] is published; notifying the two parties is the subscriber's job.
    pub async fn request_delivery(
        &self,
        requester: &PatronId,
        now: DateTime<Utc>,
    ) -> Result<(Package, Patron), MatchmakerError> {
        let patron = match self.db.fetch_patron(requester).await? {
            Some(p) if p.is_active => p,
            _ => return Err(MatchmakerError::NotInPool(requester.clone())),
        };
        if self.db.fetch_open_package_for_requester(requester).await?.is_some() {
            return Err(MatchmakerError::AlreadyRequesting(requester.clone()));
        }
        let last_received = self.db.last_received_delivery(requester).await?;
        let remaining = patron.time_until_eligible_to_request(last_received, now);
        if remaining > chrono::Duration::zero() {
            return Err(MatchmakerError::StillFull { patron: requester.clone(), remaining });
        }
        let (package, fulfiller) = self.db.create_and_assign_package(requester, now).await?;
        match fulfiller {
            Some(fulfiller) => {
                debug!("🤝️ {requester} will receive package [{}] from {}", package.id, fulfiller.patron_id);
                self.call_package_assigned_hook(&package, &fulfiller).await;
                Ok((package, fulfiller))
            },
            None => Err(MatchmakerError::NoFulfillerAvailable { queued: package }),
        }
    }

    async fn call_package_assigned_hook(&self, package: &Package, fulfiller: &Patron) {
        for emitter in &self.producers.package_assigned_producer {
            trace!("🤝️ Notifying package assigned hook subscribers");
            let event = PackageAssignedEvent::new(package.clone(), fulfiller.clone());
            emitter.publish_event(event).await;
        }
    }

    /// The fulfiller reports that the delivery is on its way. Looks up their open package; no state transition is
    /// involved, the caller only needs the package to notify the requester.
    pub async fn acknowledge_en_route(&self, fulfiller: &PatronId) -> Result<Package, MatchmakerError> {
        self.db
            .fetch_open_package_for_fulfiller(fulfiller)
            .await?
            .ok_or_else(|| MatchmakerError::NoActiveDelivery(fulfiller.clone()))
    }

    /// The requester acknowledges receipt of their delivery. The package transitions to the terminal `Received`
    /// state and `delivered_at` is stamped, which restarts the requester's greedy cooldown.
    pub async fn acknowledge_receipt(
        &self,
        requester: &PatronId,
        now: DateTime<Utc>,
    ) -> Result<Package, MatchmakerError> {
        let package = self
            .db
            .fetch_open_package_for_requester(requester)
            .await?
            .ok_or_else(|| MatchmakerError::NoActiveDelivery(requester.clone()))?;
        let package = self.db.mark_received(package.id, now).await?;
        info!("🤝️ {requester} received package [{}]", package.id);
        Ok(package)
    }

    /// Convenience accessor used by status surfaces: the patron's open package as requester, if any.
    pub async fn incoming_package(&self, requester: &PatronId) -> Result<Option<Package>, MatchmakerError> {
        Ok(self.db.fetch_open_package_for_requester(requester).await?)
    }

    /// The patron's open package as fulfiller, if any.
    pub async fn outgoing_package(&self, fulfiller: &PatronId) -> Result<Option<Package>, MatchmakerError> {
        Ok(self.db.fetch_open_package_for_fulfiller(fulfiller).await?)
    }
}

impl<B> MatchmakerApi<B> {
    /// The backend, for callers that need direct read access (e.g. test assertions).
    pub fn db(&self) -> &B {
        &self.db
    }
}
