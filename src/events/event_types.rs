use crate::db_types::{Package, Patron};

/// Published by the matchmaker when a package has been assigned to a fulfiller. The usual subscriber enqueues
/// notifications telling both parties about the match.
#[derive(Debug, Clone)]
pub struct PackageAssignedEvent {
    pub package: Package,
    pub fulfiller: Patron,
}

impl PackageAssignedEvent {
    pub fn new(package: Package, fulfiller: Patron) -> Self {
        Self { package, fulfiller }
    }
}

/// Published by the stale monitor when an outstanding package has been abandoned and its requester re-queued.
#[derive(Debug, Clone)]
pub struct PackageFailedEvent {
    /// The failed package.
    pub package: Package,
    /// The replacement package created for the original requester.
    pub requeued: Package,
}

impl PackageFailedEvent {
    pub fn new(package: Package, requeued: Package) -> Self {
        Self { package, requeued }
    }
}
