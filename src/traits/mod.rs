//! Behaviour contracts for delivery pool backends.
//!
//! The traits in this module define what a persistence backend must provide in order to drive the pool:
//!
//! * [`PatronManagement`] covers patron records and the queries needed for the eligibility computations.
//! * [`DeliveryPoolDatabase`] owns the package lifecycle. Every state transition is centralized here and each
//!   mutating operation is a single atomic transaction, so the "at most one open package per requester/fulfiller"
//!   invariants hold even when the matchmaker and the stale monitor race.
//! * [`NotificationManagement`] is the outbox: components enqueue messages here and the dispatcher drains them.
//! * [`MessageChannel`] is the adapter to the external channel the dispatcher delivers through.

mod delivery_pool_database;
mod message_channel;
mod notification_management;
mod patron_management;

pub use delivery_pool_database::{DeliveryPoolDatabase, DeliveryPoolError, StaleReplacement};
pub use message_channel::{MessageChannel, MessageChannelError};
pub use notification_management::{NotificationApiError, NotificationManagement};
pub use patron_management::{PatronApiError, PatronManagement};
