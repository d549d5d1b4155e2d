//! Delivery Pool Engine
//!
//! The delivery pool engine matches members of a peer-to-peer exchange pool ("patrons") who alternate between
//! requesting a delivery and fulfilling one, tracks each request through its lifecycle, and recovers automatically
//! when a fulfiller becomes unresponsive.
//!
//! The library is divided into three main sections:
//! 1. Database management and control ([`mod@sqlite`]). SQLite is the supported backend. You should never need to
//!    access the database directly; use the public API instead. The exception is the data types used in the
//!    database, which are defined in the [`db_types`] module and are public.
//! 2. The public API ([`mod@pool_api`]): patron management and the matchmaking flow. Backends need to implement the
//!    traits in [`mod@traits`] to drive these APIs.
//! 3. The background workers ([`mod@workers`]): the stale request monitor, which penalizes unresponsive fulfillers
//!    and re-queues their requesters, and the notification dispatcher, which drains the outbox through an external
//!    channel adapter.
//!
//! The engine also provides a set of events that can be subscribed to ([`mod@events`]). For example, when the
//! matchmaker assigns a package, a `PackageAssignedEvent` is emitted so the surrounding surface can notify both
//! parties.
pub mod config;
pub mod db_types;
pub mod events;
mod pool_api;
mod sqlite;
pub mod traits;
pub mod workers;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

pub use pool_api::{errors::MatchmakerError, matchmaker_api::MatchmakerApi, patron_api::PatronApi};
pub use sqlite::SqliteDatabase;
