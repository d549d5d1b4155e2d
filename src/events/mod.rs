//! Lifecycle event hooks.
//!
//! Components outside this crate (the command surface, bots, audit sinks) react to pool activity by registering
//! hooks. A hook is an async closure that receives the event and nothing else; handlers are stateless with respect
//! to the engine. The matchmaker publishes [`PackageAssignedEvent`]s and the stale monitor publishes
//! [`PackageFailedEvent`]s.

mod channel;
mod event_types;
mod hooks;

pub use channel::{EventHandler, EventProducer, Handler};
pub use event_types::{PackageAssignedEvent, PackageFailedEvent};
pub use hooks::{EventHandlers, EventHooks, EventProducers};
