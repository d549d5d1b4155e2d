//! Background workers.
//!
//! Two long-lived tasks converge the pool toward "delivered" or "recovered" states:
//!
//! * the [stale monitor](stale_monitor) detects unresponsive fulfillers, penalizes them and re-queues their
//!   requesters;
//! * the [notification dispatcher](dispatcher) drains the outbox through the external [`MessageChannel`] adapter.
//!
//! Both are started with a shutdown receiver from [`shutdown_channel`] and stop gracefully between items: the
//! in-flight transition or delivery always completes before the task exits.
//!
//! [`MessageChannel`]: crate::traits::MessageChannel

pub mod dispatcher;
pub mod stale_monitor;

use tokio::sync::watch;

pub use dispatcher::{start_notification_dispatcher, DispatcherHandle};
pub use stale_monitor::{run_stale_sweep, start_stale_monitor};

/// Creates the shutdown signal shared by the workers. Send `true` (or drop the sender) to stop them.
pub fn shutdown_channel() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    watch::channel(false)
}
