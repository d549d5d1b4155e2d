//! The stale request monitor.
//!
//! This worker is the system's only automatic recovery path: without it, an unresponsive fulfiller would block their
//! requester forever.
use chrono::{DateTime, Duration, Utc};
use log::*;
use tokio::{sync::watch, task::JoinHandle};

use crate::{
    config::PoolConfig,
    events::{EventProducers, PackageFailedEvent},
    traits::{DeliveryPoolDatabase, DeliveryPoolError, StaleReplacement},
    SqliteDatabase,
};

/// Starts the stale monitor. Do not await the returned JoinHandle directly; signal `shutdown` instead.
pub fn start_stale_monitor(
    db: SqliteDatabase,
    producers: EventProducers,
    config: &PoolConfig,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    let timeout = config.stale_package_timeout;
    let interval = config.worker_interval;
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        info!("🕰️ Stale package monitor started (timeout {}s)", timeout.num_seconds());
        loop {
            tokio::select! {
                _ = timer.tick() => {},
                _ = shutdown.changed() => break,
            }
            match run_stale_sweep(&db, &producers, Utc::now(), timeout).await {
                Ok(replaced) if replaced.is_empty() => {},
                Ok(replaced) => info!("🕰️ {} stale packages replaced", replaced.len()),
                Err(e) => error!("🕰️ Error running stale package sweep: {e}"),
            }
        }
        info!("🕰️ Stale package monitor stopped");
    })
}

/// One monitor cycle: fetch every package that is stale at `now` under `timeout` and recover each one, oldest
/// `assigned_at` first.
///
/// Each recovery is a single atomic transaction (deactivate the fulfiller, queue their notification, fail the
/// package, re-queue the requester), so a package that was delivered or already recovered between the scan and the
/// transition is skipped rather than processed twice.
pub async fn run_stale_sweep<B>(
    db: &B,
    producers: &EventProducers,
    now: DateTime<Utc>,
    timeout: Duration,
) -> Result<Vec<StaleReplacement>, DeliveryPoolError>
where
    B: DeliveryPoolDatabase,
{
    let stale = db.fetch_stale_packages(now, timeout).await?;
    let mut replaced = Vec::with_capacity(stale.len());
    for package in stale {
        match db.replace_stale_package(package.id).await {
            Ok(replacement) => {
                call_package_failed_hook(producers, &replacement).await;
                replaced.push(replacement);
            },
            Err(DeliveryPoolError::InvalidTransition(msg)) => {
                // The package left the Assigned state after the scan. Nothing to recover.
                debug!("🕰️ Skipping package [{}]: {msg}", package.id);
            },
            Err(e) => return Err(e),
        }
    }
    Ok(replaced)
}

async fn call_package_failed_hook(producers: &EventProducers, replacement: &StaleReplacement) {
    for emitter in &producers.package_failed_producer {
        trace!("🕰️ Notifying package failed hook subscribers");
        let event = PackageFailedEvent::new(replacement.failed.clone(), replacement.requeued.clone());
        emitter.publish_event(event).await;
    }
}
