//! Engine configuration.
//!
//! Everything is read from the environment with documented defaults, so deployments configure the engine the same
//! way they configure the surrounding process.
use std::env;

use chrono::Duration;
use log::*;

use crate::sqlite::db::db_url;

/// The default time, in seconds, an assigned package may stay outstanding before the stale monitor recovers it.
const DEFAULT_STALE_PACKAGE_TIMEOUT_SECS: i64 = 2 * 60 * 60;
/// How long the background workers sleep between cycles. A resource-usage knob, not a correctness requirement.
const DEFAULT_WORKER_INTERVAL_MS: u64 = 100;
/// The per-message bound on the external channel call, so a slow channel cannot stall the notification queue.
const DEFAULT_DELIVERY_TIMEOUT_SECS: u64 = 10;

#[derive(Clone, Debug)]
pub struct PoolConfig {
    pub database_url: String,
    /// An `Assigned` package outstanding for longer than this is considered stale and recovered.
    /// Env: `POOL_STALE_PACKAGE_TIMEOUT_SECS`.
    pub stale_package_timeout: Duration,
    /// The sleep between worker cycles. Env: `POOL_WORKER_INTERVAL_MS`.
    pub worker_interval: std::time::Duration,
    /// The timeout on a single external delivery attempt. Env: `POOL_DELIVERY_TIMEOUT_SECS`.
    pub delivery_timeout: std::time::Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            database_url: String::default(),
            stale_package_timeout: Duration::seconds(DEFAULT_STALE_PACKAGE_TIMEOUT_SECS),
            worker_interval: std::time::Duration::from_millis(DEFAULT_WORKER_INTERVAL_MS),
            delivery_timeout: std::time::Duration::from_secs(DEFAULT_DELIVERY_TIMEOUT_SECS),
        }
    }
}

impl PoolConfig {
    pub fn from_env_or_default() -> Self {
        let database_url = db_url();
        let stale_package_timeout =
            Duration::seconds(env_secs("POOL_STALE_PACKAGE_TIMEOUT_SECS").unwrap_or(DEFAULT_STALE_PACKAGE_TIMEOUT_SECS));
        let worker_interval = std::time::Duration::from_millis(
            env_secs("POOL_WORKER_INTERVAL_MS").map(|v| v as u64).unwrap_or(DEFAULT_WORKER_INTERVAL_MS),
        );
        let delivery_timeout = std::time::Duration::from_secs(
            env_secs("POOL_DELIVERY_TIMEOUT_SECS").map(|v| v as u64).unwrap_or(DEFAULT_DELIVERY_TIMEOUT_SECS),
        );
        Self { database_url, stale_package_timeout, worker_interval, delivery_timeout }
    }
}

fn env_secs(var: &str) -> Option<i64> {
    let raw = env::var(var).ok()?;
    match raw.parse::<i64>() {
        Ok(v) if v > 0 => Some(v),
        Ok(v) => {
            warn!("{var} must be positive, but was {v}. Using the default.");
            None
        },
        Err(_) => {
            warn!("Could not parse {var} (\"{raw}\") as an integer. Using the default.");
            None
        },
    }
}
