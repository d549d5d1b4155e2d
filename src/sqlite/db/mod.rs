//! # SQLite database methods
//!
//! This module contains "low-level" SQLite database interactions.
//!
//! All these interactions are maintained by simple functions (rather than stateful structs) that accept a
//! `&mut SqliteConnection` argument. Callers can obtain a connection from a pool, or create an atomic transaction as
//! the need arises and call through to the functions without any other changes.
use std::env;

use log::info;
use sqlx::{sqlite::SqlitePoolOptions, Error as SqlxError, SqlitePool};

pub mod notifications;
pub mod packages;
pub mod patrons;

const SQLITE_DB_URL: &str = "sqlite://data/pool_store.db";

pub fn db_url() -> String {
    let result = env::var("POOL_DATABASE_URL").unwrap_or_else(|_| {
        info!("POOL_DATABASE_URL is not set. Using the default.");
        SQLITE_DB_URL.to_string()
    });
    info!("Using database URL: {result}");
    result
}

/// Creates the connection pool for the engine.
///
/// The pool holds a single connection. SQLite permits one writer at a time, and handing out multiple pooled
/// connections lets a deferred read-then-write transaction upgrade against a stale WAL snapshot and fail with
/// `SQLITE_BUSY`, so the pool itself serializes access to the store instead.
pub async fn new_pool(url: &str) -> Result<SqlitePool, SqlxError> {
    let pool = SqlitePoolOptions::new().max_connections(1).connect(url).await?;
    Ok(pool)
}
