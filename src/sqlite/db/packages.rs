use chrono::{DateTime, Duration, Utc};
use log::debug;
use sqlx::SqliteConnection;

use crate::{
    db_types::{Package, PatronId},
    traits::DeliveryPoolError,
};

/// Maps a unique violation on one of the "one open package" indexes to the matching domain error. SQLite reports the
/// violation by column ("UNIQUE constraint failed: packages.requester_id"), not by index name. Any other error is
/// passed through as a database error.
fn map_unique_violation(e: sqlx::Error, patron: &PatronId) -> DeliveryPoolError {
    let violation = e
        .as_database_error()
        .filter(|db| db.is_unique_violation())
        .map(|db| db.message().to_string())
        .unwrap_or_default();
    if violation.contains("packages.requester_id") {
        DeliveryPoolError::AlreadyRequesting(patron.clone())
    } else if violation.contains("packages.fulfiller_id") {
        DeliveryPoolError::AlreadyFulfilling(patron.clone())
    } else {
        DeliveryPoolError::from(e)
    }
}

/// Inserts a new `Unassigned` package for the requester.
///
/// The partial unique index on open packages makes the "at most one open package per requester" check and the insert
/// a single atomic step, even across racing transactions.
pub async fn insert_unassigned(
    requester: &PatronId,
    conn: &mut SqliteConnection,
) -> Result<Package, DeliveryPoolError> {
    let package: Package = sqlx::query_as(
        r#"
            INSERT INTO packages (requester_id) VALUES ($1)
            RETURNING *;
        "#,
    )
    .bind(requester.as_str())
    .fetch_one(conn)
    .await
    .map_err(|e| map_unique_violation(e, requester))?;
    debug!("📦️ Package [{}] created for requester {requester}", package.id);
    Ok(package)
}

/// Assigns the fulfiller to an `Unassigned` package. The `WHERE` clause only matches open, unassigned packages, so
/// the state check and the mutation are one atomic step; the fulfiller unique index guards the "already delivering"
/// invariant.
pub async fn assign(
    package_id: i64,
    fulfiller: &PatronId,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Package, DeliveryPoolError> {
    let assigned = sqlx::query_as(
        r#"
            UPDATE packages
            SET fulfiller_id = $1, assigned_at = $2, updated_at = CURRENT_TIMESTAMP
            WHERE id = $3 AND fulfiller_id IS NULL AND received = 0 AND failed = 0
            RETURNING *;
        "#,
    )
    .bind(fulfiller.as_str())
    .bind(now)
    .bind(package_id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| map_unique_violation(e, fulfiller))?;
    match assigned {
        Some(package) => {
            debug!("📦️ Package [{package_id}] assigned to fulfiller {fulfiller}");
            Ok(package)
        },
        None => Err(invalid_transition(package_id, "assign", &mut *conn).await),
    }
}

/// Marks an `Assigned` package as received and stamps `delivered_at`. A package that is unassigned or already
/// terminal is not matched, so delivery-time bookkeeping can never be applied twice.
pub async fn mark_received(
    package_id: i64,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Package, DeliveryPoolError> {
    let received = sqlx::query_as(
        r#"
            UPDATE packages
            SET received = 1, delivered_at = $1, updated_at = CURRENT_TIMESTAMP
            WHERE id = $2 AND fulfiller_id IS NOT NULL AND received = 0 AND failed = 0
            RETURNING *;
        "#,
    )
    .bind(now)
    .bind(package_id)
    .fetch_optional(&mut *conn)
    .await?;
    match received {
        Some(package) => {
            debug!("📦️ Package [{package_id}] delivered and received");
            Ok(package)
        },
        None => Err(invalid_transition(package_id, "mark_received", &mut *conn).await),
    }
}

/// Marks an `Assigned` package as failed.
pub async fn mark_failed(package_id: i64, conn: &mut SqliteConnection) -> Result<Package, DeliveryPoolError> {
    let failed = sqlx::query_as(
        r#"
            UPDATE packages
            SET failed = 1, updated_at = CURRENT_TIMESTAMP
            WHERE id = $1 AND fulfiller_id IS NOT NULL AND received = 0 AND failed = 0
            RETURNING *;
        "#,
    )
    .bind(package_id)
    .fetch_optional(&mut *conn)
    .await?;
    match failed {
        Some(package) => {
            debug!("📦️ Package [{package_id}] marked as failed");
            Ok(package)
        },
        None => Err(invalid_transition(package_id, "mark_failed", &mut *conn).await),
    }
}

/// Distinguishes "no such package" from "package exists but is in the wrong state" after an update matched no rows.
async fn invalid_transition(package_id: i64, op: &str, conn: &mut SqliteConnection) -> DeliveryPoolError {
    match fetch_package(package_id, conn).await {
        Ok(Some(package)) => DeliveryPoolError::InvalidTransition(format!(
            "cannot {op} package [{package_id}] in state {}",
            package.status()
        )),
        Ok(None) => DeliveryPoolError::PackageNotFound(package_id),
        Err(e) => e,
    }
}

pub async fn fetch_package(package_id: i64, conn: &mut SqliteConnection) -> Result<Option<Package>, DeliveryPoolError> {
    let package =
        sqlx::query_as("SELECT * FROM packages WHERE id = $1").bind(package_id).fetch_optional(conn).await?;
    Ok(package)
}

pub async fn open_package_for_requester(
    id: &PatronId,
    conn: &mut SqliteConnection,
) -> Result<Option<Package>, DeliveryPoolError> {
    let package = sqlx::query_as(
        "SELECT * FROM packages WHERE requester_id = $1 AND received = 0 AND failed = 0 LIMIT 1",
    )
    .bind(id.as_str())
    .fetch_optional(conn)
    .await?;
    Ok(package)
}

pub async fn open_package_for_fulfiller(
    id: &PatronId,
    conn: &mut SqliteConnection,
) -> Result<Option<Package>, DeliveryPoolError> {
    let package = sqlx::query_as(
        "SELECT * FROM packages WHERE fulfiller_id = $1 AND received = 0 AND failed = 0 LIMIT 1",
    )
    .bind(id.as_str())
    .fetch_optional(conn)
    .await?;
    Ok(package)
}

/// All `Assigned` packages whose `assigned_at` is strictly older than `now - timeout`, oldest first.
pub async fn stale_packages(
    now: DateTime<Utc>,
    timeout: Duration,
    conn: &mut SqliteConnection,
) -> Result<Vec<Package>, DeliveryPoolError> {
    let cutoff = now - timeout;
    let packages = sqlx::query_as(
        r#"
            SELECT * FROM packages
            WHERE received = 0 AND failed = 0 AND fulfiller_id IS NOT NULL AND assigned_at < $1
            ORDER BY assigned_at ASC;
        "#,
    )
    .bind(cutoff)
    .fetch_all(conn)
    .await?;
    Ok(packages)
}
