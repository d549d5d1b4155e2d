use chrono::{DateTime, Utc};
use log::{debug, trace};
use sqlx::SqliteConnection;

use crate::{
    db_types::{new_access_token, Patron, PatronId, PoolStats},
    traits::PatronApiError,
};

pub async fn fetch_patron(id: &PatronId, conn: &mut SqliteConnection) -> Result<Option<Patron>, PatronApiError> {
    let patron = sqlx::query_as("SELECT * FROM patrons WHERE patron_id = $1")
        .bind(id.as_str())
        .fetch_optional(conn)
        .await?;
    Ok(patron)
}

/// Inserts a new, inactive patron record. The access token is freshly generated.
async fn insert_patron(id: &PatronId, conn: &mut SqliteConnection) -> Result<Patron, PatronApiError> {
    let patron = sqlx::query_as(
        r#"
            INSERT INTO patrons (patron_id, last_activated_at, access_token)
            VALUES ($1, $2, $3)
            RETURNING *;
        "#,
    )
    .bind(id.as_str())
    .bind(Utc::now())
    .bind(new_access_token())
    .fetch_one(conn)
    .await?;
    debug!("🧑️ Patron {id} has joined the pool (inactive)");
    Ok(patron)
}

/// Fetches the patron, creating an inactive record on first contact. Returns `true` in the second field if the
/// patron was created by this call.
pub async fn fetch_or_create(id: &PatronId, conn: &mut SqliteConnection) -> Result<(Patron, bool), PatronApiError> {
    match fetch_patron(id, conn).await? {
        Some(patron) => Ok((patron, false)),
        None => {
            let patron = insert_patron(id, conn).await?;
            Ok((patron, true))
        },
    }
}

pub async fn activate(id: &PatronId, now: DateTime<Utc>, conn: &mut SqliteConnection) -> Result<Patron, PatronApiError> {
    let patron = sqlx::query_as(
        r#"
            UPDATE patrons
            SET is_active = 1, last_activated_at = $1, updated_at = CURRENT_TIMESTAMP
            WHERE patron_id = $2
            RETURNING *;
        "#,
    )
    .bind(now)
    .bind(id.as_str())
    .fetch_optional(conn)
    .await?
    .ok_or_else(|| PatronApiError::PatronNotFound(id.clone()))?;
    debug!("🧑️ Patron {id} is active");
    Ok(patron)
}

pub async fn deactivate(id: &PatronId, conn: &mut SqliteConnection) -> Result<Patron, PatronApiError> {
    let patron = sqlx::query_as(
        r#"
            UPDATE patrons
            SET is_active = 0, updated_at = CURRENT_TIMESTAMP
            WHERE patron_id = $1
            RETURNING *;
        "#,
    )
    .bind(id.as_str())
    .fetch_optional(conn)
    .await?
    .ok_or_else(|| PatronApiError::PatronNotFound(id.clone()))?;
    debug!("🧑️ Patron {id} is inactive");
    Ok(patron)
}

pub async fn rotate_access_token(id: &PatronId, conn: &mut SqliteConnection) -> Result<Patron, PatronApiError> {
    let patron = sqlx::query_as(
        r#"
            UPDATE patrons
            SET access_token = $1, updated_at = CURRENT_TIMESTAMP
            WHERE patron_id = $2
            RETURNING *;
        "#,
    )
    .bind(new_access_token())
    .bind(id.as_str())
    .fetch_optional(conn)
    .await?
    .ok_or_else(|| PatronApiError::PatronNotFound(id.clone()))?;
    trace!("🧑️ Access token rotated for patron {id}");
    Ok(patron)
}

pub async fn set_cooldown_overrides(
    id: &PatronId,
    force_not_greedy: bool,
    force_not_sleeping: bool,
    conn: &mut SqliteConnection,
) -> Result<Patron, PatronApiError> {
    let patron = sqlx::query_as(
        r#"
            UPDATE patrons
            SET force_not_greedy = $1, force_not_sleeping = $2, updated_at = CURRENT_TIMESTAMP
            WHERE patron_id = $3
            RETURNING *;
        "#,
    )
    .bind(force_not_greedy)
    .bind(force_not_sleeping)
    .bind(id.as_str())
    .fetch_optional(conn)
    .await?
    .ok_or_else(|| PatronApiError::PatronNotFound(id.clone()))?;
    debug!("🧑️ Cooldown overrides for {id}: not_greedy={force_not_greedy}, not_sleeping={force_not_sleeping}");
    Ok(patron)
}

/// The time of the patron's most recent *received* incoming delivery.
pub async fn last_received_delivery(
    id: &PatronId,
    conn: &mut SqliteConnection,
) -> Result<Option<DateTime<Utc>>, PatronApiError> {
    let ts = sqlx::query_scalar(
        "SELECT MAX(delivered_at) FROM packages WHERE requester_id = $1 AND received = 1",
    )
    .bind(id.as_str())
    .fetch_one(conn)
    .await?;
    Ok(ts)
}

/// The time of the patron's most recent *received* outgoing delivery.
pub async fn last_completed_delivery(
    id: &PatronId,
    conn: &mut SqliteConnection,
) -> Result<Option<DateTime<Utc>>, PatronApiError> {
    let ts = sqlx::query_scalar(
        "SELECT MAX(delivered_at) FROM packages WHERE fulfiller_id = $1 AND received = 1",
    )
    .bind(id.as_str())
    .fetch_one(conn)
    .await?;
    Ok(ts)
}

/// Selects one fulfiller candidate for the requester, uniformly at random.
///
/// A candidate is an active patron other than the requester with no open package as fulfiller, whose sleepy cooldown
/// has elapsed at `now` (patrons that have never completed a delivery are immediately eligible, as is anyone with the
/// `force_not_sleeping` override).
pub async fn pick_random_fulfiller(
    requester: &PatronId,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Patron>, PatronApiError> {
    let candidate = sqlx::query_as(
        r#"
            SELECT p.* FROM patrons AS p
            WHERE p.is_active = 1
              AND p.patron_id <> $1
              AND NOT EXISTS (
                SELECT 1 FROM packages AS q
                WHERE q.fulfiller_id = p.patron_id AND q.received = 0 AND q.failed = 0
              )
              AND (
                p.force_not_sleeping = 1
                OR COALESCE((
                    SELECT unixepoch($2) - unixepoch(MAX(q.delivered_at))
                    FROM packages AS q
                    WHERE q.fulfiller_id = p.patron_id AND q.received = 1
                ), p.sleepy_window_secs) >= p.sleepy_window_secs
              )
            ORDER BY RANDOM()
            LIMIT 1;
        "#,
    )
    .bind(requester.as_str())
    .bind(now)
    .fetch_optional(conn)
    .await?;
    Ok(candidate)
}

pub async fn pool_stats(conn: &mut SqliteConnection) -> Result<PoolStats, PatronApiError> {
    let total_patrons: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM patrons").fetch_one(&mut *conn).await?;
    let active_patrons: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM patrons WHERE is_active = 1").fetch_one(&mut *conn).await?;
    let packages_delivered: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM packages WHERE received = 1").fetch_one(&mut *conn).await?;
    Ok(PoolStats { total_patrons, active_patrons, packages_delivered })
}
