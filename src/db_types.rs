use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Duration, Utc};
use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;

//--------------------------------------      PatronId       ---------------------------------------------------------
/// A lightweight wrapper around the stable external identity of a pool member.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct PatronId(pub String);

impl PatronId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for PatronId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "@{}", self.0)
    }
}

impl<S: Into<String>> From<S> for PatronId {
    fn from(value: S) -> Self {
        Self(value.into())
    }
}

//--------------------------------------       Patron        ---------------------------------------------------------
/// A pool participant. Patrons alternate between requesting a delivery and fulfilling one.
///
/// A patron is created on first contact and is inactive by default. Inactive patrons can neither request a delivery
/// nor be selected as a fulfiller. The `greedy` and `sleepy` cooldown windows throttle how often a patron may request
/// and be selected, respectively. The override flags force the corresponding cooldown off and exist for testing and
/// administration.
#[derive(Debug, Clone, FromRow)]
pub struct Patron {
    pub patron_id: PatronId,
    pub is_active: bool,
    pub last_activated_at: DateTime<Utc>,
    pub greedy_window_secs: i64,
    pub sleepy_window_secs: i64,
    pub force_not_greedy: bool,
    pub force_not_sleeping: bool,
    pub access_token: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Patron {
    /// The remaining cooldown before this patron may request a delivery again.
    ///
    /// The cooldown is measured from the patron's most recent *received* incoming delivery. A patron that has never
    /// received a delivery is measured from `last_activated_at` instead. Returns zero when the patron is eligible.
    pub fn time_until_eligible_to_request(
        &self,
        last_received: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Duration {
        if self.force_not_greedy {
            return Duration::zero();
        }
        let baseline = last_received.unwrap_or(self.last_activated_at);
        let remaining = Duration::seconds(self.greedy_window_secs) - (now - baseline);
        remaining.max(Duration::zero())
    }

    /// True iff the patron is still in the requester cooldown window.
    pub fn is_greedy(&self, last_received: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        self.time_until_eligible_to_request(last_received, now) > Duration::zero()
    }

    /// The remaining cooldown before this patron may be selected as a fulfiller again.
    ///
    /// Measured from the patron's most recent *received* outgoing delivery. A patron that has never completed a
    /// delivery is immediately eligible.
    pub fn time_until_eligible_to_fulfill(
        &self,
        last_delivered: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Duration {
        if self.force_not_sleeping {
            return Duration::zero();
        }
        match last_delivered {
            None => Duration::zero(),
            Some(t) => {
                let remaining = Duration::seconds(self.sleepy_window_secs) - (now - t);
                remaining.max(Duration::zero())
            },
        }
    }

    /// True iff the patron is still in the fulfiller cooldown window.
    pub fn is_sleeping(&self, last_delivered: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        self.time_until_eligible_to_fulfill(last_delivered, now) > Duration::zero()
    }
}

/// Generates a new opaque access token. Tokens are rotated every time a patron accesses their stats.
pub fn new_access_token() -> String {
    rand::thread_rng().sample_iter(&Alphanumeric).take(48).map(char::from).collect()
}

//--------------------------------------  PackageStatusType  ---------------------------------------------------------
/// The derived state of a package. `Received` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PackageStatusType {
    /// The request exists but no fulfiller has been assigned yet.
    Unassigned,
    /// A fulfiller has been assigned and the delivery is outstanding.
    Assigned,
    /// The requester has acknowledged receipt.
    Received,
    /// The delivery was abandoned, typically by the stale monitor.
    Failed,
}

impl Display for PackageStatusType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PackageStatusType::Unassigned => write!(f, "Unassigned"),
            PackageStatusType::Assigned => write!(f, "Assigned"),
            PackageStatusType::Received => write!(f, "Received"),
            PackageStatusType::Failed => write!(f, "Failed"),
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("Invalid package status: {0}")]
pub struct ConversionError(String);

impl FromStr for PackageStatusType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Unassigned" => Ok(Self::Unassigned),
            "Assigned" => Ok(Self::Assigned),
            "Received" => Ok(Self::Received),
            "Failed" => Ok(Self::Failed),
            s => Err(ConversionError(format!("Invalid package status: {s}"))),
        }
    }
}

//--------------------------------------       Package       ---------------------------------------------------------
/// A single request-to-delivery unit between a requester and an (optionally) assigned fulfiller.
///
/// The requester is immutable after creation. The store guarantees that a patron has at most one open (non-terminal)
/// package as requester and at most one as fulfiller at any time.
#[derive(Debug, Clone, FromRow)]
pub struct Package {
    pub id: i64,
    pub requester_id: PatronId,
    pub fulfiller_id: Option<PatronId>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub received: bool,
    pub failed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Package {
    pub fn status(&self) -> PackageStatusType {
        if self.received {
            PackageStatusType::Received
        } else if self.failed {
            PackageStatusType::Failed
        } else if self.fulfiller_id.is_some() {
            PackageStatusType::Assigned
        } else {
            PackageStatusType::Unassigned
        }
    }

    /// An open package is one that has not reached a terminal state yet.
    pub fn is_open(&self) -> bool {
        !self.received && !self.failed
    }

    /// A package is stale iff it is `Assigned` and has been outstanding for longer than `timeout`.
    pub fn is_stale(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        match (self.status(), self.assigned_at) {
            (PackageStatusType::Assigned, Some(assigned_at)) => now - assigned_at > timeout,
            _ => false,
        }
    }
}

//--------------------------------------     Notification    ---------------------------------------------------------
/// A queued outbound message awaiting delivery to a patron through the external channel.
///
/// Notifications are consumed oldest-first by the dispatcher and marked sent after a single attempt. The attempt
/// outcome is recorded in `delivery_attempts` and `last_error` rather than silently discarded; retry policy is a
/// follow-up decision.
#[derive(Debug, Clone, FromRow)]
pub struct Notification {
    pub id: i64,
    pub patron_id: PatronId,
    pub body: String,
    pub sent: bool,
    pub delivery_attempts: i64,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
}

//--------------------------------------      PoolStats      ---------------------------------------------------------
/// Aggregate counters for the pool, surfaced by out-of-scope status pages.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PoolStats {
    pub total_patrons: i64,
    pub active_patrons: i64,
    pub packages_delivered: i64,
}
