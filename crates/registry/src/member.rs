//! Member identities and the per-member record kept by the Member Directory.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Members whose last heartbeat is at least this old are left out of health queries.
pub const HEALTH_WINDOW: Duration = Duration::from_secs(120);

/// Globally unique, restart-stable identity of a member service instance.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemberId(String);

impl MemberId {
    /// Create a member id from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MemberId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for MemberId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Lifecycle status reported for a member.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberStatus {
    /// Serving traffic; eligible for discovery.
    Active,

    /// Enrolled but not serving.
    Inactive,

    /// Moving state to another instance.
    Migrating,
}

impl MemberStatus {
    /// Whether discovery should hand this member out.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Active)
    }
}

impl fmt::Display for MemberStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => f.write_str("active"),
            Self::Inactive => f.write_str("inactive"),
            Self::Migrating => f.write_str("migrating"),
        }
    }
}

impl FromStr for MemberStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            "migrating" => Ok(Self::Migrating),
            other => Err(format!("unknown member status '{other}'")),
        }
    }
}

/// Everything the registry knows about one member.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct MemberInfo {
    /// The member's identity.
    pub id: MemberId,

    /// Free-form role tag used for discovery, e.g. `calendar`.
    pub role: String,

    /// When the member was enrolled.
    pub created_at: DateTime<Utc>,

    /// Last liveness signal (heartbeat or status update).
    pub last_heartbeat: DateTime<Utc>,

    /// Reported status.
    pub status: MemberStatus,

    /// The primary this member is a standby for. Relation only.
    pub replica_of: Option<MemberId>,

    /// Optional partition hint.
    pub shard_key: Option<String>,

    /// Reported resource balance.
    pub balance: u64,

    /// Reported memory usage in bytes.
    pub memory_usage: u64,
}

impl MemberInfo {
    /// A freshly enrolled member: active, zeroed counters, heartbeat at `now`.
    #[must_use]
    pub fn enrolled(
        id: MemberId,
        role: String,
        shard_key: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            role,
            created_at: now,
            last_heartbeat: now,
            status: MemberStatus::Active,
            replica_of: None,
            shard_key,
            balance: 0,
            memory_usage: 0,
        }
    }

    /// Whether the last heartbeat falls inside [`HEALTH_WINDOW`] as seen from `now`.
    ///
    /// A heartbeat stamped after `now` counts as healthy.
    #[must_use]
    pub fn is_healthy(&self, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.last_heartbeat)
            .to_std()
            .map_or(true, |elapsed| elapsed < HEALTH_WINDOW)
    }
}

/// The slice of a member returned by discovery.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct MemberSummary {
    /// The member's identity.
    pub id: MemberId,

    /// Its status at query time.
    pub status: MemberStatus,
}

impl From<&MemberInfo> for MemberSummary {
    fn from(info: &MemberInfo) -> Self {
        Self {
            id: info.id.clone(),
            status: info.status,
        }
    }
}
