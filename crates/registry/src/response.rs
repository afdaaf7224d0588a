use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::{
    Group, MemberInfo, MemberSummary, RegistryError, RegistryErrorKind, RegistryStats,
    SnapshotSummary,
};

/// Responses returned by the registry service.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub enum RegistryResponse {
    /// A snapshot was written.
    BackupCompleted {
        /// What it contained.
        summary: SnapshotSummary,
    },

    /// Verification outcome.
    CrossCallVerified {
        /// Always `true` when returned; failures come back as `Error`.
        authorized: bool,
    },

    /// The command failed.
    Error {
        /// Category of the failure.
        kind: RegistryErrorKind,
        /// Human-readable description.
        message: String,
    },

    /// A group was registered.
    GroupRegistered {
        /// The new group, including its access key.
        group: Group,
    },

    /// Result of a group health query.
    GroupHealth {
        /// Healthy members in enrollment order.
        members: Vec<MemberInfo>,
    },

    /// Result of a group lookup by key.
    GroupInfo {
        /// The group, if the key is known.
        group: Option<Group>,
    },

    /// The heartbeat was recorded.
    HeartbeatRecorded,

    /// Result of a member lookup.
    Member {
        /// The member, if known.
        member: Option<MemberInfo>,
    },

    /// The member was enrolled.
    MemberAdded,

    /// Result of a discovery query.
    MembersDiscovered {
        /// Matching members in enrollment order.
        members: Vec<MemberSummary>,
    },

    /// The replica relation was recorded.
    ReplicaAssigned,

    /// Registry counts.
    Stats {
        /// The counts.
        stats: RegistryStats,
    },

    /// The status update was applied.
    StatusUpdated,
}

impl From<RegistryError> for RegistryResponse {
    fn from(error: RegistryError) -> Self {
        Self::Error {
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

impl TryFrom<Bytes> for RegistryResponse {
    type Error = ciborium::de::Error<std::io::Error>;

    fn try_from(bytes: Bytes) -> Result<Self, <Self as TryFrom<Bytes>>::Error> {
        let reader = bytes.as_ref();
        ciborium::de::from_reader(reader)
    }
}

impl TryInto<Bytes> for RegistryResponse {
    type Error = ciborium::ser::Error<std::io::Error>;

    fn try_into(self) -> Result<Bytes, <Self as TryInto<Bytes>>::Error> {
        let mut writer = Vec::new();
        ciborium::ser::into_writer(&self, &mut writer)?;
        Ok(Bytes::from(writer))
    }
}
