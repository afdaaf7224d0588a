use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::{AccessKey, GroupId, MemberId, MemberStatus};

/// Commands that can be sent to the registry service.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub enum RegistryCommand {
    /// Enroll a member into a group owned by the caller.
    AddMember {
        /// Target group.
        group_id: GroupId,
        /// Identity to enroll.
        member_id: MemberId,
        /// Role tag used for discovery.
        role: String,
        /// Optional partition hint.
        shard_key: Option<String>,
    },

    /// Mark a member as standby for another member of the same group.
    AssignReplica {
        /// Group both members belong to.
        group_id: GroupId,
        /// The standby.
        member_id: MemberId,
        /// The primary it follows.
        primary: MemberId,
    },

    /// Active members of a group with a given role.
    DiscoverMembers {
        /// Exact role to match.
        role: String,
        /// Group to search.
        group_id: GroupId,
    },

    /// Group bound to an access key.
    GetGroupInfo {
        /// The key.
        access_key: AccessKey,
    },

    /// Members of a group seen within the health window.
    GetGroupHealth {
        /// Group to inspect.
        group_id: GroupId,
    },

    /// A single member record.
    GetMember {
        /// Identity to look up.
        member_id: MemberId,
    },

    /// Liveness signal. The key is accepted but not checked.
    Heartbeat {
        /// Key the member was configured with.
        access_key: Option<AccessKey>,
        /// Member reporting in; must equal the caller.
        member_id: MemberId,
    },

    /// Register a new group owned by the caller.
    RegisterGroup {
        /// Identifier for the new group.
        group_id: GroupId,
    },

    /// Counts of groups, members and keys.
    Stats,

    /// Persist a snapshot of the registry now.
    TriggerBackup {
        /// Any issued key.
        access_key: AccessKey,
    },

    /// Update a member's status and resource counters.
    UpdateStatus {
        /// Any issued key.
        access_key: AccessKey,
        /// Member to update.
        member_id: MemberId,
        /// New status.
        status: MemberStatus,
        /// New balance, if reported.
        balance: Option<u64>,
        /// New memory usage, if reported.
        memory_usage: Option<u64>,
    },

    /// Check that a call between two members is backed by a known key.
    VerifyCrossCall {
        /// Key presented by the caller.
        access_key: AccessKey,
        /// The calling member.
        calling: MemberId,
        /// The member being called.
        target: MemberId,
    },
}

impl RegistryCommand {
    /// Short name for logging.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::AddMember { .. } => "add_member",
            Self::AssignReplica { .. } => "assign_replica",
            Self::DiscoverMembers { .. } => "discover_members",
            Self::GetGroupInfo { .. } => "get_group_info",
            Self::GetGroupHealth { .. } => "get_group_health",
            Self::GetMember { .. } => "get_member",
            Self::Heartbeat { .. } => "heartbeat",
            Self::RegisterGroup { .. } => "register_group",
            Self::Stats => "stats",
            Self::TriggerBackup { .. } => "trigger_backup",
            Self::UpdateStatus { .. } => "update_status",
            Self::VerifyCrossCall { .. } => "verify_cross_call",
        }
    }
}

/// A command together with the identity that issued it.
///
/// The caller is declared by the sender; the transport does not
/// authenticate it.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct RegistryRequest {
    /// Identity issuing the command.
    pub caller: MemberId,

    /// The command.
    pub command: RegistryCommand,
}

impl RegistryRequest {
    /// Pair a command with its caller.
    pub fn new(caller: impl Into<MemberId>, command: RegistryCommand) -> Self {
        Self {
            caller: caller.into(),
            command,
        }
    }
}

impl TryFrom<Bytes> for RegistryRequest {
    type Error = ciborium::de::Error<std::io::Error>;

    fn try_from(bytes: Bytes) -> Result<Self, Self::Error> {
        let reader = bytes.as_ref();
        ciborium::de::from_reader(reader)
    }
}

impl TryInto<Bytes> for RegistryRequest {
    type Error = ciborium::ser::Error<std::io::Error>;

    fn try_into(self) -> Result<Bytes, Self::Error> {
        let mut writer = Vec::new();
        ciborium::ser::into_writer(&self, &mut writer)?;
        Ok(Bytes::from(writer))
    }
}
