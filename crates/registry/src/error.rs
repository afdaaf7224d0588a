//! Registry error types

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{GroupId, MemberId};

/// Errors returned by registry operations.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum RegistryError {
    /// A group with this id is already registered.
    #[error("group already exists: {group_id}")]
    AlreadyExists {
        /// The duplicate id.
        group_id: GroupId,
    },

    /// The caller declared an identity other than the member it heartbeats for.
    #[error("caller {caller} cannot heartbeat for member {member_id}")]
    CallerMismatch {
        /// Member named in the request.
        member_id: MemberId,
        /// Identity that sent it.
        caller: MemberId,
    },

    /// No group with this id.
    #[error("group not found: {group_id}")]
    GroupNotFound {
        /// The unknown id.
        group_id: GroupId,
    },

    /// Access key was never issued by this registry.
    #[error("access key not recognized")]
    InvalidKey,

    /// Replica assignment would not form a valid standby relation.
    #[error("invalid replica assignment: {reason}")]
    InvalidReplica {
        /// Why it was rejected.
        reason: String,
    },

    /// The identity is already enrolled somewhere in the registry.
    #[error("member already registered: {member_id}")]
    MemberAlreadyExists {
        /// The duplicate identity.
        member_id: MemberId,
    },

    /// No member with this identity.
    #[error("member not found: {member_id}")]
    MemberNotFound {
        /// The unknown identity.
        member_id: MemberId,
    },

    /// Heartbeat from an identity that was never enrolled.
    #[error("member not registered: {member_id}")]
    NotRegistered {
        /// The unknown identity.
        member_id: MemberId,
    },

    /// Writing or reading a snapshot failed.
    #[error("snapshot error: {reason}")]
    Snapshot {
        /// Underlying failure.
        reason: String,
    },

    /// Caller is not the group's owner.
    #[error("caller {caller} is not the owner of group {group_id}")]
    Unauthorized {
        /// The group being modified.
        group_id: GroupId,
        /// Identity that attempted it.
        caller: MemberId,
    },
}

impl RegistryError {
    /// Returns the kind of this error
    #[must_use]
    pub const fn kind(&self) -> RegistryErrorKind {
        match self {
            Self::AlreadyExists { .. } | Self::MemberAlreadyExists { .. } => {
                RegistryErrorKind::AlreadyExists
            }
            Self::CallerMismatch { .. } => RegistryErrorKind::CallerMismatch,
            Self::GroupNotFound { .. } | Self::MemberNotFound { .. } => {
                RegistryErrorKind::NotFound
            }
            Self::InvalidKey => RegistryErrorKind::InvalidKey,
            Self::InvalidReplica { .. } => RegistryErrorKind::InvalidArgument,
            Self::NotRegistered { .. } => RegistryErrorKind::NotRegistered,
            Self::Snapshot { .. } => RegistryErrorKind::Internal,
            Self::Unauthorized { .. } => RegistryErrorKind::Unauthorized,
        }
    }
}

/// The kind of registry error, as carried over the wire.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub enum RegistryErrorKind {
    /// Duplicate group id or member identity.
    AlreadyExists,

    /// Heartbeat caller is not the member itself.
    CallerMismatch,

    /// Request arguments are inconsistent.
    InvalidArgument,

    /// Access key not recognized.
    InvalidKey,

    /// Registry-side failure unrelated to the request.
    Internal,

    /// Unknown group or member.
    NotFound,

    /// Heartbeat from an unknown member.
    NotRegistered,

    /// Caller lacks ownership.
    Unauthorized,
}

impl fmt::Display for RegistryErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Result type for registry operations
pub type RegistryResult<T> = std::result::Result<T, RegistryError>;
