//! Service registry and trust layer for member services.
//!
//! This crate provides:
//! - The data model (groups, members, access keys)
//! - The Capability Store, Group Directory and Member Directory
//! - The [`Registry`] operation surface over a single serialized state
//! - Wire commands and responses, and the [`RegistryService`] dispatcher
//! - Snapshot and restore through a [`cohort_snapshot::SnapshotStore`]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod capability;
mod clock;
mod directory;
mod error;
mod group;
mod member;
mod registry;
mod request;
mod response;
mod service;
mod snapshot;

pub use capability::{AccessKey, CapabilityStore};
pub use clock::{Clock, ManualClock, SystemClock};
pub use directory::MemberDirectory;
pub use error::{RegistryError, RegistryErrorKind, RegistryResult};
pub use group::{Group, GroupDirectory, GroupId, GroupRecord};
pub use member::{HEALTH_WINDOW, MemberId, MemberInfo, MemberStatus, MemberSummary};
pub use registry::{Registry, RegistryStats};
pub use request::{RegistryCommand, RegistryRequest};
pub use response::RegistryResponse;
pub use service::RegistryService;
pub use snapshot::{
    CAPABILITIES_FIELD, GROUPS_FIELD, MEMBERS_FIELD, RegistrySnapshot, SnapshotError,
    SnapshotManager, SnapshotSummary,
};
