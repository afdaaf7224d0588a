//! Flattening the registry into durable fields before a restart and
//! rehydrating it afterwards.

use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use cohort_snapshot::SnapshotStore;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::registry::RegistryState;
use crate::{AccessKey, Group, GroupId, GroupRecord, MemberId, MemberInfo, Registry};

/// Field holding the identity → member sequence.
pub const MEMBERS_FIELD: &str = "members";

/// Field holding the group id → group sequence.
pub const GROUPS_FIELD: &str = "groups";

/// Field holding the access key → owner sequence.
pub const CAPABILITIES_FIELD: &str = "capabilities";

/// The registry flattened to three ordered key-value sequences.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    /// Member directory in identity order.
    pub members: Vec<(MemberId, MemberInfo)>,

    /// Group directory in id order, members embedded.
    pub groups: Vec<(GroupId, Group)>,

    /// Capability store in key order.
    pub capabilities: Vec<(AccessKey, MemberId)>,
}

impl RegistrySnapshot {
    pub(crate) fn capture(state: &RegistryState) -> Self {
        Self {
            members: state
                .members
                .iter()
                .map(|m| (m.id.clone(), m.clone()))
                .collect(),
            groups: state
                .groups
                .iter()
                .map(|g| (g.group_id.clone(), g.view(&state.members)))
                .collect(),
            capabilities: state
                .capabilities
                .entries()
                .map(|(key, owner)| (key.clone(), owner.clone()))
                .collect(),
        }
    }

    /// Rebuild the stores. Members embedded in a group but missing from the
    /// member sequence are recovered from the group's copy.
    pub(crate) fn into_state(self) -> RegistryState {
        let mut state = RegistryState {
            capabilities: self.capabilities.into_iter().collect(),
            ..RegistryState::default()
        };

        for (_, info) in self.members {
            state.members.insert(info, None);
        }

        for (group_id, group) in self.groups {
            for embedded in &group.members {
                let info = state
                    .members
                    .get(&embedded.id)
                    .cloned()
                    .unwrap_or_else(|| embedded.clone());
                state.members.insert(info, Some(group_id.clone()));
            }
            state.groups.insert(GroupRecord::from(&group));
        }

        state
    }

    /// Counts for logging and backup responses.
    #[must_use]
    pub fn summary(&self, taken_at: DateTime<Utc>) -> SnapshotSummary {
        SnapshotSummary {
            groups: self.groups.len(),
            members: self.members.len(),
            capabilities: self.capabilities.len(),
            taken_at,
        }
    }
}

/// What a persisted or restored snapshot contained.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct SnapshotSummary {
    /// Groups written.
    pub groups: usize,

    /// Members written.
    pub members: usize,

    /// Keys written.
    pub capabilities: usize,

    /// When the snapshot was taken.
    pub taken_at: DateTime<Utc>,
}

/// Errors raised while persisting or restoring a snapshot.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// A field could not be decoded.
    #[error("failed to decode field {field}: {reason}")]
    Decode {
        /// The field.
        field: &'static str,
        /// Decoder message.
        reason: String,
    },

    /// A field could not be encoded.
    #[error("failed to encode field {field}: {reason}")]
    Encode {
        /// The field.
        field: &'static str,
        /// Encoder message.
        reason: String,
    },

    /// The backing store failed.
    #[error("snapshot store error: {0}")]
    Store(String),
}

/// Writes registry snapshots to, and restores them from, a [`SnapshotStore`].
///
/// Clones share one lock, so a persist, restore or clear never interleaves
/// with another on the same manager.
#[derive(Clone, Debug)]
pub struct SnapshotManager<S>
where
    S: SnapshotStore,
{
    store: S,
    lock: Arc<Mutex<()>>,
}

impl<S> SnapshotManager<S>
where
    S: SnapshotStore,
{
    /// Create a manager over `store`.
    pub fn new(store: S) -> Self {
        Self {
            store,
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// The backing store.
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Flatten `registry` and write all three fields.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or any store write fails.
    pub async fn persist(&self, registry: &Registry) -> Result<SnapshotSummary, SnapshotError> {
        // Capture under the lock so the last writer also holds the newest state
        let _guard = self.lock.lock().await;
        let snapshot = registry.snapshot();
        let summary = snapshot.summary(Utc::now());

        self.write_field(MEMBERS_FIELD, &snapshot.members).await?;
        self.write_field(GROUPS_FIELD, &snapshot.groups).await?;
        self.write_field(CAPABILITIES_FIELD, &snapshot.capabilities)
            .await?;

        info!(
            "Persisted snapshot: {} groups, {} members, {} keys",
            summary.groups, summary.members, summary.capabilities
        );
        Ok(summary)
    }

    /// Read the fields into `registry` and clear them.
    ///
    /// Missing fields read as empty; if none are present the registry is left
    /// untouched and `None` is returned.
    ///
    /// # Errors
    ///
    /// Returns an error if a field cannot be read or decoded. Fields are only
    /// cleared after a successful restore.
    pub async fn restore(
        &self,
        registry: &Registry,
    ) -> Result<Option<SnapshotSummary>, SnapshotError> {
        let _guard = self.lock.lock().await;
        let members = self.read_field(MEMBERS_FIELD).await?;
        let groups = self.read_field(GROUPS_FIELD).await?;
        let capabilities = self.read_field(CAPABILITIES_FIELD).await?;

        if members.is_none() && groups.is_none() && capabilities.is_none() {
            debug!("No snapshot present, starting with an empty registry");
            return Ok(None);
        }

        let snapshot = RegistrySnapshot {
            members: members.unwrap_or_default(),
            groups: groups.unwrap_or_default(),
            capabilities: capabilities.unwrap_or_default(),
        };
        let summary = snapshot.summary(Utc::now());

        registry.restore(snapshot);
        self.clear_fields().await?;

        Ok(Some(summary))
    }

    /// Delete all three fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn clear(&self) -> Result<(), SnapshotError> {
        let _guard = self.lock.lock().await;
        self.clear_fields().await
    }

    async fn clear_fields(&self) -> Result<(), SnapshotError> {
        for field in [MEMBERS_FIELD, GROUPS_FIELD, CAPABILITIES_FIELD] {
            self.store
                .del(field)
                .await
                .map_err(|e| SnapshotError::Store(e.to_string()))?;
        }
        Ok(())
    }

    async fn write_field<T: Serialize + Sync>(
        &self,
        field: &'static str,
        value: &T,
    ) -> Result<(), SnapshotError> {
        let mut writer = Vec::new();
        ciborium::ser::into_writer(value, &mut writer).map_err(|e| SnapshotError::Encode {
            field,
            reason: e.to_string(),
        })?;

        self.store
            .put(field, Bytes::from(writer))
            .await
            .map_err(|e| SnapshotError::Store(e.to_string()))
    }

    async fn read_field<T: DeserializeOwned>(
        &self,
        field: &'static str,
    ) -> Result<Option<T>, SnapshotError> {
        let Some(bytes) = self
            .store
            .get(field)
            .await
            .map_err(|e| SnapshotError::Store(e.to_string()))?
        else {
            return Ok(None);
        };

        ciborium::de::from_reader(bytes.as_ref())
            .map(Some)
            .map_err(|e| SnapshotError::Decode {
                field,
                reason: e.to_string(),
            })
    }
}
