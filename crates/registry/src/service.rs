//! Dispatches wire commands onto the registry.

use std::sync::Arc;

use cohort_snapshot::SnapshotStore;
use tracing::{debug, error};

use crate::{
    Registry, RegistryCommand, RegistryError, RegistryRequest, RegistryResponse, SnapshotManager,
};

/// The registry's public operation surface: one request in, one response out.
#[derive(Debug)]
pub struct RegistryService<S>
where
    S: SnapshotStore,
{
    registry: Arc<Registry>,
    snapshots: SnapshotManager<S>,
}

impl<S> Clone for RegistryService<S>
where
    S: SnapshotStore,
{
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            snapshots: self.snapshots.clone(),
        }
    }
}

impl<S> RegistryService<S>
where
    S: SnapshotStore,
{
    /// Serve `registry`, writing backups through `snapshots`.
    pub const fn new(registry: Arc<Registry>, snapshots: SnapshotManager<S>) -> Self {
        Self {
            registry,
            snapshots,
        }
    }

    /// The underlying registry.
    pub const fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// The snapshot manager used for backups.
    pub const fn snapshots(&self) -> &SnapshotManager<S> {
        &self.snapshots
    }

    /// Execute one request. Failures are returned as [`RegistryResponse::Error`].
    pub async fn handle(&self, request: RegistryRequest) -> RegistryResponse {
        let RegistryRequest { caller, command } = request;
        let name = command.name();
        debug!("Handling {} from {}", name, caller);

        let result = match command {
            RegistryCommand::AddMember {
                group_id,
                member_id,
                role,
                shard_key,
            } => self
                .registry
                .add_member(&group_id, member_id, role, shard_key, &caller)
                .map(|()| RegistryResponse::MemberAdded),

            RegistryCommand::AssignReplica {
                group_id,
                member_id,
                primary,
            } => self
                .registry
                .assign_replica(&group_id, &member_id, &primary, &caller)
                .map(|()| RegistryResponse::ReplicaAssigned),

            RegistryCommand::DiscoverMembers { role, group_id } => {
                Ok(RegistryResponse::MembersDiscovered {
                    members: self.registry.discover_members(&role, &group_id),
                })
            }

            RegistryCommand::GetGroupInfo { access_key } => Ok(RegistryResponse::GroupInfo {
                group: self.registry.get_group_info(&access_key),
            }),

            RegistryCommand::GetGroupHealth { group_id } => Ok(RegistryResponse::GroupHealth {
                members: self.registry.get_group_health(&group_id),
            }),

            RegistryCommand::GetMember { member_id } => Ok(RegistryResponse::Member {
                member: self.registry.get_member(&member_id),
            }),

            RegistryCommand::Heartbeat { member_id, .. } => self
                .registry
                .heartbeat(&member_id, &caller)
                .map(|()| RegistryResponse::HeartbeatRecorded),

            RegistryCommand::RegisterGroup { group_id } => self
                .registry
                .register_group(group_id, &caller)
                .map(|group| RegistryResponse::GroupRegistered { group }),

            RegistryCommand::Stats => Ok(RegistryResponse::Stats {
                stats: self.registry.stats(),
            }),

            RegistryCommand::TriggerBackup { access_key } => self.backup(&access_key).await,

            RegistryCommand::UpdateStatus {
                access_key,
                member_id,
                status,
                balance,
                memory_usage,
            } => self
                .registry
                .update_status(&access_key, &member_id, status, balance, memory_usage)
                .map(|()| RegistryResponse::StatusUpdated),

            RegistryCommand::VerifyCrossCall {
                access_key,
                calling,
                target,
            } => self
                .registry
                .verify_cross_call(&access_key, &calling, &target)
                .map(|authorized| RegistryResponse::CrossCallVerified { authorized }),
        };

        result.unwrap_or_else(|e| {
            debug!("{} from {} failed: {}", name, caller, e);
            e.into()
        })
    }

    async fn backup(
        &self,
        access_key: &crate::AccessKey,
    ) -> Result<RegistryResponse, RegistryError> {
        let owner = self.registry.key_owner(access_key)?;
        debug!("Backup requested under key owned by {}", owner);

        self.snapshots
            .persist(&self.registry)
            .await
            .map(|summary| RegistryResponse::BackupCompleted { summary })
            .map_err(|e| {
                error!("Backup failed: {}", e);
                RegistryError::Snapshot {
                    reason: e.to_string(),
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use cohort_snapshot_memory::MemorySnapshotStore;

    use crate::{AccessKey, GroupId, MemberId, RegistryErrorKind};

    fn service() -> (RegistryService<MemorySnapshotStore>, MemorySnapshotStore) {
        let store = MemorySnapshotStore::new();
        let service = RegistryService::new(
            Arc::new(Registry::default()),
            SnapshotManager::new(store.clone()),
        );
        (service, store)
    }

    async fn register(service: &RegistryService<MemorySnapshotStore>, id: &str) -> AccessKey {
        let response = service
            .handle(RegistryRequest::new(
                "owner",
                RegistryCommand::RegisterGroup {
                    group_id: GroupId::new(id),
                },
            ))
            .await;

        match response {
            RegistryResponse::GroupRegistered { group } => group.access_key,
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_duplicate_registration_over_wire() {
        let (service, _) = service();
        register(&service, "team-a").await;

        let response = service
            .handle(RegistryRequest::new(
                "owner",
                RegistryCommand::RegisterGroup {
                    group_id: "team-a".into(),
                },
            ))
            .await;

        assert!(matches!(
            response,
            RegistryResponse::Error {
                kind: RegistryErrorKind::AlreadyExists,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_heartbeat_uses_declared_caller() {
        let (service, _) = service();
        let _ = register(&service, "team-a").await;
        service
            .handle(RegistryRequest::new(
                "owner",
                RegistryCommand::AddMember {
                    group_id: "team-a".into(),
                    member_id: "svc".into(),
                    role: "calendar".into(),
                    shard_key: None,
                },
            ))
            .await;

        let mismatch = service
            .handle(RegistryRequest::new(
                "other",
                RegistryCommand::Heartbeat {
                    access_key: None,
                    member_id: "svc".into(),
                },
            ))
            .await;
        let own = service
            .handle(RegistryRequest::new(
                "svc",
                RegistryCommand::Heartbeat {
                    access_key: Some(AccessKey::new("ignored")),
                    member_id: "svc".into(),
                },
            ))
            .await;

        assert!(matches!(
            mismatch,
            RegistryResponse::Error {
                kind: RegistryErrorKind::CallerMismatch,
                ..
            }
        ));
        assert!(matches!(own, RegistryResponse::HeartbeatRecorded));
    }

    #[tokio::test]
    async fn test_trigger_backup_requires_valid_key() {
        let (service, store) = service();
        let key = register(&service, "team-a").await;

        let rejected = service
            .handle(RegistryRequest::new(
                "owner",
                RegistryCommand::TriggerBackup {
                    access_key: AccessKey::new("bad"),
                },
            ))
            .await;
        assert!(matches!(
            rejected,
            RegistryResponse::Error {
                kind: RegistryErrorKind::InvalidKey,
                ..
            }
        ));
        assert!(store.fields().await.unwrap().is_empty());

        let accepted = service
            .handle(RegistryRequest::new(
                "owner",
                RegistryCommand::TriggerBackup { access_key: key },
            ))
            .await;
        match accepted {
            RegistryResponse::BackupCompleted { summary } => {
                assert_eq!(summary.groups, 1);
                assert_eq!(summary.capabilities, 1);
            }
            other => panic!("unexpected response: {other:?}"),
        }
        assert_eq!(store.fields().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_request_survives_encoding() {
        let request = RegistryRequest::new(
            MemberId::new("svc"),
            RegistryCommand::DiscoverMembers {
                role: "calendar".into(),
                group_id: "team-a".into(),
            },
        );

        let bytes: bytes::Bytes = request.try_into().unwrap();
        let decoded = RegistryRequest::try_from(bytes).unwrap();

        assert_eq!(decoded.caller, MemberId::new("svc"));
        assert_eq!(decoded.command.name(), "discover_members");
    }
}
