use std::sync::Arc;

use cohort_registry::{
    Group, MemberId, MemberInfo, MemberStatus, RegistryCommand, RegistryRequest,
    RegistryResponse, SnapshotSummary,
};
use tracing::{debug, info, warn};

use crate::{ClientConfig, ClientError, RegistryTransport, RpcTransport};

/// Outcome of checking an inbound caller.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Authorization {
    /// The caller is a registered member under our access key.
    Authorized,

    /// The caller must be refused.
    Unauthorized(String),
}

impl Authorization {
    /// Whether the call may proceed.
    #[must_use]
    pub const fn is_authorized(&self) -> bool {
        matches!(self, Self::Authorized)
    }
}

/// Registry access for one member, configured with its group and key.
///
/// Operations that guard the member's own behaviour degrade instead of
/// failing when the registry is unreachable: authorization denies,
/// discovery returns nothing, heartbeats and backups only log.
pub struct CapabilityClient<T>
where
    T: RegistryTransport,
{
    config: Arc<ClientConfig>,
    transport: Arc<T>,
}

impl<T> Clone for CapabilityClient<T>
where
    T: RegistryTransport,
{
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            transport: Arc::clone(&self.transport),
        }
    }
}

impl CapabilityClient<RpcTransport> {
    /// A client for the remote registry named in `config`.
    #[must_use]
    pub fn remote(config: ClientConfig) -> Self {
        let transport = RpcTransport::new(config.registry_addr, config.request_timeout);
        Self::new(config, transport)
    }
}

impl<T> CapabilityClient<T>
where
    T: RegistryTransport,
{
    /// A client sending through `transport`.
    pub fn new(config: ClientConfig, transport: T) -> Self {
        Self {
            config: Arc::new(config),
            transport: Arc::new(transport),
        }
    }

    /// This member's configuration.
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The transport in use.
    #[must_use]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Check that `caller` may call this member.
    ///
    /// Never fails: registry refusals and transport failures both deny.
    pub async fn verify_caller(&self, caller: &MemberId) -> Authorization {
        let command = RegistryCommand::VerifyCrossCall {
            access_key: self.config.access_key.clone(),
            calling: caller.clone(),
            target: self.config.member_id.clone(),
        };

        match self.call(command).await {
            Ok(RegistryResponse::CrossCallVerified { authorized: true }) => {
                debug!("Authorized call from {}", caller);
                Authorization::Authorized
            }
            Ok(RegistryResponse::CrossCallVerified { authorized: false }) => {
                Authorization::Unauthorized("registry denied the call".to_string())
            }
            Ok(other) => Authorization::Unauthorized(format!("unexpected response: {other:?}")),
            Err(ClientError::Registry { message, .. }) => {
                debug!("Refused call from {}: {}", caller, message);
                Authorization::Unauthorized(message)
            }
            Err(e) => {
                warn!("Refusing call from {}: {}", caller, e);
                Authorization::Unauthorized(e.to_string())
            }
        }
    }

    /// Report liveness. Failures are logged and dropped.
    pub async fn heartbeat(&self) {
        if let Err(e) = self.try_heartbeat().await {
            warn!("Heartbeat for {} failed: {}", self.config.member_id, e);
        }
    }

    /// Report liveness.
    ///
    /// # Errors
    ///
    /// Returns the registry's refusal or the transport failure.
    pub async fn try_heartbeat(&self) -> Result<(), ClientError> {
        let command = RegistryCommand::Heartbeat {
            access_key: Some(self.config.access_key.clone()),
            member_id: self.config.member_id.clone(),
        };

        match self.call(command).await? {
            RegistryResponse::HeartbeatRecorded => Ok(()),
            other => Err(unexpected("heartbeat", &other)),
        }
    }

    /// Active members of our group with the given role, in enrollment order.
    ///
    /// Returns an empty list if the registry cannot be queried.
    pub async fn get_available_members(&self, role: &str) -> Vec<MemberId> {
        let command = RegistryCommand::DiscoverMembers {
            role: role.to_string(),
            group_id: self.config.group_id.clone(),
        };

        match self.call(command).await {
            Ok(RegistryResponse::MembersDiscovered { members }) => members
                .into_iter()
                .filter(|member| member.status.is_active())
                .map(|member| member.id)
                .collect(),
            Ok(other) => {
                warn!("{}", unexpected("discover_members", &other));
                Vec::new()
            }
            Err(e) => {
                warn!("Discovery of {} members failed: {}", role, e);
                Vec::new()
            }
        }
    }

    /// Ask the registry to write a snapshot.
    ///
    /// Returns `None` and logs if the backup could not be taken.
    pub async fn trigger_backup(&self) -> Option<SnapshotSummary> {
        let command = RegistryCommand::TriggerBackup {
            access_key: self.config.access_key.clone(),
        };

        match self.call(command).await {
            Ok(RegistryResponse::BackupCompleted { summary }) => {
                info!(
                    "Registry backup written: {} groups, {} members",
                    summary.groups, summary.members
                );
                Some(summary)
            }
            Ok(other) => {
                warn!("{}", unexpected("trigger_backup", &other));
                None
            }
            Err(e) => {
                warn!("Registry backup failed: {}", e);
                None
            }
        }
    }

    /// Report this member's status and resource counters.
    ///
    /// # Errors
    ///
    /// Returns the registry's refusal or the transport failure.
    pub async fn update_status(
        &self,
        status: MemberStatus,
        balance: Option<u64>,
        memory_usage: Option<u64>,
    ) -> Result<(), ClientError> {
        let command = RegistryCommand::UpdateStatus {
            access_key: self.config.access_key.clone(),
            member_id: self.config.member_id.clone(),
            status,
            balance,
            memory_usage,
        };

        match self.call(command).await? {
            RegistryResponse::StatusUpdated => Ok(()),
            other => Err(unexpected("update_status", &other)),
        }
    }

    /// Our group as seen by the registry.
    ///
    /// # Errors
    ///
    /// Returns the transport failure.
    pub async fn get_group_info(&self) -> Result<Option<Group>, ClientError> {
        let command = RegistryCommand::GetGroupInfo {
            access_key: self.config.access_key.clone(),
        };

        match self.call(command).await? {
            RegistryResponse::GroupInfo { group } => Ok(group),
            other => Err(unexpected("get_group_info", &other)),
        }
    }

    /// Members of our group that heartbeated recently.
    ///
    /// # Errors
    ///
    /// Returns the transport failure.
    pub async fn get_group_health(&self) -> Result<Vec<MemberInfo>, ClientError> {
        let command = RegistryCommand::GetGroupHealth {
            group_id: self.config.group_id.clone(),
        };

        match self.call(command).await? {
            RegistryResponse::GroupHealth { members } => Ok(members),
            other => Err(unexpected("get_group_health", &other)),
        }
    }

    /// Send a command as this member, retrying per the configured policy.
    ///
    /// # Errors
    ///
    /// Registry error responses are returned as [`ClientError::Registry`].
    pub async fn call(&self, command: RegistryCommand) -> Result<RegistryResponse, ClientError> {
        let response = self
            .config
            .retry
            .run(|| {
                let request = RegistryRequest::new(self.config.member_id.clone(), command.clone());
                self.transport.send(request)
            })
            .await?;

        match response {
            RegistryResponse::Error { kind, message } => {
                Err(ClientError::Registry { kind, message })
            }
            response => Ok(response),
        }
    }
}

fn unexpected(command: &'static str, response: &RegistryResponse) -> ClientError {
    ClientError::UnexpectedResponse {
        command,
        response: format!("{response:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use cohort_registry::{
        AccessKey, GroupId, ManualClock, Registry, RegistryErrorKind, RegistryService,
        SnapshotManager,
    };
    use cohort_snapshot_memory::MemorySnapshotStore;

    use crate::{LocalTransport, RetryPolicy};

    type Local = LocalTransport<MemorySnapshotStore>;

    struct Unreachable;

    #[async_trait]
    impl RegistryTransport for Unreachable {
        async fn send(&self, _request: RegistryRequest) -> Result<RegistryResponse, ClientError> {
            Err(ClientError::Unreachable("connection refused".to_string()))
        }
    }

    /// Fails the first `failures` sends, then delegates.
    struct Flaky {
        inner: Local,
        failures: usize,
        sends: AtomicUsize,
    }

    #[async_trait]
    impl RegistryTransport for Flaky {
        async fn send(&self, request: RegistryRequest) -> Result<RegistryResponse, ClientError> {
            if self.sends.fetch_add(1, Ordering::SeqCst) < self.failures {
                return Err(ClientError::Unreachable("connection reset".to_string()));
            }
            self.inner.send(request).await
        }
    }

    struct Fixture {
        clock: ManualClock,
        registry: Arc<Registry>,
        transport: Local,
        access_key: AccessKey,
    }

    fn fixture() -> Fixture {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();

        let clock = ManualClock::default();
        let registry = Arc::new(Registry::new(Arc::new(clock.clone())));
        let owner = MemberId::new("owner");

        let group = registry
            .register_group(GroupId::new("team-a"), &owner)
            .unwrap();
        for (member, role) in [
            ("alice-svc", "calendar"),
            ("bob-svc", "calendar"),
            ("carol-svc", "notification"),
        ] {
            registry
                .add_member(
                    &group.group_id,
                    MemberId::new(member),
                    role.to_string(),
                    None,
                    &owner,
                )
                .unwrap();
        }

        let service = RegistryService::new(
            Arc::clone(&registry),
            SnapshotManager::new(MemorySnapshotStore::new()),
        );

        Fixture {
            clock,
            registry,
            transport: LocalTransport::new(service),
            access_key: group.access_key,
        }
    }

    fn config(member: &str, access_key: AccessKey) -> ClientConfig {
        ClientConfig::new(
            "127.0.0.1:1".parse().unwrap(),
            "team-a",
            access_key,
            member,
            "calendar",
        )
    }

    #[tokio::test]
    async fn test_verify_caller() {
        let fixture = fixture();
        let client = CapabilityClient::new(
            config("alice-svc", fixture.access_key.clone()),
            fixture.transport.clone(),
        );

        assert_eq!(
            client.verify_caller(&MemberId::new("bob-svc")).await,
            Authorization::Authorized
        );

        let stranger = client.verify_caller(&MemberId::new("mallory")).await;
        assert!(!stranger.is_authorized());
        assert_eq!(
            stranger,
            Authorization::Unauthorized("member not found: mallory".to_string())
        );
    }

    #[tokio::test]
    async fn test_verify_caller_with_bad_key() {
        let fixture = fixture();
        let client = CapabilityClient::new(
            config("alice-svc", AccessKey::new("forged")),
            fixture.transport,
        );

        assert_eq!(
            client.verify_caller(&MemberId::new("bob-svc")).await,
            Authorization::Unauthorized("access key not recognized".to_string())
        );
    }

    #[tokio::test]
    async fn test_unreachable_registry_degrades_safely() {
        let client = CapabilityClient::new(config("alice-svc", AccessKey::new("k")), Unreachable);

        match client.verify_caller(&MemberId::new("bob-svc")).await {
            Authorization::Unauthorized(reason) => {
                assert!(reason.starts_with("registry unreachable"));
            }
            Authorization::Authorized => panic!("unreachable registry must deny"),
        }
        assert!(client.get_available_members("calendar").await.is_empty());
        assert!(client.trigger_backup().await.is_none());
        assert!(client.try_heartbeat().await.unwrap_err().is_unreachable());
        client.heartbeat().await;
    }

    #[tokio::test]
    async fn test_available_members_only_active() {
        let fixture = fixture();
        let alice = CapabilityClient::new(
            config("alice-svc", fixture.access_key.clone()),
            fixture.transport.clone(),
        );
        let bob = CapabilityClient::new(
            config("bob-svc", fixture.access_key.clone()),
            fixture.transport.clone(),
        );

        assert_eq!(
            alice.get_available_members("calendar").await,
            vec![MemberId::new("alice-svc"), MemberId::new("bob-svc")]
        );

        bob.update_status(MemberStatus::Migrating, Some(10), Some(4096))
            .await
            .unwrap();

        assert_eq!(
            alice.get_available_members("calendar").await,
            vec![MemberId::new("alice-svc")]
        );
        assert!(alice.get_available_members("billing").await.is_empty());

        let bob_info = fixture
            .registry
            .get_member(&MemberId::new("bob-svc"))
            .unwrap();
        assert_eq!(bob_info.balance, 10);
        assert_eq!(bob_info.memory_usage, 4096);
    }

    #[tokio::test]
    async fn test_heartbeat_restores_health() {
        let fixture = fixture();
        let alice = CapabilityClient::new(
            config("alice-svc", fixture.access_key.clone()),
            fixture.transport.clone(),
        );

        fixture.clock.advance(Duration::from_secs(121));
        assert!(alice.get_group_health().await.unwrap().is_empty());

        alice.try_heartbeat().await.unwrap();

        let healthy: Vec<_> = alice
            .get_group_health()
            .await
            .unwrap()
            .into_iter()
            .map(|member| member.id)
            .collect();
        assert_eq!(healthy, vec![MemberId::new("alice-svc")]);
    }

    #[tokio::test]
    async fn test_heartbeat_for_unknown_member() {
        let fixture = fixture();
        let ghost = CapabilityClient::new(
            config("ghost-svc", fixture.access_key.clone()),
            fixture.transport,
        );

        let err = ghost.try_heartbeat().await.unwrap_err();
        assert_eq!(err.kind(), Some(RegistryErrorKind::NotRegistered));
    }

    #[tokio::test]
    async fn test_group_info_and_backup() {
        let fixture = fixture();
        let alice = CapabilityClient::new(
            config("alice-svc", fixture.access_key.clone()),
            fixture.transport.clone(),
        );

        let group = alice.get_group_info().await.unwrap().unwrap();
        assert_eq!(group.owner, MemberId::new("owner"));
        assert_eq!(group.members.len(), 3);

        let summary = alice.trigger_backup().await.unwrap();
        assert_eq!(summary.groups, 1);
        assert_eq!(summary.members, 3);
        assert_eq!(summary.capabilities, 1);

        let forged = CapabilityClient::new(
            config("alice-svc", AccessKey::new("forged")),
            fixture.transport,
        );
        assert!(forged.get_group_info().await.unwrap().is_none());
        assert!(forged.trigger_backup().await.is_none());
    }

    #[tokio::test]
    async fn test_retries_unreachable_registry() {
        let fixture = fixture();
        let mut config = config("alice-svc", fixture.access_key.clone());
        config.retry = RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
        };

        let client = CapabilityClient::new(
            config,
            Flaky {
                inner: fixture.transport,
                failures: 2,
                sends: AtomicUsize::new(0),
            },
        );

        assert!(
            client
                .verify_caller(&MemberId::new("bob-svc"))
                .await
                .is_authorized()
        );
        assert_eq!(client.transport().sends.load(Ordering::SeqCst), 3);
    }
}
