//! The registry: group registration, enrollment, verification, liveness and
//! discovery over a single serialized state.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::snapshot::RegistrySnapshot;
use crate::{
    AccessKey, CapabilityStore, Clock, Group, GroupDirectory, GroupId, GroupRecord,
    MemberDirectory, MemberId, MemberInfo, MemberStatus, MemberSummary, RegistryError,
    RegistryResult, SystemClock,
};

/// The three stores owned by the registry.
#[derive(Clone, Debug, Default)]
pub(crate) struct RegistryState {
    pub(crate) capabilities: CapabilityStore,
    pub(crate) groups: GroupDirectory,
    pub(crate) members: MemberDirectory,
}

/// Counts of the registry's contents.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct RegistryStats {
    /// Registered groups.
    pub groups: usize,

    /// Enrolled members.
    pub members: usize,

    /// Issued access keys.
    pub capabilities: usize,
}

/// Authoritative directory of groups, members and access keys.
///
/// Every operation takes the state lock once and runs to completion, so no
/// caller can observe a partially applied mutation.
#[derive(Debug)]
pub struct Registry {
    clock: Arc<dyn Clock>,
    state: Mutex<RegistryState>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl Registry {
    /// Create an empty registry reading time from `clock`.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            state: Mutex::new(RegistryState::default()),
        }
    }

    /// Register a new group owned by `caller` and issue its access key.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::AlreadyExists`] if `group_id` is taken; the
    /// existing group is left untouched.
    pub fn register_group(&self, group_id: GroupId, caller: &MemberId) -> RegistryResult<Group> {
        let mut state = self.state.lock();

        if state.groups.contains(&group_id) {
            warn!("Rejected duplicate registration of group {}", group_id);
            return Err(RegistryError::AlreadyExists { group_id });
        }

        let access_key = state.capabilities.issue();
        let record = GroupRecord {
            group_id: group_id.clone(),
            owner: caller.clone(),
            access_key: access_key.clone(),
            created_at: self.clock.now(),
            member_ids: Vec::new(),
        };

        state.capabilities.insert(access_key, caller.clone());
        state.groups.insert(record.clone());

        info!("Registered group {} owned by {}", group_id, caller);

        Ok(record.view(&state.members))
    }

    /// Enroll `member_id` into `group_id` with the given role.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::GroupNotFound`] if the group does not exist
    /// - [`RegistryError::Unauthorized`] if `caller` does not own the group
    /// - [`RegistryError::MemberAlreadyExists`] if the identity is enrolled anywhere
    pub fn add_member(
        &self,
        group_id: &GroupId,
        member_id: MemberId,
        role: String,
        shard_key: Option<String>,
        caller: &MemberId,
    ) -> RegistryResult<()> {
        let mut state = self.state.lock();
        let now = self.clock.now();

        let group = state
            .groups
            .get(group_id)
            .ok_or_else(|| RegistryError::GroupNotFound {
                group_id: group_id.clone(),
            })?;

        if &group.owner != caller {
            warn!(
                "Caller {} attempted to enroll {} into group {} owned by {}",
                caller, member_id, group_id, group.owner
            );
            return Err(RegistryError::Unauthorized {
                group_id: group_id.clone(),
                caller: caller.clone(),
            });
        }

        if state.members.contains(&member_id) {
            return Err(RegistryError::MemberAlreadyExists { member_id });
        }

        let info = MemberInfo::enrolled(member_id.clone(), role, shard_key, now);
        info!(
            "Enrolled member {} with role {} into group {}",
            member_id, info.role, group_id
        );

        state.members.insert(info, Some(group_id.clone()));
        if let Some(group) = state.groups.get_mut(group_id) {
            group.member_ids.push(member_id);
        }

        Ok(())
    }

    /// Check that a cross-service call is backed by a known key and that both
    /// parties are enrolled.
    ///
    /// Membership is checked registry-wide: the two members need not belong to
    /// the key's group.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::InvalidKey`] if the key is unknown, whatever the members
    /// - [`RegistryError::MemberNotFound`] naming the first missing identity
    pub fn verify_cross_call(
        &self,
        access_key: &AccessKey,
        calling: &MemberId,
        target: &MemberId,
    ) -> RegistryResult<bool> {
        let state = self.state.lock();

        if state.capabilities.owner(access_key).is_none() {
            warn!("Cross-call {} -> {} presented an unknown key", calling, target);
            return Err(RegistryError::InvalidKey);
        }

        for member_id in [calling, target] {
            if !state.members.contains(member_id) {
                return Err(RegistryError::MemberNotFound {
                    member_id: member_id.clone(),
                });
            }
        }

        debug!("Verified cross-call {} -> {}", calling, target);
        Ok(true)
    }

    /// Record a liveness signal from `member_id`.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::CallerMismatch`] unless `caller == member_id`; nothing is mutated
    /// - [`RegistryError::NotRegistered`] if the member was never enrolled
    pub fn heartbeat(&self, member_id: &MemberId, caller: &MemberId) -> RegistryResult<()> {
        if caller != member_id {
            warn!("Caller {} sent a heartbeat for {}", caller, member_id);
            return Err(RegistryError::CallerMismatch {
                member_id: member_id.clone(),
                caller: caller.clone(),
            });
        }

        let mut state = self.state.lock();
        let now = self.clock.now();

        let member = state
            .members
            .get_mut(member_id)
            .ok_or_else(|| RegistryError::NotRegistered {
                member_id: member_id.clone(),
            })?;
        member.last_heartbeat = now;

        debug!("Heartbeat from {}", member_id);
        Ok(())
    }

    /// Set a member's status and, when given, its resource counters. Also
    /// counts as a heartbeat.
    ///
    /// Any issued key is accepted, not only the key of the member's own group.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::InvalidKey`] if the key is unknown
    /// - [`RegistryError::MemberNotFound`] if the member is unknown
    pub fn update_status(
        &self,
        access_key: &AccessKey,
        member_id: &MemberId,
        status: MemberStatus,
        balance: Option<u64>,
        memory_usage: Option<u64>,
    ) -> RegistryResult<()> {
        let mut state = self.state.lock();
        let now = self.clock.now();

        if state.capabilities.owner(access_key).is_none() {
            return Err(RegistryError::InvalidKey);
        }

        let member =
            state
                .members
                .get_mut(member_id)
                .ok_or_else(|| RegistryError::MemberNotFound {
                    member_id: member_id.clone(),
                })?;

        member.status = status;
        if let Some(balance) = balance {
            member.balance = balance;
        }
        if let Some(memory_usage) = memory_usage {
            member.memory_usage = memory_usage;
        }
        member.last_heartbeat = now;

        info!("Member {} is now {}", member_id, status);
        Ok(())
    }

    /// Active members of `group_id` whose role is exactly `role`, in enrollment
    /// order. Unknown groups yield an empty list.
    pub fn discover_members(&self, role: &str, group_id: &GroupId) -> Vec<MemberSummary> {
        let state = self.state.lock();

        state.groups.get(group_id).map_or_else(Vec::new, |group| {
            group
                .members(&state.members)
                .filter(|m| m.role == role && m.status.is_active())
                .map(MemberSummary::from)
                .collect()
        })
    }

    /// The group whose access key is `access_key`.
    pub fn get_group_info(&self, access_key: &AccessKey) -> Option<Group> {
        let state = self.state.lock();

        state
            .groups
            .by_access_key(access_key)
            .map(|group| group.view(&state.members))
    }

    /// Members of `group_id` that heartbeated within the health window.
    /// Unknown groups yield an empty list.
    pub fn get_group_health(&self, group_id: &GroupId) -> Vec<MemberInfo> {
        let state = self.state.lock();
        let now = self.clock.now();

        state.groups.get(group_id).map_or_else(Vec::new, |group| {
            group
                .members(&state.members)
                .filter(|m| m.is_healthy(now))
                .cloned()
                .collect()
        })
    }

    /// Look up a single member.
    pub fn get_member(&self, member_id: &MemberId) -> Option<MemberInfo> {
        self.state.lock().members.get(member_id).cloned()
    }

    /// Mark `member_id` as a standby for `primary`. Both must belong to
    /// `group_id`; only the owner may do this.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::GroupNotFound`] if the group does not exist
    /// - [`RegistryError::Unauthorized`] if `caller` does not own the group
    /// - [`RegistryError::MemberNotFound`] if either member is not in the group
    /// - [`RegistryError::InvalidReplica`] if `member_id == primary`
    pub fn assign_replica(
        &self,
        group_id: &GroupId,
        member_id: &MemberId,
        primary: &MemberId,
        caller: &MemberId,
    ) -> RegistryResult<()> {
        let mut state = self.state.lock();

        let group = state
            .groups
            .get(group_id)
            .ok_or_else(|| RegistryError::GroupNotFound {
                group_id: group_id.clone(),
            })?;

        if &group.owner != caller {
            return Err(RegistryError::Unauthorized {
                group_id: group_id.clone(),
                caller: caller.clone(),
            });
        }

        if member_id == primary {
            return Err(RegistryError::InvalidReplica {
                reason: format!("{member_id} cannot be a replica of itself"),
            });
        }

        for id in [member_id, primary] {
            if state.members.group_of(id) != Some(group_id) {
                return Err(RegistryError::MemberNotFound {
                    member_id: id.clone(),
                });
            }
        }

        if let Some(member) = state.members.get_mut(member_id) {
            member.replica_of = Some(primary.clone());
        }

        info!(
            "Member {} is now a replica of {} in group {}",
            member_id, primary, group_id
        );
        Ok(())
    }

    /// The owner bound to `access_key`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidKey`] if the key is unknown.
    pub fn key_owner(&self, access_key: &AccessKey) -> RegistryResult<MemberId> {
        self.state
            .lock()
            .capabilities
            .owner(access_key)
            .cloned()
            .ok_or(RegistryError::InvalidKey)
    }

    /// Counts of groups, members and keys.
    pub fn stats(&self) -> RegistryStats {
        let state = self.state.lock();

        RegistryStats {
            groups: state.groups.len(),
            members: state.members.len(),
            capabilities: state.capabilities.len(),
        }
    }

    /// Flatten all stores into ordered sequences.
    pub fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot::capture(&self.state.lock())
    }

    /// Replace all state with the contents of `snapshot`.
    pub fn restore(&self, snapshot: RegistrySnapshot) {
        let restored = snapshot.into_state();
        info!(
            "Restored registry with {} groups, {} members, {} keys",
            restored.groups.len(),
            restored.members.len(),
            restored.capabilities.len()
        );
        *self.state.lock() = restored;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use crate::ManualClock;

    fn registry() -> (Registry, ManualClock) {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();

        let clock = ManualClock::default();
        (Registry::new(Arc::new(clock.clone())), clock)
    }

    fn owner() -> MemberId {
        MemberId::new("owner")
    }

    fn enroll(registry: &Registry, group: &str, id: &str, role: &str) -> RegistryResult<()> {
        registry.add_member(&group.into(), id.into(), role.to_string(), None, &owner())
    }

    #[test]
    fn test_register_group_issues_key() {
        let (registry, _) = registry();

        let group = registry.register_group("team-a".into(), &owner()).unwrap();

        assert_eq!(group.group_id, GroupId::new("team-a"));
        assert_eq!(group.owner, owner());
        assert!(group.members.is_empty());
        assert!(!group.access_key.as_str().is_empty());
        assert_eq!(registry.key_owner(&group.access_key).unwrap(), owner());
    }

    #[test]
    fn test_duplicate_group_rejected_and_first_unchanged() {
        let (registry, _) = registry();
        let first = registry.register_group("team-a".into(), &owner()).unwrap();

        let result = registry.register_group("team-a".into(), &MemberId::new("intruder"));

        assert_eq!(
            result,
            Err(RegistryError::AlreadyExists {
                group_id: "team-a".into()
            })
        );
        assert_eq!(registry.get_group_info(&first.access_key), Some(first));
        assert_eq!(registry.stats().capabilities, 1);
    }

    #[test]
    fn test_get_group_info_returns_owner() {
        let (registry, _) = registry();
        let a = registry.register_group("a".into(), &"alice".into()).unwrap();
        let b = registry.register_group("b".into(), &"bob".into()).unwrap();

        let alice = registry.get_group_info(&a.access_key).unwrap();
        let bob = registry.get_group_info(&b.access_key).unwrap();

        assert_eq!(alice.owner, MemberId::new("alice"));
        assert_eq!(bob.owner, MemberId::new("bob"));
        assert_eq!(registry.get_group_info(&AccessKey::new("nope")), None);
    }

    #[test]
    fn test_add_member_requires_owner() {
        let (registry, _) = registry();
        registry.register_group("team-a".into(), &owner()).unwrap();

        let result = registry.add_member(
            &"team-a".into(),
            "alice-svc".into(),
            "calendar".into(),
            None,
            &"mallory".into(),
        );

        assert!(matches!(result, Err(RegistryError::Unauthorized { .. })));
        assert!(registry.get_member(&"alice-svc".into()).is_none());
    }

    #[test]
    fn test_add_member_unknown_group() {
        let (registry, _) = registry();

        let result = registry.add_member(
            &"ghost".into(),
            "alice-svc".into(),
            "calendar".into(),
            None,
            &owner(),
        );

        assert!(matches!(result, Err(RegistryError::GroupNotFound { .. })));
    }

    #[test]
    fn test_duplicate_member_rejected_across_groups() {
        let (registry, _) = registry();
        registry.register_group("a".into(), &owner()).unwrap();
        registry.register_group("b".into(), &owner()).unwrap();
        enroll(&registry, "a", "svc", "calendar").unwrap();

        let same_group = enroll(&registry, "a", "svc", "calendar");
        let other_group = enroll(&registry, "b", "svc", "notification");

        assert!(matches!(
            same_group,
            Err(RegistryError::MemberAlreadyExists { .. })
        ));
        assert!(matches!(
            other_group,
            Err(RegistryError::MemberAlreadyExists { .. })
        ));
        assert_eq!(registry.stats().members, 1);
        assert_eq!(registry.get_member(&"svc".into()).unwrap().role, "calendar");
    }

    #[test]
    fn test_discover_filters_role_and_status() {
        let (registry, _) = registry();
        let group = registry.register_group("team-a".into(), &owner()).unwrap();
        for (id, role) in [
            ("cal-1", "calendar"),
            ("notif-1", "notification"),
            ("cal-2", "calendar"),
        ] {
            enroll(&registry, "team-a", id, role).unwrap();
        }

        let found = registry.discover_members("calendar", &"team-a".into());
        assert_eq!(
            found,
            vec![
                MemberSummary {
                    id: "cal-1".into(),
                    status: MemberStatus::Active
                },
                MemberSummary {
                    id: "cal-2".into(),
                    status: MemberStatus::Active
                },
            ]
        );

        registry
            .update_status(
                &group.access_key,
                &"cal-1".into(),
                MemberStatus::Migrating,
                None,
                None,
            )
            .unwrap();

        let found = registry.discover_members("calendar", &"team-a".into());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, MemberId::new("cal-2"));
        let unknown_group = registry.discover_members("calendar", &"ghost".into());
        let wrong_case = registry.discover_members("Calendar", &"team-a".into());
        assert!(unknown_group.is_empty());
        assert!(wrong_case.is_empty());
    }

    #[test]
    fn test_heartbeat_caller_mismatch_never_mutates() {
        let (registry, clock) = registry();
        registry.register_group("team-a".into(), &owner()).unwrap();
        enroll(&registry, "team-a", "alice-svc", "calendar").unwrap();
        let before = registry.get_member(&"alice-svc".into()).unwrap();

        clock.advance(Duration::from_secs(60));
        let result = registry.heartbeat(&"alice-svc".into(), &"bob-svc".into());

        assert!(matches!(result, Err(RegistryError::CallerMismatch { .. })));
        assert_eq!(registry.get_member(&"alice-svc".into()).unwrap(), before);
    }

    #[test]
    fn test_heartbeat_unknown_member() {
        let (registry, _) = registry();

        let result = registry.heartbeat(&"ghost".into(), &"ghost".into());

        assert!(matches!(result, Err(RegistryError::NotRegistered { .. })));
    }

    #[test]
    fn test_health_window() {
        let (registry, clock) = registry();
        registry.register_group("team-a".into(), &owner()).unwrap();
        enroll(&registry, "team-a", "alice-svc", "calendar").unwrap();

        clock.advance(Duration::from_secs(100));
        registry
            .heartbeat(&"alice-svc".into(), &"alice-svc".into())
            .unwrap();

        clock.advance(Duration::from_secs(119));
        assert_eq!(registry.get_group_health(&"team-a".into()).len(), 1);

        clock.advance(Duration::from_secs(1));
        assert!(registry.get_group_health(&"team-a".into()).is_empty());
        assert!(registry.get_group_health(&"ghost".into()).is_empty());
    }

    #[test]
    fn test_scenario_team_a() {
        let (registry, clock) = registry();

        let group = registry.register_group("team-a".into(), &owner()).unwrap();
        assert!(group.members.is_empty());
        assert!(!group.access_key.as_str().is_empty());

        enroll(&registry, "team-a", "alice-svc", "calendar").unwrap();
        assert_eq!(
            registry.discover_members("calendar", &"team-a".into()),
            vec![MemberSummary {
                id: "alice-svc".into(),
                status: MemberStatus::Active
            }]
        );

        clock.advance(Duration::from_secs(121));
        assert!(registry.get_group_health(&"team-a".into()).is_empty());
    }

    #[test]
    fn test_verify_cross_call_bad_key_regardless_of_members() {
        let (registry, _) = registry();
        registry.register_group("team-a".into(), &owner()).unwrap();
        enroll(&registry, "team-a", "a", "calendar").unwrap();
        enroll(&registry, "team-a", "b", "calendar").unwrap();
        let bad = AccessKey::new("bad");

        assert_eq!(
            registry.verify_cross_call(&bad, &"a".into(), &"b".into()),
            Err(RegistryError::InvalidKey)
        );
        assert_eq!(
            registry.verify_cross_call(&bad, &"x".into(), &"y".into()),
            Err(RegistryError::InvalidKey)
        );
    }

    #[test]
    fn test_verify_cross_call_ignores_key_group() {
        let (registry, _) = registry();
        let a = registry.register_group("a".into(), &owner()).unwrap();
        registry.register_group("b".into(), &owner()).unwrap();
        enroll(&registry, "b", "b-1", "calendar").unwrap();
        enroll(&registry, "b", "b-2", "calendar").unwrap();

        // Key of group "a" vouches for two members of group "b".
        assert_eq!(
            registry.verify_cross_call(&a.access_key, &"b-1".into(), &"b-2".into()),
            Ok(true)
        );
        assert_eq!(
            registry.verify_cross_call(&a.access_key, &"b-1".into(), &"ghost".into()),
            Err(RegistryError::MemberNotFound {
                member_id: "ghost".into()
            })
        );
    }

    #[test]
    fn test_update_status_accepts_any_valid_key() {
        let (registry, clock) = registry();
        registry.register_group("a".into(), &owner()).unwrap();
        let b = registry.register_group("b".into(), &"other".into()).unwrap();
        enroll(&registry, "a", "svc", "calendar").unwrap();

        clock.advance(Duration::from_secs(30));
        registry
            .update_status(
                &b.access_key,
                &"svc".into(),
                MemberStatus::Inactive,
                Some(42),
                None,
            )
            .unwrap();

        let info = registry.get_member(&"svc".into()).unwrap();
        assert_eq!(info.status, MemberStatus::Inactive);
        assert_eq!(info.balance, 42);
        assert_eq!(info.memory_usage, 0);
        assert_eq!(info.last_heartbeat, clock.now());
    }

    #[test]
    fn test_update_status_errors() {
        let (registry, _) = registry();
        let group = registry.register_group("a".into(), &owner()).unwrap();

        assert_eq!(
            registry.update_status(
                &AccessKey::new("bad"),
                &"svc".into(),
                MemberStatus::Active,
                None,
                None
            ),
            Err(RegistryError::InvalidKey)
        );
        assert!(matches!(
            registry.update_status(
                &group.access_key,
                &"svc".into(),
                MemberStatus::Active,
                None,
                None
            ),
            Err(RegistryError::MemberNotFound { .. })
        ));
    }

    #[test]
    fn test_assign_replica() {
        let (registry, _) = registry();
        registry.register_group("a".into(), &owner()).unwrap();
        registry.register_group("b".into(), &owner()).unwrap();
        for (group, id) in [("a", "primary"), ("a", "standby"), ("b", "elsewhere")] {
            enroll(&registry, group, id, "calendar").unwrap();
        }
        let group = GroupId::new("a");
        let standby = MemberId::new("standby");

        registry
            .assign_replica(&group, &standby, &"primary".into(), &owner())
            .unwrap();
        assert_eq!(
            registry.get_member(&"standby".into()).unwrap().replica_of,
            Some(MemberId::new("primary"))
        );

        assert!(matches!(
            registry.assign_replica(&group, &standby, &standby, &owner()),
            Err(RegistryError::InvalidReplica { .. })
        ));
        assert!(matches!(
            registry.assign_replica(&group, &standby, &"elsewhere".into(), &owner()),
            Err(RegistryError::MemberNotFound { .. })
        ));
        assert!(matches!(
            registry.assign_replica(&group, &standby, &"primary".into(), &"x".into()),
            Err(RegistryError::Unauthorized { .. })
        ));
    }
}
