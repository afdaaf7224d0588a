//! The Member Directory: the single source of truth for member records.

use std::collections::{BTreeMap, HashMap};

use crate::{GroupId, MemberId, MemberInfo};

/// Maps member identities to their records, plus the group each belongs to.
#[derive(Clone, Debug, Default)]
pub struct MemberDirectory {
    members: BTreeMap<MemberId, MemberInfo>,
    memberships: HashMap<MemberId, GroupId>,
}

impl MemberDirectory {
    /// Whether `id` is enrolled anywhere.
    pub fn contains(&self, id: &MemberId) -> bool {
        self.members.contains_key(id)
    }

    /// Look up a member.
    pub fn get(&self, id: &MemberId) -> Option<&MemberInfo> {
        self.members.get(id)
    }

    /// Look up a member for mutation.
    pub fn get_mut(&mut self, id: &MemberId) -> Option<&mut MemberInfo> {
        self.members.get_mut(id)
    }

    /// The group `id` was enrolled into.
    pub fn group_of(&self, id: &MemberId) -> Option<&GroupId> {
        self.memberships.get(id)
    }

    /// Record a member. A member without a group is kept in the directory only.
    pub fn insert(&mut self, info: MemberInfo, group_id: Option<GroupId>) {
        if let Some(group_id) = group_id {
            self.memberships.insert(info.id.clone(), group_id);
        }
        self.members.insert(info.id.clone(), info);
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether there are no members.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Members in id order.
    pub fn iter(&self) -> impl Iterator<Item = &MemberInfo> {
        self.members.values()
    }
}
