//! Groups and the Group Directory.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{AccessKey, MemberDirectory, MemberId, MemberInfo};

/// Creator-chosen, unique group identifier.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(String);

impl GroupId {
    /// Create a group id from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for GroupId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for GroupId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A group as returned to callers, with its members in enrollment order.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Group {
    /// The group's identifier.
    pub group_id: GroupId,

    /// Identity that registered the group.
    pub owner: MemberId,

    /// The group's single access key.
    pub access_key: AccessKey,

    /// When the group was registered.
    pub created_at: DateTime<Utc>,

    /// Members in enrollment order.
    pub members: Vec<MemberInfo>,
}

/// A group as held by the directory: members by id only.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GroupRecord {
    /// The group's identifier.
    pub group_id: GroupId,

    /// Identity that registered the group.
    pub owner: MemberId,

    /// The group's single access key.
    pub access_key: AccessKey,

    /// When the group was registered.
    pub created_at: DateTime<Utc>,

    /// Member ids in enrollment order.
    pub member_ids: Vec<MemberId>,
}

impl GroupRecord {
    /// Materialise the caller-facing view, resolving ids through `members`.
    ///
    /// Ids missing from the directory are skipped.
    pub fn view(&self, members: &MemberDirectory) -> Group {
        Group {
            group_id: self.group_id.clone(),
            owner: self.owner.clone(),
            access_key: self.access_key.clone(),
            created_at: self.created_at,
            members: self
                .member_ids
                .iter()
                .filter_map(|id| members.get(id).cloned())
                .collect(),
        }
    }

    /// Members of this group in enrollment order.
    pub fn members<'a>(
        &'a self,
        members: &'a MemberDirectory,
    ) -> impl Iterator<Item = &'a MemberInfo> + 'a {
        self.member_ids.iter().filter_map(|id| members.get(id))
    }
}

impl From<&Group> for GroupRecord {
    fn from(group: &Group) -> Self {
        Self {
            group_id: group.group_id.clone(),
            owner: group.owner.clone(),
            access_key: group.access_key.clone(),
            created_at: group.created_at,
            member_ids: group.members.iter().map(|m| m.id.clone()).collect(),
        }
    }
}

/// Maps group ids to group records.
#[derive(Clone, Debug, Default)]
pub struct GroupDirectory {
    groups: BTreeMap<GroupId, GroupRecord>,
}

impl GroupDirectory {
    /// Whether `group_id` is taken.
    pub fn contains(&self, group_id: &GroupId) -> bool {
        self.groups.contains_key(group_id)
    }

    /// Look up a group.
    pub fn get(&self, group_id: &GroupId) -> Option<&GroupRecord> {
        self.groups.get(group_id)
    }

    /// Look up a group for mutation.
    pub fn get_mut(&mut self, group_id: &GroupId) -> Option<&mut GroupRecord> {
        self.groups.get_mut(group_id)
    }

    /// The group holding `access_key`, if any.
    pub fn by_access_key(&self, access_key: &AccessKey) -> Option<&GroupRecord> {
        self.groups.values().find(|g| &g.access_key == access_key)
    }

    /// Insert a new group. Callers check [`Self::contains`] first.
    pub fn insert(&mut self, record: GroupRecord) {
        self.groups.insert(record.group_id.clone(), record);
    }

    /// Number of groups.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Whether there are no groups.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Groups in id order.
    pub fn iter(&self) -> impl Iterator<Item = &GroupRecord> {
        self.groups.values()
    }
}
