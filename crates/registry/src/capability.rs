//! Access keys and the store mapping each key to the identity that owns it.

use std::collections::BTreeMap;
use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::MemberId;

/// Number of random bytes in a freshly issued access key.
const ACCESS_KEY_BYTES: usize = 32;

/// Opaque secret proving membership in a group's trust boundary.
#[derive(Clone, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessKey(String);

impl AccessKey {
    /// Wrap an existing key, e.g. one read from member configuration.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Issue a new key from the thread-local CSPRNG.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; ACCESS_KEY_BYTES];
        rand::thread_rng().fill(&mut bytes);
        Self(hex::encode(bytes))
    }

    /// The key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessKey(<redacted>)")
    }
}

impl From<&str> for AccessKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

/// Maps each issued access key to its owner.
#[derive(Clone, Debug, Default)]
pub struct CapabilityStore {
    entries: BTreeMap<AccessKey, MemberId>,
}

impl CapabilityStore {
    /// Issue a key that is not yet present in the store. Does not insert it.
    pub fn issue(&self) -> AccessKey {
        loop {
            let key = AccessKey::generate();
            if !self.entries.contains_key(&key) {
                return key;
            }
        }
    }

    /// Bind `key` to `owner`.
    pub fn insert(&mut self, key: AccessKey, owner: MemberId) {
        self.entries.insert(key, owner);
    }

    /// The owner of `key`, if the key was issued by this registry.
    pub fn owner(&self, key: &AccessKey) -> Option<&MemberId> {
        self.entries.get(key)
    }

    /// Number of issued keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no key has been issued.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in key order.
    pub fn entries(&self) -> impl Iterator<Item = (&AccessKey, &MemberId)> {
        self.entries.iter()
    }
}

impl FromIterator<(AccessKey, MemberId)> for CapabilityStore {
    fn from_iter<I: IntoIterator<Item = (AccessKey, MemberId)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
