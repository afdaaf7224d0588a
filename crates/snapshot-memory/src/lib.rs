//! In-memory implementation of snapshot storage for tests and local
//! development. Contents survive only as long as some clone of the store.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;

pub use error::Error;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use cohort_snapshot::SnapshotStore;
use tokio::sync::Mutex;

/// In-memory snapshot store. Clones share the same fields.
#[derive(Clone, Debug, Default)]
pub struct MemorySnapshotStore {
    fields: Arc<Mutex<BTreeMap<String, Bytes>>>,
}

impl MemorySnapshotStore {
    /// Creates a new, empty `MemorySnapshotStore`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    type Error = Error;

    async fn del<F: Into<String> + Send>(&self, field: F) -> Result<(), Self::Error> {
        self.fields.lock().await.remove(&field.into());
        Ok(())
    }

    async fn fields(&self) -> Result<Vec<String>, Self::Error> {
        Ok(self.fields.lock().await.keys().cloned().collect())
    }

    async fn get<F: Into<String> + Send>(&self, field: F) -> Result<Option<Bytes>, Self::Error> {
        Ok(self.fields.lock().await.get(&field.into()).cloned())
    }

    async fn put<F: Into<String> + Send>(&self, field: F, bytes: Bytes) -> Result<(), Self::Error> {
        self.fields.lock().await.insert(field.into(), bytes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_and_get() {
        let store = MemorySnapshotStore::new();
        let value = Bytes::from_static(b"groups");

        store.put("groups", value.clone()).await.unwrap();

        assert_eq!(store.get("groups").await.unwrap(), Some(value));
        assert_eq!(store.get("members").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_del_missing_field() {
        let store = MemorySnapshotStore::new();

        store.del("capabilities").await.unwrap();

        assert!(store.fields().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_clones_share_fields() {
        let store = MemorySnapshotStore::new();
        let clone = store.clone();

        clone.put("members", Bytes::from_static(b"m")).await.unwrap();

        assert_eq!(store.fields().await.unwrap(), vec!["members".to_string()]);
    }
}
