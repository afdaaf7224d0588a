//! Abstract interface for the durable fields a registry snapshot is written to.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

use std::error::Error;
use std::fmt::Debug;

use async_trait::async_trait;
use bytes::Bytes;

/// Marker trait for `SnapshotStore` errors
pub trait SnapshotStoreError: Debug + Error + Send + Sync + 'static {}

/// A set of named durable fields holding opaque bytes.
///
/// A field that was never written (or was deleted) reads back as `None`.
/// Implementations must make `put` durable before returning.
#[async_trait]
pub trait SnapshotStore: Clone + Send + Sync + 'static {
    /// The error type for this store.
    type Error: SnapshotStoreError;

    /// Deletes a field. Deleting a missing field is not an error.
    async fn del<F: Into<String> + Send>(&self, field: F) -> Result<(), Self::Error>;

    /// Lists the names of all fields currently present.
    async fn fields(&self) -> Result<Vec<String>, Self::Error>;

    /// Reads a field.
    async fn get<F: Into<String> + Send>(&self, field: F) -> Result<Option<Bytes>, Self::Error>;

    /// Writes a field, replacing any previous contents.
    async fn put<F: Into<String> + Send>(&self, field: F, bytes: Bytes) -> Result<(), Self::Error>;
}
