use cohort_snapshot::SnapshotStoreError;
use thiserror::Error;

/// Errors that can occur in this crate.
#[derive(Clone, Debug, Error)]
#[error("memory snapshot store error")]
pub struct Error;

impl SnapshotStoreError for Error {}
