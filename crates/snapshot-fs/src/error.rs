use cohort_snapshot::SnapshotStoreError;
use thiserror::Error;

/// Errors that can occur in this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Field name would escape the snapshot directory.
    #[error("invalid field name: {0}")]
    InvalidField(String),

    /// IO operation failed.
    #[error("{0}: {1}")]
    Io(&'static str, #[source] std::io::Error),
}

impl SnapshotStoreError for Error {}
