use thiserror::Error;

/// Errors from running the registry process.
#[derive(Debug, Error)]
pub enum Error {
    /// The RPC listener failed.
    #[error(transparent)]
    Rpc(#[from] cohort_rpc::Error),

    /// The snapshot could not be restored or written.
    #[error("snapshot error: {0}")]
    Snapshot(#[from] cohort_registry::SnapshotError),
}
