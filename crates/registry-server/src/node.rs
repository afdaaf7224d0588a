use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use cohort_registry::{Registry, RegistryService, SnapshotManager, SnapshotSummary};
use cohort_rpc::{CancellationToken, RpcServer, ServerConfig};
use cohort_snapshot::SnapshotStore;
use cohort_snapshot_fs::FsSnapshotStore;
use tracing::info;

use crate::{Error, RegistryHandler};

/// Settings for a registry process.
#[derive(Clone, Debug)]
pub struct NodeConfig {
    /// Address to accept member connections on.
    pub listen_addr: SocketAddr,

    /// Directory holding the snapshot fields.
    pub snapshot_dir: PathBuf,

    /// How long an open connection may wait for its next request.
    pub request_timeout: Duration,
}

/// A registry bound to its listener, restored from its last snapshot.
pub struct RegistryNode<S>
where
    S: SnapshotStore,
{
    service: RegistryService<S>,
    server: RpcServer<RegistryHandler<S>>,
}

impl<S> RegistryNode<S>
where
    S: SnapshotStore,
{
    /// Restore `registry` from `store`, then bind the listener.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be read or the address cannot
    /// be bound.
    pub async fn start(
        registry: Arc<Registry>,
        store: S,
        listen_addr: SocketAddr,
        request_timeout: Duration,
    ) -> Result<Self, Error> {
        let snapshots = SnapshotManager::new(store);

        match snapshots.restore(&registry).await? {
            Some(summary) => info!(
                "Restored {} groups, {} members, {} keys from snapshot taken at {}",
                summary.groups, summary.members, summary.capabilities, summary.taken_at
            ),
            None => info!("Starting with an empty registry"),
        }

        let service = RegistryService::new(registry, snapshots);
        let server = RpcServer::bind(
            listen_addr,
            RegistryHandler::new(service.clone()),
            ServerConfig {
                request_timeout,
                ..ServerConfig::default()
            },
        )
        .await?;

        Ok(Self { service, server })
    }

    /// The address actually bound.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket has no local address.
    pub fn local_addr(&self) -> Result<SocketAddr, Error> {
        Ok(self.server.local_addr()?)
    }

    /// The service answering requests.
    pub const fn service(&self) -> &RegistryService<S> {
        &self.service
    }

    /// Serve until `shutdown` is cancelled, then write a snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if serving or the final snapshot fails.
    pub async fn run(self, shutdown: CancellationToken) -> Result<SnapshotSummary, Error> {
        self.server.serve(shutdown).await?;

        info!("Writing snapshot before exit");
        let summary = self
            .service
            .snapshots()
            .persist(self.service.registry())
            .await?;

        Ok(summary)
    }
}

/// Run a registry with a filesystem snapshot store until `shutdown` fires.
///
/// # Errors
///
/// Returns an error if startup, serving or the final snapshot fails.
pub async fn run_node(config: NodeConfig, shutdown: CancellationToken) -> Result<(), Error> {
    let store = FsSnapshotStore::new(&config.snapshot_dir);
    let node = RegistryNode::start(
        Arc::new(Registry::default()),
        store,
        config.listen_addr,
        config.request_timeout,
    )
    .await?;

    info!("Registry listening on {}", node.local_addr()?);

    node.run(shutdown).await?;

    info!("Registry stopped");
    Ok(())
}
