//! How requests reach the registry.

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use cohort_registry::{RegistryRequest, RegistryResponse, RegistryService};
use cohort_rpc::RpcClient;
use cohort_snapshot::SnapshotStore;

use crate::ClientError;

/// A channel to the registry service.
#[async_trait]
pub trait RegistryTransport: Send + Sync + 'static {
    /// Deliver one request and wait for its response.
    ///
    /// Registry-side failures arrive as [`RegistryResponse::Error`]; an `Err`
    /// means the registry never answered.
    async fn send(&self, request: RegistryRequest) -> Result<RegistryResponse, ClientError>;
}

/// Talks to a remote registry over TCP.
#[derive(Debug)]
pub struct RpcTransport {
    client: RpcClient,
}

impl RpcTransport {
    /// A transport for the registry at `addr`. Connects on first use.
    #[must_use]
    pub fn new(addr: SocketAddr, request_timeout: Duration) -> Self {
        let config = cohort_rpc::ClientConfig {
            request_timeout,
            ..cohort_rpc::ClientConfig::default()
        };

        Self {
            client: RpcClient::new(addr, config),
        }
    }

    /// Close the underlying connection, if open.
    pub async fn close(&self) {
        self.client.close().await;
    }
}

#[async_trait]
impl RegistryTransport for RpcTransport {
    async fn send(&self, request: RegistryRequest) -> Result<RegistryResponse, ClientError> {
        let name = request.command.name();

        Ok(self
            .client
            .request::<RegistryRequest, RegistryResponse>(name, request)
            .await?)
    }
}

/// Calls a registry service living in the same process.
#[derive(Clone, Debug)]
pub struct LocalTransport<S>
where
    S: SnapshotStore,
{
    service: RegistryService<S>,
}

impl<S> LocalTransport<S>
where
    S: SnapshotStore,
{
    /// Wrap an in-process service.
    pub const fn new(service: RegistryService<S>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl<S> RegistryTransport for LocalTransport<S>
where
    S: SnapshotStore,
{
    async fn send(&self, request: RegistryRequest) -> Result<RegistryResponse, ClientError> {
        Ok(self.service.handle(request).await)
    }
}
