use async_trait::async_trait;
use bytes::Bytes;
use cohort_registry::{RegistryRequest, RegistryResponse, RegistryService};
use cohort_rpc::{CodecError, RpcHandler};
use cohort_snapshot::SnapshotStore;
use tracing::{instrument, warn};

/// Decodes registry requests off the wire and runs them on the service.
#[derive(Debug)]
pub struct RegistryHandler<S>
where
    S: SnapshotStore,
{
    service: RegistryService<S>,
}

impl<S> RegistryHandler<S>
where
    S: SnapshotStore,
{
    /// Serve `service`.
    pub const fn new(service: RegistryService<S>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl<S> RpcHandler for RegistryHandler<S>
where
    S: SnapshotStore,
{
    #[instrument(skip(self, message))]
    async fn handle_message(&self, message_id: &str, message: Bytes) -> cohort_rpc::Result<Bytes> {
        let request = RegistryRequest::try_from(message)
            .map_err(|e| CodecError::DeserializationFailed(e.to_string()))?;

        if request.command.name() != message_id {
            warn!(
                "Message id {} does not match command {}",
                message_id,
                request.command.name()
            );
        }

        let response: RegistryResponse = self.service.handle(request).await;

        TryInto::<Bytes>::try_into(response)
            .map_err(|e| CodecError::SerializationFailed(e.to_string()).into())
    }
}
