use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{CapabilityClient, DEFAULT_HEARTBEAT_INTERVAL, RegistryTransport};

/// How long [`HeartbeatTask::shutdown`] waits for the task to finish.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Background task heartbeating for one member at its configured interval.
///
/// The first heartbeat is sent immediately. A zero interval falls back to
/// [`DEFAULT_HEARTBEAT_INTERVAL`].
#[derive(Debug)]
pub struct HeartbeatTask {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl HeartbeatTask {
    /// Start heartbeating with `client`.
    #[must_use]
    pub fn spawn<T>(client: CapabilityClient<T>) -> Self
    where
        T: RegistryTransport,
    {
        Self::spawn_with_token(client, CancellationToken::new())
    }

    /// Start heartbeating with `client` until `cancel` is cancelled.
    #[must_use]
    pub fn spawn_with_token<T>(client: CapabilityClient<T>, cancel: CancellationToken) -> Self
    where
        T: RegistryTransport,
    {
        let mut interval = client.config().heartbeat_interval;
        if interval.is_zero() {
            warn!(
                "Heartbeat interval for {} is zero, using {:?}",
                client.config().member_id,
                DEFAULT_HEARTBEAT_INTERVAL
            );
            interval = DEFAULT_HEARTBEAT_INTERVAL;
        }
        let token = cancel.clone();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        debug!("Sending heartbeat for {}", client.config().member_id);
                        client.heartbeat().await;
                    }
                    () = token.cancelled() => {
                        info!("Heartbeat task received shutdown signal");
                        break;
                    }
                }
            }

            debug!("Heartbeat task exiting");
        });

        Self { cancel, task }
    }

    /// Whether the task has stopped.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop heartbeating and wait for the task to exit.
    pub async fn shutdown(self) {
        self.cancel.cancel();

        match tokio::time::timeout(SHUTDOWN_TIMEOUT, self.task).await {
            Ok(Ok(())) => {
                debug!("Heartbeat task shut down cleanly");
            }
            Ok(Err(e)) => {
                error!("Heartbeat task panicked: {}", e);
            }
            Err(_) => {
                error!("Heartbeat task did not shut down within timeout");
            }
        }
    }
}
