//! Capability client embedded in member services.
//!
//! Each member holds a [`ClientConfig`] naming the registry, its group, the
//! group's access key and its own identity. [`CapabilityClient`] uses it to
//! check inbound callers, report liveness, find peers by role and request
//! registry backups.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod client;
mod config;
mod error;
mod heartbeat;
mod retry;
mod transport;

pub use client::{Authorization, CapabilityClient};
pub use config::{ClientConfig, DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_REQUEST_TIMEOUT};
pub use error::ClientError;
pub use heartbeat::HeartbeatTask;
pub use retry::RetryPolicy;
pub use transport::{LocalTransport, RegistryTransport, RpcTransport};
