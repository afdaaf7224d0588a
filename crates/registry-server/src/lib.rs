//! The registry process: serves the registry over RPC and snapshots it
//! across restarts.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;
mod handler;
mod node;

pub use error::Error;
pub use handler::RegistryHandler;
pub use node::{NodeConfig, RegistryNode, run_node};
