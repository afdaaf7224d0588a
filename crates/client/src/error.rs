use std::path::PathBuf;

use cohort_registry::RegistryErrorKind;
use thiserror::Error;

/// Errors seen by members talking to the registry.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The configuration file could not be read.
    #[error("failed to read config {path}: {source}")]
    ConfigIo {
        /// Path that was read.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid JSON for [`crate::ClientConfig`].
    #[error("invalid config: {0}")]
    ConfigParse(#[from] serde_json::Error),

    /// The configuration parsed but holds an unusable value.
    #[error("invalid config: {0}")]
    ConfigInvalid(String),

    /// The registry answered with something that does not belong to the request.
    #[error("unexpected response to {command}: {response}")]
    UnexpectedResponse {
        /// The command that was sent.
        command: &'static str,
        /// Debug rendering of what came back.
        response: String,
    },

    /// The registry understood the request but refused it.
    #[error("registry rejected request ({kind:?}): {message}")]
    Registry {
        /// Category of the failure.
        kind: RegistryErrorKind,
        /// Description from the registry.
        message: String,
    },

    /// The registry could not be reached or the exchange broke down.
    #[error("registry unreachable: {0}")]
    Unreachable(String),
}

impl ClientError {
    /// Whether the registry never answered.
    #[must_use]
    pub const fn is_unreachable(&self) -> bool {
        matches!(self, Self::Unreachable(_))
    }

    /// The registry-side error kind, if the registry answered with an error.
    #[must_use]
    pub const fn kind(&self) -> Option<RegistryErrorKind> {
        match self {
            Self::Registry { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

impl From<cohort_rpc::Error> for ClientError {
    fn from(error: cohort_rpc::Error) -> Self {
        if error.is_transport() {
            Self::Unreachable(error.to_string())
        } else {
            Self::Registry {
                kind: RegistryErrorKind::Internal,
                message: error.to_string(),
            }
        }
    }
}
