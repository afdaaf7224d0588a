use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use cohort_registry::{AccessKey, GroupId, MemberId};
use serde::{Deserialize, Serialize};

use crate::{ClientError, RetryPolicy};

/// Default interval between heartbeats.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Default deadline for one registry request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// A member's own registry configuration.
///
/// Loaded from JSON; durations are given in seconds.
///
/// ```json
/// {
///   "registry_addr": "127.0.0.1:7400",
///   "group_id": "team-a",
///   "access_key": "9f0c…",
///   "member_id": "alice-svc",
///   "role": "calendar",
///   "heartbeat_interval": 30,
///   "retry": { "max_attempts": 3, "initial_backoff": 200, "max_backoff": 2000 }
/// }
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Where the registry listens.
    pub registry_addr: SocketAddr,

    /// The group this member belongs to.
    pub group_id: GroupId,

    /// The group's access key.
    pub access_key: AccessKey,

    /// This member's identity, sent as the caller of every request.
    pub member_id: MemberId,

    /// This member's role tag.
    pub role: String,

    /// This member's partition hint, if any.
    #[serde(default)]
    pub shard_key: Option<String>,

    /// Interval between background heartbeats.
    #[serde(default = "default_heartbeat_interval", with = "secs")]
    pub heartbeat_interval: Duration,

    /// Deadline for one registry request.
    #[serde(default = "default_request_timeout", with = "secs")]
    pub request_timeout: Duration,

    /// Retry schedule for unreachable registries.
    #[serde(default)]
    pub retry: RetryPolicy,
}

impl ClientConfig {
    /// A configuration with default timing and no retries.
    pub fn new(
        registry_addr: SocketAddr,
        group_id: impl Into<GroupId>,
        access_key: AccessKey,
        member_id: impl Into<MemberId>,
        role: impl Into<String>,
    ) -> Self {
        Self {
            registry_addr,
            group_id: group_id.into(),
            access_key,
            member_id: member_id.into(),
            role: role.into(),
            shard_key: None,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            retry: RetryPolicy::default(),
        }
    }

    /// Load a configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if a
    /// duration is zero.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ClientError> {
        let path = path.as_ref();
        let contents = std::fs::read(path).map_err(|source| ClientError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;

        let config: Self = serde_json::from_slice(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the timing fields.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::ConfigInvalid`] if the heartbeat interval or
    /// the request timeout is zero.
    pub fn validate(&self) -> Result<(), ClientError> {
        if self.heartbeat_interval.is_zero() {
            return Err(ClientError::ConfigInvalid(
                "heartbeat_interval must be at least one second".to_string(),
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(ClientError::ConfigInvalid(
                "request_timeout must be at least one second".to_string(),
            ));
        }
        Ok(())
    }
}

const fn default_heartbeat_interval() -> Duration {
    DEFAULT_HEARTBEAT_INTERVAL
}

const fn default_request_timeout() -> Duration {
    DEFAULT_REQUEST_TIMEOUT
}

pub(crate) mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

pub(crate) mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        u64::try_from(duration.as_millis())
            .unwrap_or(u64::MAX)
            .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Write;

    #[test]
    fn test_from_file_with_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "registry_addr": "127.0.0.1:7400",
                "group_id": "team-a",
                "access_key": "abc123",
                "member_id": "alice-svc",
                "role": "calendar"
            }}"#
        )
        .unwrap();

        let config = ClientConfig::from_file(file.path()).unwrap();

        assert_eq!(config.group_id, GroupId::new("team-a"));
        assert_eq!(config.access_key, AccessKey::new("abc123"));
        assert_eq!(config.member_id, MemberId::new("alice-svc"));
        assert_eq!(config.shard_key, None);
        assert_eq!(config.heartbeat_interval, DEFAULT_HEARTBEAT_INTERVAL);
        assert_eq!(config.request_timeout, DEFAULT_REQUEST_TIMEOUT);
        assert_eq!(config.retry, RetryPolicy::default());
    }

    #[test]
    fn test_from_file_overrides() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "registry_addr": "10.0.0.5:9000",
                "group_id": "team-b",
                "access_key": "k",
                "member_id": "bob-svc",
                "role": "notification",
                "shard_key": "eu-1",
                "heartbeat_interval": 5,
                "request_timeout": 2,
                "retry": {{ "max_attempts": 4, "initial_backoff": 50, "max_backoff": 400 }}
            }}"#
        )
        .unwrap();

        let config = ClientConfig::from_file(file.path()).unwrap();

        assert_eq!(config.shard_key.as_deref(), Some("eu-1"));
        assert_eq!(config.heartbeat_interval, Duration::from_secs(5));
        assert_eq!(config.request_timeout, Duration::from_secs(2));
        assert_eq!(config.retry.max_attempts, 4);
        assert_eq!(config.retry.initial_backoff, Duration::from_millis(50));
        assert_eq!(config.retry.max_backoff, Duration::from_millis(400));
    }

    #[test]
    fn test_from_file_errors() {
        let dir = tempfile::tempdir().unwrap();

        let missing = ClientConfig::from_file(dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(missing, ClientError::ConfigIo { .. }));

        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{ not json").unwrap();
        let bad = ClientConfig::from_file(&path).unwrap_err();
        assert!(matches!(bad, ClientError::ConfigParse(_)));
    }

    #[test]
    fn test_from_file_rejects_zero_durations() {
        let dir = tempfile::tempdir().unwrap();

        for field in ["heartbeat_interval", "request_timeout"] {
            let path = dir.path().join(format!("{field}.json"));
            std::fs::write(
                &path,
                format!(
                    r#"{{
                        "registry_addr": "127.0.0.1:7400",
                        "group_id": "team-a",
                        "access_key": "k",
                        "member_id": "alice-svc",
                        "role": "calendar",
                        "{field}": 0
                    }}"#
                ),
            )
            .unwrap();

            match ClientConfig::from_file(&path) {
                Err(ClientError::ConfigInvalid(reason)) => assert!(reason.starts_with(field)),
                other => panic!("zero {field} accepted: {other:?}"),
            }
        }
    }
}
