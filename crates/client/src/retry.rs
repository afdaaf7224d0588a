use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::ClientError;
use crate::config::millis;

/// Retry schedule for requests that never reached the registry.
///
/// Only [`ClientError::Unreachable`] is retried. An answer from the
/// registry, including an error answer, is final. The default makes a
/// single attempt.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Zero behaves like one.
    pub max_attempts: u32,

    /// Delay before the first retry.
    #[serde(with = "millis")]
    pub initial_backoff: Duration,

    /// Upper bound on any single delay.
    #[serde(with = "millis")]
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Up to `max_attempts` attempts with the default backoff bounds.
    #[must_use]
    pub fn with_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }

    /// Delay after the `failures`-th consecutive failure (1-based): the
    /// initial backoff doubled each time, capped at `max_backoff`.
    #[must_use]
    pub fn backoff(&self, failures: u32) -> Duration {
        let factor = 2u32
            .checked_pow(failures.saturating_sub(1))
            .unwrap_or(u32::MAX);

        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    /// Run `operation` until it succeeds, fails with an answer from the
    /// registry, or the attempts are used up.
    ///
    /// # Errors
    ///
    /// Returns the last error produced by `operation`.
    pub async fn run<T, F, Fut>(&self, mut operation: F) -> Result<T, ClientError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
    {
        let mut failures = 0;

        loop {
            match operation().await {
                Err(e) if e.is_unreachable() && failures + 1 < self.max_attempts => {
                    failures += 1;
                    let delay = self.backoff(failures);
                    debug!("Attempt {} failed ({}), retrying in {:?}", failures, e, delay);
                    tokio::time::sleep(delay).await;
                }
                result => return result,
            }
        }
    }
}
