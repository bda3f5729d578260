//! Transport-level retry with exponential backoff.

use super::RemoteSyncClient;
use crate::{error::Result, PendingMutation};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How often and how patiently to retry an unreachable remote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub base_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Never retry.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay after the given failed attempt (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Wraps a client and retries errors that are marked retryable.
///
/// Rejections by the remote are returned immediately.
#[derive(Debug)]
pub struct RetryingClient<C> {
    inner: C,
    policy: RetryPolicy,
}

impl<C> RetryingClient<C> {
    pub fn new(inner: C, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }
}

#[async_trait]
impl<C: RemoteSyncClient> RemoteSyncClient for RetryingClient<C> {
    async fn sync_batch(&self, batch: &[PendingMutation]) -> Result<()> {
        let mut attempt = 1;
        loop {
            match self.inner.sync_batch(batch).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_retryable() && attempt < self.policy.max_attempts => {
                    let delay = self.policy.delay_for(attempt);
                    tracing::debug!(attempt, ?delay, error = %e, "Retrying sync batch");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Fails with the queued errors, then succeeds.
    struct Scripted {
        errors: Mutex<Vec<Error>>,
        calls: AtomicU32,
    }

    impl Scripted {
        fn new(mut errors: Vec<Error>) -> Self {
            errors.reverse();
            Self {
                errors: Mutex::new(errors),
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl RemoteSyncClient for Scripted {
        async fn sync_batch(&self, _batch: &[PendingMutation]) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.errors.lock().unwrap().pop() {
                Some(e) => Err(e),
                None => Ok(()),
            }
        }
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(400));
        assert_eq!(policy.delay_for(4), Duration::from_millis(500));
        assert_eq!(policy.delay_for(40), Duration::from_millis(500));
    }

    #[tokio::test]
    async fn retries_transport_errors() {
        let client = RetryingClient::new(
            Scripted::new(vec![
                Error::Unreachable("reset".into()),
                Error::Unreachable("reset".into()),
            ]),
            fast_policy(3),
        );
        client.sync_batch(&[]).await.unwrap();
        assert_eq!(client.inner().calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let client = RetryingClient::new(
            Scripted::new(vec![
                Error::Unreachable("a".into()),
                Error::Unreachable("b".into()),
            ]),
            fast_policy(2),
        );
        let err = client.sync_batch(&[]).await.unwrap_err();
        assert_eq!(err, Error::Unreachable("b".into()));
        assert_eq!(client.inner().calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn rejection_is_not_retried() {
        let client = RetryingClient::new(
            Scripted::new(vec![Error::Remote("invalid batch".into())]),
            fast_policy(5),
        );
        assert!(client.sync_batch(&[]).await.is_err());
        assert_eq!(client.inner().calls.load(Ordering::SeqCst), 1);
    }
}
