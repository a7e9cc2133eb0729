//! Bounded exponential backoff for publishing

use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{BusError, MessagePublisher};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(500);
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Wait between failed attempt `attempt` (1-based) and the next one:
    /// `min(base * 2^(attempt - 1), max)`, without jitter.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt.saturating_sub(1));
        factor
            .and_then(|f| self.base_delay.checked_mul(f))
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }
}

#[derive(Error, Debug)]
pub enum RetryError {
    /// Shutdown was requested while waiting to retry
    #[error("Publish cancelled after {attempts} attempt(s)")]
    Cancelled { attempts: u32 },

    /// Every attempt failed; carries the last failure
    #[error("Publish failed after {attempts} attempt(s): {source}")]
    Exhausted {
        attempts: u32,
        #[source]
        source: BusError,
    },
}

/// Publish `payload`, retrying failures per `policy`.
///
/// Returns the number of attempts used. Cancellation is only observed while
/// waiting between attempts, never mid-publish.
pub async fn publish_with_retry(
    publisher: &dyn MessagePublisher,
    routing_key: &str,
    payload: &[u8],
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> Result<u32, RetryError> {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        let error = match publisher.publish(routing_key, payload).await {
            Ok(()) => {
                if attempt > 1 {
                    debug!(routing_key, attempt, "Publish succeeded after retry");
                }
                return Ok(attempt);
            },
            Err(e) => e,
        };

        if attempt >= max_attempts {
            return Err(RetryError::Exhausted {
                attempts: attempt,
                source: error,
            });
        }

        let delay = policy.delay_after(attempt);
        warn!(
            routing_key,
            attempt,
            max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Publish failed, backing off"
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RetryError::Cancelled { attempts: attempt }),
            _ = tokio::time::sleep(delay) => {},
        }

        attempt += 1;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::bus::memory::MemoryPublisher;
    use tokio::time::Instant;

    #[test]
    fn test_delay_schedule() {
        let policy = RetryPolicy::default();
        let delays: Vec<u64> = (1..=6).map(|a| policy.delay_after(a).as_millis() as u64).collect();
        assert_eq!(delays, vec![500, 1000, 2000, 4000, 8000, 10_000]);
        assert_eq!(policy.delay_after(64), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_failing_publisher_exhausts_five_attempts() {
        let publisher = MemoryPublisher::new();
        publisher.fail_next(usize::MAX);
        let start = Instant::now();

        let err = publish_with_retry(
            &publisher,
            "jobs.created",
            b"{}",
            &RetryPolicy::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, RetryError::Exhausted { attempts: 5, .. }));

        let offsets: Vec<u128> = publisher
            .attempt_times()
            .into_iter()
            .map(|t| (t - start).as_millis())
            .collect();
        assert_eq!(offsets, vec![0, 500, 1500, 3500, 7500]);
        assert!(publisher.published().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_after_transient_failures() {
        let publisher = MemoryPublisher::new();
        publisher.fail_next(2);

        let attempts = publish_with_retry(
            &publisher,
            "jobs.created",
            b"{\"a\":1}",
            &RetryPolicy::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(attempts, 3);
        assert_eq!(publisher.published().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff_stops_before_next_attempt() {
        let publisher = MemoryPublisher::new();
        publisher.fail_next(usize::MAX);
        let cancel = CancellationToken::new();

        let canceller = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(700)).await;
                cancel.cancel();
            })
        };

        let err = publish_with_retry(
            &publisher,
            "jobs.created",
            b"{}",
            &RetryPolicy::default(),
            &cancel,
        )
        .await
        .unwrap_err();
        canceller.await.unwrap();

        // Attempts at 0ms and 500ms; cancelled during the 1s wait
        assert!(matches!(err, RetryError::Cancelled { attempts: 2 }));
        assert_eq!(publisher.attempt_times().len(), 2);
    }
}
