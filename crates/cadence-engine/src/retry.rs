//! Bounded retry with exponential backoff and jitter for collaborator calls.
//!
//! Every external call runs under a timeout so a flaky dependency can never
//! block an entity indefinitely; timeout counts as a transient failure.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use cadence_core::config::EngineConfig;

use crate::capability::{CapabilityError, CapabilityResult};

// ─── RetryPolicy ──────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub call_timeout: Duration,
}

impl RetryPolicy {
    pub fn from_config(cfg: &EngineConfig) -> Self {
        Self {
            attempts: cfg.retry.attempts.max(1),
            base_delay: Duration::from_millis(cfg.retry.base_delay_ms),
            max_delay: Duration::from_millis(cfg.retry.max_delay_ms),
            call_timeout: cfg.call_timeout(),
        }
    }

    /// Backoff before retry `n` (1-based): `base * 2^(n-1)` capped at
    /// `max_delay`, plus up to 50% jitter so racing workers spread out.
    fn backoff(&self, attempt: u32) -> Duration {
        let exp = self
            .base_delay
            .saturating_mul(1u32 << attempt.saturating_sub(1).min(16));
        let capped = exp.min(self.max_delay);
        let jitter_ms = rand::thread_rng().gen_range(0..=capped.as_millis() as u64 / 2);
        capped + Duration::from_millis(jitter_ms)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

// ─── with_retry ───────────────────────────────────────────────────────────

/// Drive `call` to success or retry exhaustion.
///
/// Permanent errors return immediately. Transient errors (including call
/// timeouts) back off and retry up to `policy.attempts` total attempts; the
/// last transient error is returned once the budget is spent.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    op: &str,
    mut call: F,
) -> CapabilityResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = CapabilityResult<T>>,
{
    let mut last = CapabilityError::Transient(format!("{op}: no attempts made"));
    for attempt in 1..=policy.attempts {
        match tokio::time::timeout(policy.call_timeout, call()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(CapabilityError::Permanent(reason))) => {
                warn!("{op} failed permanently: {reason}");
                return Err(CapabilityError::Permanent(reason));
            }
            Ok(Err(CapabilityError::Transient(reason))) => {
                debug!("{op} attempt {attempt}/{} failed: {reason}", policy.attempts);
                last = CapabilityError::Transient(reason);
            }
            Err(_elapsed) => {
                debug!(
                    "{op} attempt {attempt}/{} timed out after {:?}",
                    policy.attempts, policy.call_timeout
                );
                last = CapabilityError::Transient(format!(
                    "{op} timed out after {:?}",
                    policy.call_timeout
                ));
            }
        }
        if attempt < policy.attempts {
            tokio::time::sleep(policy.backoff(attempt)).await;
        }
    }
    warn!("{op} degraded after {} attempts: {last}", policy.attempts);
    Err(last)
}

// ─── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn quick_policy() -> RetryPolicy {
        RetryPolicy {
            attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
            call_timeout: Duration::from_secs(1),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = with_retry(&quick_policy(), "send", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(CapabilityError::Transient("flaky".into()))
                } else {
                    Ok(42u32)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: CapabilityResult<u32> = with_retry(&quick_policy(), "send", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(CapabilityError::Permanent("bad recipient".into())) }
        })
        .await;
        assert!(matches!(result, Err(CapabilityError::Permanent(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_returns_last_transient() {
        let calls = AtomicU32::new(0);
        let result: CapabilityResult<u32> = with_retry(&quick_policy(), "notify", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move { Err(CapabilityError::Transient(format!("fail {n}"))) }
        })
        .await;
        match result {
            Err(CapabilityError::Transient(reason)) => assert_eq!(reason, "fail 2"),
            other => panic!("expected transient exhaustion, got {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_call_counts_as_transient() {
        let policy = RetryPolicy {
            attempts: 2,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            call_timeout: Duration::from_millis(10),
        };
        let result: CapabilityResult<u32> = with_retry(&policy, "discover", || async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(1)
        })
        .await;
        match result {
            Err(CapabilityError::Transient(reason)) => assert!(reason.contains("timed out")),
            other => panic!("expected timeout, got {other:?}"),
        }
    }
}
