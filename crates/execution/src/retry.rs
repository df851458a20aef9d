//! Bounded retry with jittered exponential backoff.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// Errors that can tell whether another attempt may succeed.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

impl Transient for lb_lp_protocols::ChainError {
    fn is_transient(&self) -> bool {
        self.is_retryable()
    }
}

/// Simple jittered exponential backoff policy for async operations.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter_pct: f64,
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, base_delay_ms: u64, max_delay_ms: u64, jitter_pct: f64) -> Self {
        let clamped_attempts = max_attempts.max(1);
        let clamped_base = base_delay_ms.max(1);
        let clamped_max_delay = max_delay_ms.max(clamped_base);
        let clamped_jitter = jitter_pct.clamp(0.0, 1.0);
        Self {
            max_attempts: clamped_attempts,
            base_delay_ms: clamped_base,
            max_delay_ms: clamped_max_delay,
            jitter_pct: clamped_jitter,
        }
    }

    /// Delay to wait after the `attempt`-th failure (zero-based).
    pub fn next_delay(&self, attempt: usize) -> Duration {
        let exp = 2_u64.saturating_pow(attempt as u32);
        let delay = self.base_delay_ms.saturating_mul(exp).min(self.max_delay_ms);
        let jittered = if self.jitter_pct > 0.0 {
            let spread = (delay as f64 * self.jitter_pct) as i64;
            let delta = rand::rng().random_range(-spread..=spread);
            delay.saturating_add_signed(delta)
        } else {
            delay
        };
        Duration::from_millis(jittered)
    }

    /// Runs `op` until it succeeds, fails permanently, or attempts run out.
    /// Non-transient errors are returned immediately.
    pub async fn retry_transient<F, Fut, T, E>(&self, what: &str, mut op: F) -> Result<T, E>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Transient + std::fmt::Display,
    {
        let mut attempt = 0;
        loop {
            match op(attempt).await {
                Ok(val) => return Ok(val),
                Err(err) => {
                    attempt += 1;
                    if !err.is_transient() || attempt >= self.max_attempts {
                        return Err(err);
                    }
                    let delay = self.next_delay(attempt - 1);
                    warn!(
                        what,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient failure, retrying"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5, 500, 10_000, 0.2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lb_lp_protocols::ChainError;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_new_clamps_input_parameters() {
        let policy = RetryPolicy::new(0, 0, 0, 2.0);
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.base_delay_ms, 1);
        assert_eq!(policy.max_delay_ms, 1);
        assert_eq!(policy.jitter_pct, 1.0);
    }

    #[test]
    fn test_next_delay_doubles_and_caps() {
        let policy = RetryPolicy::new(5, 100, 500, 0.0);
        let delays: Vec<_> = (0..5).map(|attempt| policy.next_delay(attempt)).collect();
        assert_eq!(delays[0], Duration::from_millis(100));
        assert_eq!(delays[1], Duration::from_millis(200));
        assert_eq!(delays[2], Duration::from_millis(400));
        assert_eq!(delays[3], Duration::from_millis(500));
        assert_eq!(delays[4], Duration::from_millis(500));
    }

    #[test]
    fn test_jitter_stays_within_spread() {
        let policy = RetryPolicy::new(3, 1_000, 1_000, 0.2);
        for _ in 0..50 {
            let delay = policy.next_delay(0).as_millis();
            assert!((800..=1_200).contains(&delay));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_until_success() {
        let policy = RetryPolicy::new(3, 10, 10, 0.0);
        let attempts = Arc::new(AtomicUsize::new(0));

        let result: Result<&'static str, ChainError> = policy
            .retry_transient("read", |attempt| {
                let attempts = attempts.clone();
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    if attempt < 2 {
                        Err(ChainError::Rpc("timeout".into()))
                    } else {
                        Ok("ok")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "ok");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_after_max_attempts() {
        let policy = RetryPolicy::new(2, 5, 5, 0.0);
        let attempts = Arc::new(AtomicUsize::new(0));

        let result: Result<(), ChainError> = policy
            .retry_transient("read", |_| {
                let attempts = attempts.clone();
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Err(ChainError::Rpc("down".into()))
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_does_not_retry_permanent_errors() {
        let policy = RetryPolicy::new(5, 5, 5, 0.0);
        let attempts = Arc::new(AtomicUsize::new(0));

        let result: Result<(), ChainError> = policy
            .retry_transient("write", |_| {
                let attempts = attempts.clone();
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Err(ChainError::Contract("bad call".into()))
                }
            })
            .await;

        assert!(matches!(result, Err(ChainError::Contract(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
