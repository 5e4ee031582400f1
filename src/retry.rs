//! Bounded retry with exponential backoff for network operations.

use crate::error::Unavailable;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles afterwards.
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Fraction of the delay added as random jitter (0.0 disables it).
    pub jitter: f64,
    pub operation_name: String,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(8),
            jitter: 0.2,
            operation_name: "operation".to_string(),
        }
    }
}

impl RetryPolicy {
    pub fn new(operation_name: impl Into<String>) -> Self {
        Self {
            operation_name: operation_name.into(),
            ..Default::default()
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Backoff before attempt `attempt + 1`, where `attempt` counts failures so far.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let delay = self.base_delay.saturating_mul(2u32.pow(exp)).min(self.max_delay);
        if self.jitter <= 0.0 || delay.is_zero() {
            return delay;
        }
        let extra = rand::thread_rng().gen_range(0.0..=self.jitter);
        delay.mul_f64(1.0 + extra)
    }

    /// Runs `operation` until it succeeds, fails with a non-transient error,
    /// or the attempt budget is spent.
    pub async fn run<F, Fut, T>(&self, operation: F) -> Result<T, Unavailable>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, Unavailable>>,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.max_attempts => {
                    let delay = self.delay_after(attempt);
                    debug!(
                        "{} attempt {}/{} failed, retrying in {:?}: {}",
                        self.operation_name, attempt, self.max_attempts, delay, err
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(name: &str) -> RetryPolicy {
        RetryPolicy::new(name)
            .with_base_delay(Duration::from_millis(1))
            .with_jitter(0.0)
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy::new("dl").with_jitter(0.0);
        assert_eq!(policy.delay_after(1), Duration::from_secs(1));
        assert_eq!(policy.delay_after(2), Duration::from_secs(2));
        assert_eq!(policy.delay_after(3), Duration::from_secs(4));
        assert_eq!(policy.delay_after(10), Duration::from_secs(8));
    }

    #[test]
    fn jitter_stays_within_fraction() {
        let policy = RetryPolicy::new("dl").with_jitter(0.25);
        for _ in 0..50 {
            let d = policy.delay_after(1);
            assert!(d >= Duration::from_secs(1));
            assert!(d <= Duration::from_millis(1250));
        }
    }

    #[tokio::test]
    async fn retries_transient_until_success() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result = fast("flaky")
            .run(move || async move {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(Unavailable::Status(503))
                } else {
                    Ok(n)
                }
            })
            .await;
        assert_eq!(result, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<(), _> = fast("down")
            .with_max_attempts(2)
            .run(move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(Unavailable::Transport("reset".into()))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn final_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<(), _> = fast("auth")
            .run(move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(Unavailable::Status(401))
            })
            .await;
        assert_eq!(result, Err(Unavailable::Status(401)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
