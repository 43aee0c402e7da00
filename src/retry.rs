//! Exponential backoff with jitter, shared by the materializer's transient
//! retry loop (§4.6) and the queue publisher's bounded publish retries
//! (§4.3). Mirrors the reconnect backoff shape used by the connection
//! state machine in `queue::connection_state`, generalized to any
//! fallible async operation.

use std::time::Duration;

use rand::Rng;

#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub cap: Duration,
    pub max_attempts: u32,
}

impl BackoffPolicy {
    pub const fn new(base: Duration, cap: Duration, max_attempts: u32) -> Self {
        Self {
            base,
            cap,
            max_attempts,
        }
    }

    /// Backoff before retry attempt `attempt` (1-indexed), doubling the
    /// base each attempt up to `cap`, plus up to 20% jitter.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let doubled = self.base.saturating_mul(1u32.checked_shl(exponent).unwrap_or(u32::MAX));
        let capped = doubled.min(self.cap);
        let jitter_fraction: f64 = rand::thread_rng().gen_range(0.0..0.2);
        capped + capped.mul_f64(jitter_fraction)
    }
}

/// What a failed attempt tells the retry loop to do next.
pub enum Outcome<T, E> {
    Done(T),
    Retry(E),
    Fatal(E),
}

/// Retry `op` according to `policy`, classifying each failure via
/// `classify`. Stops on the first `Fatal` classification, on success, or
/// once `max_attempts` is exhausted (returning the last transient error).
pub async fn retry_with_backoff<T, E, F, Fut, C>(
    policy: BackoffPolicy,
    mut op: F,
    classify: C,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    C: Fn(&E) -> bool,
{
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => {
                let transient = classify(&err);
                if !transient || attempt >= policy.max_attempts {
                    return Err(err);
                }
                let delay = policy.delay_for_attempt(attempt);
                tracing::warn!(attempt, ?delay, "retrying after transient failure");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn delay_doubles_and_caps() {
        let policy = BackoffPolicy::new(Duration::from_secs(1), Duration::from_secs(10), 5);
        let d1 = policy.delay_for_attempt(1);
        let d2 = policy.delay_for_attempt(2);
        let d5 = policy.delay_for_attempt(5);
        assert!(d1 >= Duration::from_secs(1) && d1 < Duration::from_millis(1200));
        assert!(d2 >= Duration::from_secs(2) && d2 < Duration::from_millis(2400));
        assert!(d5 <= Duration::from_millis(12000));
    }

    #[tokio::test]
    async fn retries_until_success_then_stops() {
        let attempts = AtomicU32::new(0);
        let policy = BackoffPolicy::new(Duration::from_millis(1), Duration::from_millis(5), 5);

        let result: Result<u32, &str> = retry_with_backoff(
            policy,
            |_attempt| {
                let count = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if count < 3 {
                        Err("transient")
                    } else {
                        Ok(count)
                    }
                }
            },
            |_| true,
        )
        .await;

        assert_eq!(result, Ok(3));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn fatal_classification_short_circuits() {
        let attempts = AtomicU32::new(0);
        let policy = BackoffPolicy::new(Duration::from_millis(1), Duration::from_millis(5), 5);

        let result: Result<u32, &str> = retry_with_backoff(
            policy,
            |_attempt| {
                attempts.fetch_add(1, Ordering::SeqCst);
                async move { Err("fatal") }
            },
            |_| false,
        )
        .await;

        assert_eq!(result, Err("fatal"));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausts_max_attempts() {
        let attempts = AtomicU32::new(0);
        let policy = BackoffPolicy::new(Duration::from_millis(1), Duration::from_millis(5), 3);

        let result: Result<u32, &str> = retry_with_backoff(
            policy,
            |_attempt| {
                attempts.fetch_add(1, Ordering::SeqCst);
                async move { Err("transient") }
            },
            |_| true,
        )
        .await;

        assert_eq!(result, Err("transient"));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }
}
