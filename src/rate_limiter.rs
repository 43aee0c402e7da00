//! Fixed-window admission control atop the counter store (§4.2).
//!
//! Structurally this is the same per-key fixed-window check as the P2P
//! rate limiter this pipeline's daemon ancestor used for message types,
//! generalized from an in-process `HashMap` to the shared Redis counter
//! store so multiple ingest server processes share one limit per
//! principal, and deliberately fail-open: availability of the vote path
//! outranks a brief lapse in throttling.

use std::sync::Arc;
use std::time::Duration;

use crate::counters::CounterStore;

pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    window: Duration,
    threshold: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    Limited,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn CounterStore>, window: Duration, threshold: u64) -> Self {
        Self {
            store,
            window,
            threshold,
        }
    }

    /// Derive the principal key for a request: the verified user
    /// identifier when available, otherwise the source IP.
    pub fn principal_key<'a>(user_identifier: Option<&'a str>, source_ip: &'a str) -> &'a str {
        user_identifier.unwrap_or(source_ip)
    }

    pub async fn check(&self, principal: &str) -> Admission {
        match self.store.increment_rate_limit_window(principal, self.window).await {
            Ok(window) => {
                if window.count as u64 > self.threshold {
                    Admission::Limited
                } else {
                    Admission::Allowed
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, principal, "rate limiter store unreachable; failing open");
                Admission::Allowed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counters::InMemoryCounterStore;

    #[tokio::test]
    async fn allows_up_to_threshold_then_limits() {
        let limiter = RateLimiter::new(
            Arc::new(InMemoryCounterStore::new()),
            Duration::from_secs(60),
            3,
        );

        for _ in 0..3 {
            assert_eq!(limiter.check("user-1").await, Admission::Allowed);
        }
        assert_eq!(limiter.check("user-1").await, Admission::Limited);
    }

    #[tokio::test]
    async fn principals_are_independent() {
        let limiter = RateLimiter::new(
            Arc::new(InMemoryCounterStore::new()),
            Duration::from_secs(60),
            1,
        );

        assert_eq!(limiter.check("user-1").await, Admission::Allowed);
        assert_eq!(limiter.check("user-2").await, Admission::Allowed);
        assert_eq!(limiter.check("user-1").await, Admission::Limited);
    }

    #[test]
    fn principal_key_prefers_user_identifier() {
        assert_eq!(
            RateLimiter::principal_key(Some("user-1"), "10.0.0.1"),
            "user-1"
        );
        assert_eq!(RateLimiter::principal_key(None, "10.0.0.1"), "10.0.0.1");
    }
}
