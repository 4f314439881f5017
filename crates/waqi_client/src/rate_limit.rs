//! Rate limiter for the WAQI feed API.
//!
//! WAQI throttles per token; one shared bucket keeps every clone of the
//! client inside the same budget.

use governor::{Quota, RateLimiter as GovLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;

type DirectLimiter =
    GovLimiter<governor::state::NotKeyed, governor::state::InMemoryState, governor::clock::DefaultClock>;

/// Token-bucket limiter shared across client clones.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    limiter: Arc<DirectLimiter>,
}

impl RateLimiter {
    /// Create with a per-second request budget. Zero is treated as one.
    pub fn per_second(requests_per_sec: u32) -> Self {
        let rate = NonZeroU32::new(requests_per_sec).unwrap_or(NonZeroU32::MIN);
        Self {
            limiter: Arc::new(GovLimiter::direct(Quota::per_second(rate))),
        }
    }

    /// Wait until a request slot is available.
    pub async fn wait(&self) {
        self.limiter.until_ready().await;
    }

    /// Try to take a slot without waiting. Returns true if acquired.
    pub fn try_acquire(&self) -> bool {
        self.limiter.check().is_ok()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::per_second(5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_burst_is_bounded_by_quota() {
        let limiter = RateLimiter::per_second(2);
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
    }

    #[test]
    fn test_clones_share_one_bucket() {
        let a = RateLimiter::per_second(1);
        let b = a.clone();
        assert!(a.try_acquire());
        assert!(!b.try_acquire());
    }

    #[test]
    fn test_zero_rate_still_admits() {
        let limiter = RateLimiter::per_second(0);
        assert!(limiter.try_acquire());
    }
}
