use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::clock::{Clock, DefaultClock};
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter as GovernorRateLimiter};
use tracing::trace;

/// Rate limiter shared by clones, backed by governor
#[derive(Clone)]
pub struct RateLimiter {
    limiter: Arc<GovernorRateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
    name: String,
    period: Duration,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("name", &self.name)
            .field("period", &self.period)
            .finish()
    }
}

impl RateLimiter {
    /// `requests_per_second` - maximum number of requests allowed per second.
    /// Sub-second rates are expressed as a replenish period.
    pub fn new(name: &str, requests_per_second: f64) -> Self {
        if requests_per_second >= 1.0 {
            let per_second = NonZeroU32::new(requests_per_second as u32).unwrap_or(NonZeroU32::MIN);
            let quota = Quota::per_second(per_second);
            Self::from_quota(name, quota, Duration::from_secs(1) / per_second.get())
        } else {
            let interval_ms = (1000.0 / requests_per_second.max(0.001)) as u64;
            Self::with_interval(name, Duration::from_millis(interval_ms))
        }
    }

    /// One permit per `interval`, no burst
    pub fn with_interval(name: &str, interval: Duration) -> Self {
        let interval = interval.max(Duration::from_millis(1));
        let quota = Quota::with_period(interval)
            .unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN));
        Self::from_quota(name, quota, interval)
    }

    fn from_quota(name: &str, quota: Quota, period: Duration) -> Self {
        Self {
            limiter: Arc::new(GovernorRateLimiter::direct(quota)),
            name: name.to_string(),
            period,
        }
    }

    /// Wait asynchronously until a permit is available
    pub async fn acquire(&self) {
        loop {
            match self.limiter.check() {
                Ok(_) => {
                    trace!(limiter = %self.name, "permit acquired");
                    break;
                }
                Err(not_until) => {
                    let clock = DefaultClock::default();
                    let wait_duration = not_until.wait_time_from(clock.now());
                    tokio::time::sleep(wait_duration).await;
                }
            }
        }
    }

    /// Try to acquire permission without waiting.
    /// Returns the remaining wait when rate limited.
    pub fn try_acquire(&self) -> Result<(), Duration> {
        match self.limiter.check() {
            Ok(_) => Ok(()),
            Err(not_until) => {
                let clock = DefaultClock::default();
                Err(not_until.wait_time_from(clock.now()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_limiter_allows_one_permit_then_blocks() {
        let limiter = RateLimiter::with_interval("test", Duration::from_secs(60));

        assert!(limiter.try_acquire().is_ok());
        let wait = limiter.try_acquire().unwrap_err();
        assert!(wait > Duration::from_secs(50));
    }

    #[test]
    fn clones_share_the_same_budget() {
        let limiter = RateLimiter::with_interval("shared", Duration::from_secs(60));
        let clone = limiter.clone();

        assert!(limiter.try_acquire().is_ok());
        assert!(clone.try_acquire().is_err());
    }

    #[tokio::test]
    async fn acquire_waits_for_the_next_slot() {
        let limiter = RateLimiter::with_interval("wait", Duration::from_millis(50));
        limiter.acquire().await;

        let started = std::time::Instant::now();
        limiter.acquire().await;
        assert!(started.elapsed() >= Duration::from_millis(30));
    }
}
