//! Per-platform outbound rate limiting.
//!
//! A keyed `governor` limiter: `capacity` calls of burst, one call replenished
//! every `interval`. Governor reads time from the injected [`Clock`], and
//! callers wait through that same clock until their key is allowed. State is
//! created per run and never persisted.

use std::collections::HashMap;
use std::hash::Hash;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};

use governor::middleware::NoOpMiddleware;
use governor::state::keyed::HashMapStateStore;
use governor::Quota;

use crate::services::clock::Clock;

/// Rate limiter configuration
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    /// Maximum calls in one burst
    pub capacity: u32,
    /// Time to replenish one call
    pub interval: Duration,
}

impl RateLimitConfig {
    /// One call per `interval`, no burst.
    pub fn one_per(interval: Duration) -> Self {
        Self {
            capacity: 1,
            interval,
        }
    }

    /// `None` when the interval is zero, i.e. unlimited.
    fn quota(&self) -> Option<Quota> {
        let burst = NonZeroU32::new(self.capacity).unwrap_or(NonZeroU32::MIN);
        Quota::with_period(self.interval).map(|q| q.allow_burst(burst))
    }
}

/// Lets governor run on the pipeline's clock instead of its own.
#[derive(Clone)]
struct GovernorClock(Arc<dyn Clock>);

impl governor::clock::Clock for GovernorClock {
    type Instant = Instant;

    fn now(&self) -> Instant {
        self.0.now()
    }
}

type KeyedLimiter<K> =
    governor::RateLimiter<K, HashMapStateStore<K>, GovernorClock, NoOpMiddleware<Instant>>;

pub struct RateLimiter<K: Eq + Hash + Clone> {
    clock: Arc<dyn Clock>,
    default_limiter: Option<KeyedLimiter<K>>,
    overrides: HashMap<K, Option<KeyedLimiter<K>>>,
}

impl<K: Eq + Hash + Clone> RateLimiter<K> {
    pub fn new(clock: Arc<dyn Clock>, default_config: RateLimitConfig) -> Self {
        let default_limiter = Self::build(&clock, default_config);
        Self {
            clock,
            default_limiter,
            overrides: HashMap::new(),
        }
    }

    pub fn with_override(mut self, key: K, config: RateLimitConfig) -> Self {
        let limiter = Self::build(&self.clock, config);
        self.overrides.insert(key, limiter);
        self
    }

    fn build(clock: &Arc<dyn Clock>, config: RateLimitConfig) -> Option<KeyedLimiter<K>> {
        config
            .quota()
            .map(|quota| governor::RateLimiter::hashmap_with_clock(quota, &GovernorClock(clock.clone())))
    }

    fn limiter_for(&self, key: &K) -> Option<&KeyedLimiter<K>> {
        match self.overrides.get(key) {
            Some(limiter) => limiter.as_ref(),
            None => self.default_limiter.as_ref(),
        }
    }

    /// Wait until a call for `key` is allowed.
    pub async fn acquire(&self, key: &K) {
        let Some(limiter) = self.limiter_for(key) else {
            return;
        };
        while let Err(not_until) = limiter.check_key(key) {
            let wait = not_until.wait_time_from(self.clock.now());
            self.clock.sleep(wait).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::clock::ManualClock;

    #[tokio::test]
    async fn test_first_call_passes_immediately() {
        let clock = Arc::new(ManualClock::new());
        let limiter: RateLimiter<&str> =
            RateLimiter::new(clock.clone(), RateLimitConfig::one_per(Duration::from_secs(2)));

        limiter.acquire(&"x").await;
        assert!(clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn test_back_to_back_calls_are_spaced() {
        let clock = Arc::new(ManualClock::new());
        let limiter: RateLimiter<&str> =
            RateLimiter::new(clock.clone(), RateLimitConfig::one_per(Duration::from_secs(2)));

        limiter.acquire(&"x").await;
        limiter.acquire(&"x").await;
        limiter.acquire(&"x").await;

        assert_eq!(clock.elapsed(), Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let clock = Arc::new(ManualClock::new());
        let limiter: RateLimiter<&str> =
            RateLimiter::new(clock.clone(), RateLimitConfig::one_per(Duration::from_secs(2)));

        limiter.acquire(&"facebook").await;
        limiter.acquire(&"x").await;
        assert!(clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn test_elapsed_time_refills() {
        let clock = Arc::new(ManualClock::new());
        let limiter: RateLimiter<&str> =
            RateLimiter::new(clock.clone(), RateLimitConfig::one_per(Duration::from_secs(2)));

        limiter.acquire(&"x").await;
        clock.advance(Duration::from_secs(3));
        limiter.acquire(&"x").await;
        assert!(clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn test_override_and_zero_interval() {
        let clock = Arc::new(ManualClock::new());
        let limiter: RateLimiter<&str> =
            RateLimiter::new(clock.clone(), RateLimitConfig::one_per(Duration::ZERO))
                .with_override(
                    "slow",
                    RateLimitConfig {
                        capacity: 2,
                        interval: Duration::from_secs(10),
                    },
                );

        for _ in 0..5 {
            limiter.acquire(&"fast").await;
        }
        assert!(clock.sleeps().is_empty());

        limiter.acquire(&"slow").await;
        limiter.acquire(&"slow").await;
        limiter.acquire(&"slow").await;
        assert_eq!(clock.elapsed(), Duration::from_secs(10));
    }

    #[test]
    fn test_zero_interval_has_no_quota() {
        assert!(RateLimitConfig::one_per(Duration::ZERO).quota().is_none());
        assert!(RateLimitConfig::one_per(Duration::from_millis(500)).quota().is_some());
    }
}
