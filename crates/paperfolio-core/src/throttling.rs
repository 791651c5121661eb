use std::num::NonZeroU32;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use governor::clock::DefaultClock;
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Client-side request budget for a rate-limited provider.
///
/// A denied call is reported back to the caller instead of being queued; the
/// budget then reads as exhausted until one replenish interval has passed.
#[derive(Clone)]
pub struct RateBudget {
    limiter: Arc<DirectRateLimiter>,
    replenish_interval: Duration,
    blocked_until: Arc<Mutex<Option<Instant>>>,
}

impl RateBudget {
    pub fn new(quota_window: Duration, quota_limit: u32) -> Self {
        let limit = NonZeroU32::new(quota_limit).unwrap_or(NonZeroU32::MIN);
        let replenish_interval =
            Duration::from_secs_f64((quota_window.as_secs_f64() / f64::from(limit.get())).max(0.001));
        let quota = Quota::with_period(replenish_interval)
            .unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN))
            .allow_burst(limit);

        Self {
            limiter: Arc::new(RateLimiter::direct(quota)),
            replenish_interval,
            blocked_until: Arc::new(Mutex::new(None)),
        }
    }

    /// CoinGecko public/demo plan: 30 calls per minute.
    pub fn coingecko_public() -> Self {
        Self::new(Duration::from_secs(60), 30)
    }

    /// Takes one unit of budget, or returns how long to wait before trying again.
    pub fn try_acquire(&self) -> Result<(), Duration> {
        let mut blocked_until = self
            .blocked_until
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if self.limiter.check().is_ok() {
            *blocked_until = None;
            return Ok(());
        }

        *blocked_until = Some(Instant::now() + self.replenish_interval);
        Err(self.replenish_interval)
    }

    pub fn has_budget(&self) -> bool {
        self.blocked_until
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .map_or(true, |until| Instant::now() >= until)
    }
}
