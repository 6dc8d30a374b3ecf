//! Per-shop outbound throttling shared by all workers.
//!
//! Two gates apply to every send. A keyed token bucket (`governor`) keeps each
//! shop under its messages-per-second ceiling. A pause table records shops the
//! platform has rate limited; while a shop is paused its rows are handed back
//! to the queue instead of being sent.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::keyed::DefaultKeyedStateStore,
};
use std::num::NonZeroU32;
use tracing::{info, warn};

type KeyedLimiter = RateLimiter<i64, DefaultKeyedStateStore<i64>, DefaultClock>;

/// Shared throttle state for every shop the dispatcher sends as
pub struct ShopThrottle {
    limiter: Option<KeyedLimiter>,
    pauses: DashMap<i64, DateTime<Utc>>,
}

impl ShopThrottle {
    /// Creates a throttle allowing `rate_per_second` sends per shop.
    /// A rate of zero disables the token bucket.
    #[must_use]
    pub fn new(rate_per_second: u32) -> Self {
        let limiter = NonZeroU32::new(rate_per_second)
            .map(|rate| RateLimiter::keyed(Quota::per_second(rate)));
        Self {
            limiter,
            pauses: DashMap::new(),
        }
    }

    /// Waits until the shop may send one more message.
    pub async fn acquire(&self, shop_id: i64) {
        if let Some(limiter) = &self.limiter {
            limiter.until_key_ready(&shop_id).await;
        }
    }

    /// Pauses the shop until `until`. An existing later pause is kept.
    pub fn pause(&self, shop_id: i64, until: DateTime<Utc>) {
        let mut entry = self.pauses.entry(shop_id).or_insert(until);
        if *entry < until {
            *entry = until;
        }
        warn!(shop_id, %until, "Shop paused by platform rate limit");
    }

    /// End of the shop's pause if it is still in effect at `now`.
    pub fn paused_until(&self, shop_id: i64, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let until = self.pauses.get(&shop_id).map(|entry| *entry)?;
        if until > now {
            return Some(until);
        }
        if self.pauses.remove_if(&shop_id, |_, until| *until <= now).is_some() {
            info!(shop_id, "Shop pause lifted");
        }
        None
    }
}
