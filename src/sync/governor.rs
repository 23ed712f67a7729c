use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use tokio_util::sync::CancellationToken;

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// X search windows are 15 minutes; used when upstream gives no reset time.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquire {
    Ready,
    CoolingDown(DateTime<Utc>),
    Cancelled,
}

/// Per-platform request pacing.
///
/// Enforces a fixed minimum spacing between upstream calls and remembers
/// when upstream last told us to back off. It never sleeps through a
/// cooldown and never retries; callers decide what a cooldown means.
pub struct RequestGovernor {
    limiter: Option<DirectLimiter>,
    min_delay: Duration,
    default_cooldown: Duration,
    cooldown_until: Mutex<Option<DateTime<Utc>>>,
}

impl RequestGovernor {
    /// A zero delay disables spacing entirely.
    pub fn new(min_delay: Duration) -> Self {
        Self {
            limiter: Quota::with_period(min_delay).map(RateLimiter::direct),
            min_delay,
            default_cooldown: DEFAULT_COOLDOWN,
            cooldown_until: Mutex::new(None),
        }
    }

    pub fn unlimited() -> Self {
        Self::new(Duration::ZERO)
    }

    pub fn with_default_cooldown(mut self, cooldown: Duration) -> Self {
        self.default_cooldown = cooldown;
        self
    }

    pub fn min_delay(&self) -> Duration {
        self.min_delay
    }

    /// Wait for the next request slot, unless cancelled or cooling down.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Acquire {
        if cancel.is_cancelled() {
            return Acquire::Cancelled;
        }
        if let Some(until) = self.cooling_down_until() {
            return Acquire::CoolingDown(until);
        }

        let Some(limiter) = &self.limiter else {
            return Acquire::Ready;
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Acquire::Cancelled,
            _ = limiter.until_ready() => Acquire::Ready,
        }
    }

    /// Record a rate-limit signal. Returns the end of the cooldown.
    pub fn note_rate_limited(&self, reset_at: Option<DateTime<Utc>>) -> DateTime<Utc> {
        let fallback = Utc::now()
            + chrono::Duration::from_std(self.default_cooldown)
                .unwrap_or_else(|_| chrono::Duration::minutes(15));
        let until = reset_at.unwrap_or(fallback);

        let mut guard = self
            .cooldown_until
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // cooldowns only ever extend
        let until = match *guard {
            Some(existing) if existing > until => existing,
            _ => until,
        };
        *guard = Some(until);
        until
    }

    /// End of the active cooldown, if any. Expired cooldowns are cleared.
    pub fn cooling_down_until(&self) -> Option<DateTime<Utc>> {
        let mut guard = self
            .cooldown_until
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match *guard {
            Some(until) if until > Utc::now() => Some(until),
            Some(_) => {
                *guard = None;
                None
            }
            None => None,
        }
    }
}
