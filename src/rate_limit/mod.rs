//! Per-caller, per-tier sliding-window rate limiting.
//!
//! Two tiers gate the generative service: a cheap tier for single-shot
//! completions and an expensive tier for full agent turns. Each tier has a
//! per-minute and a per-day ceiling.
//!
//! ```text
//! check(caller, tier)
//!   └─ store.check_and_record(key, limits, now)   (atomic per key)
//!        ├─ prune instants older than one day
//!        ├─ minute count >= ceiling → Denied(60s)
//!        ├─ day count    >= ceiling → Denied(3600s)
//!        └─ record now → Allowed
//! ```

mod store;

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

pub use store::{InMemoryRateLimitStore, RateLimitStore};

use crate::clock::Clock;

/// Retry hint when the per-minute ceiling trips.
pub const MINUTE_RETRY_SECS: u64 = 60;
/// Retry hint when the per-day ceiling trips.
pub const DAY_RETRY_SECS: u64 = 3600;

pub(crate) fn minute_window() -> TimeDelta {
    TimeDelta::seconds(60)
}

pub(crate) fn day_window() -> TimeDelta {
    TimeDelta::days(1)
}

/// Named rate-limit configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Single-shot generative calls (agenda drafts, time suggestions).
    Single,
    /// Full agent turns.
    Agent,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Single => "single",
            Tier::Agent => "agent",
        }
    }
}

/// Ceilings for one tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierLimits {
    pub per_minute: u32,
    pub per_day: u32,
}

/// Ceilings for both tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub single: TierLimits,
    pub agent: TierLimits,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            single: TierLimits {
                per_minute: 5,
                per_day: 50,
            },
            agent: TierLimits {
                per_minute: 3,
                per_day: 20,
            },
        }
    }
}

impl RateLimitConfig {
    pub fn limits(&self, tier: Tier) -> TierLimits {
        match tier {
            Tier::Single => self.single,
            Tier::Agent => self.agent,
        }
    }
}

/// Identity of one counter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateKey {
    pub caller_id: String,
    pub tier: Tier,
}

impl RateKey {
    pub fn new(caller_id: impl Into<String>, tier: Tier) -> Self {
        Self {
            caller_id: caller_id.into(),
            tier,
        }
    }
}

/// Which ceiling tripped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitWindow {
    Minute,
    Day,
}

/// A rejected check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Denied {
    pub window: LimitWindow,
    pub retry_after_secs: u64,
}

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed,
    Denied(Denied),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed)
    }

    pub fn into_result(self) -> Result<(), Denied> {
        match self {
            Decision::Allowed => Ok(()),
            Decision::Denied(denied) => Err(denied),
        }
    }
}

/// Apply the sliding-window algorithm to one counter's recorded instants.
///
/// Instants are kept in ascending order. Stores call this while holding the
/// key's lock (or inside a transaction) so check-and-record is atomic.
pub fn apply_window(
    instants: &mut std::collections::VecDeque<DateTime<Utc>>,
    limits: TierLimits,
    now: DateTime<Utc>,
) -> Decision {
    let day_cutoff = now - day_window();
    while instants.front().is_some_and(|t| *t <= day_cutoff) {
        instants.pop_front();
    }

    let minute_cutoff = now - minute_window();
    let minute_count = instants.iter().rev().take_while(|t| **t > minute_cutoff).count();
    let day_count = instants.len();

    if minute_count >= limits.per_minute as usize {
        return Decision::Denied(Denied {
            window: LimitWindow::Minute,
            retry_after_secs: MINUTE_RETRY_SECS,
        });
    }
    if day_count >= limits.per_day as usize {
        return Decision::Denied(Denied {
            window: LimitWindow::Day,
            retry_after_secs: DAY_RETRY_SECS,
        });
    }

    instants.push_back(now);
    Decision::Allowed
}

/// Front door for rate-limit checks.
pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    config: RateLimitConfig,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn RateLimitStore>, config: RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            config,
            clock,
        }
    }

    /// In-memory limiter with the given ceilings.
    pub fn in_memory(config: RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self::new(Arc::new(InMemoryRateLimitStore::new()), config, clock)
    }

    /// Check (and on success, record) one request for `caller_id` on `tier`.
    pub async fn check(&self, caller_id: &str, tier: Tier) -> Decision {
        let key = RateKey::new(caller_id, tier);
        let limits = self.config.limits(tier);
        let decision = self
            .store
            .check_and_record(&key, limits, self.clock.now())
            .await;

        if let Decision::Denied(denied) = decision {
            tracing::warn!(
                caller_id = %caller_id,
                tier = tier.as_str(),
                window = ?denied.window,
                retry_after_secs = denied.retry_after_secs,
                "Rate limit exceeded"
            );
        }
        decision
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }
}
