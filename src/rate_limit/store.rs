//! Storage backends for rate-limit counters.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};

use crate::rate_limit::{Decision, RateKey, TierLimits, apply_window, day_window};

/// Backend holding request instants per (caller, tier).
///
/// Contract for implementations:
/// - `check_and_record` is atomic per key: two concurrent calls for the same
///   key never both observe the same count.
/// - Instants older than the daily window are never retained after a check.
/// - Denied checks do not record an instant.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    async fn check_and_record(
        &self,
        key: &RateKey,
        limits: TierLimits,
        now: DateTime<Utc>,
    ) -> Decision;
}

type Counter = Arc<Mutex<VecDeque<DateTime<Utc>>>>;

/// Idle counters are swept once per this many checks.
const DEFAULT_PRUNE_EVERY: u64 = 1024;

/// Process-local counters, one lock per key.
pub struct InMemoryRateLimitStore {
    counters: RwLock<HashMap<RateKey, Counter>>,
    checks: AtomicU64,
    prune_every: u64,
}

impl Default for InMemoryRateLimitStore {
    fn default() -> Self {
        Self {
            counters: RwLock::new(HashMap::new()),
            checks: AtomicU64::new(0),
            prune_every: DEFAULT_PRUNE_EVERY,
        }
    }
}

impl InMemoryRateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sweep idle counters every `checks` calls to `check_and_record`.
    pub fn with_prune_interval(mut self, checks: u64) -> Self {
        self.prune_every = checks.max(1);
        self
    }

    async fn counter(&self, key: &RateKey) -> Counter {
        // Fast path: counter exists
        {
            let counters = self.counters.read().await;
            if let Some(counter) = counters.get(key) {
                return Arc::clone(counter);
            }
        }

        let mut counters = self.counters.write().await;
        Arc::clone(counters.entry(key.clone()).or_default())
    }

    /// Drop counters with no instants inside the daily window.
    ///
    /// Returns the number of counters removed.
    pub async fn prune_idle(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now - day_window();
        let mut counters = self.counters.write().await;
        let before = counters.len();
        counters.retain(|_, counter| {
            // Someone fetched this counter and may be about to record into it
            if Arc::strong_count(counter) > 1 {
                return true;
            }
            match counter.try_lock() {
                Ok(instants) => instants.back().is_some_and(|t| *t > cutoff),
                Err(_) => true,
            }
        });
        before - counters.len()
    }

    pub async fn len(&self) -> usize {
        self.counters.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.counters.read().await.is_empty()
    }
}

#[async_trait]
impl RateLimitStore for InMemoryRateLimitStore {
    async fn check_and_record(
        &self,
        key: &RateKey,
        limits: TierLimits,
        now: DateTime<Utc>,
    ) -> Decision {
        let decision = {
            let counter = self.counter(key).await;
            let mut instants = counter.lock().await;
            apply_window(&mut instants, limits, now)
        };

        let checks = self.checks.fetch_add(1, Ordering::Relaxed) + 1;
        if checks % self.prune_every == 0 {
            let removed = self.prune_idle(now).await;
            if removed > 0 {
                tracing::debug!(removed, "Pruned idle rate-limit counters");
            }
        }
        decision
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;

    use super::*;
    use crate::rate_limit::Tier;

    #[tokio::test]
    async fn test_prune_idle_counters() {
        let store = InMemoryRateLimitStore::new();
        let limits = TierLimits {
            per_minute: 5,
            per_day: 50,
        };
        let now = Utc::now();
        store
            .check_and_record(&RateKey::new("old", Tier::Single), limits, now - TimeDelta::days(2))
            .await;
        store
            .check_and_record(&RateKey::new("fresh", Tier::Single), limits, now)
            .await;

        assert_eq!(store.prune_idle(now).await, 1);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_checks_sweep_idle_counters() {
        let store = InMemoryRateLimitStore::new().with_prune_interval(3);
        let limits = TierLimits {
            per_minute: 5,
            per_day: 50,
        };
        let now = Utc::now();
        let long_ago = now - TimeDelta::days(2);
        store
            .check_and_record(&RateKey::new("gone", Tier::Agent), limits, long_ago)
            .await;
        store
            .check_and_record(&RateKey::new("active", Tier::Agent), limits, now)
            .await;
        assert_eq!(store.len().await, 2);

        // Third check triggers the sweep.
        let decision = store
            .check_and_record(&RateKey::new("active", Tier::Agent), limits, now)
            .await;
        assert!(decision.is_allowed());
        assert_eq!(store.len().await, 1);
    }
}
