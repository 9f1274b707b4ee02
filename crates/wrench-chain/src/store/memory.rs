//! In-process [`StateStore`].

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

use super::{LockToken, RateDecision, RateSpec, StateStore, StoreError};

#[derive(Debug, Clone)]
struct Value {
    data: Bytes,
    expires_at: Option<Instant>,
}

#[derive(Debug, Clone)]
struct Lock {
    owner: String,
    expires_at: Instant,
}

/// Default pause between two sweeps of expired entries.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// A store that lives and dies with the process.
///
/// Values and locks sit in concurrent maps; token buckets use the generic
/// cell rate algorithm, keeping one theoretical arrival time per key.
/// Time comes from `tokio::time`, so paused-clock tests are deterministic.
///
/// Expired entries are swept by whichever write or admission check first
/// runs after the sweep interval has elapsed, so the maps stay bounded by
/// the live key set without a background task.
#[derive(Debug)]
pub struct MemoryStore {
    values: DashMap<String, Value>,
    locks: DashMap<String, Lock>,
    buckets: Mutex<HashMap<String, Instant>>,
    sweep_interval: Duration,
    last_sweep: Mutex<Instant>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::with_sweep_interval(DEFAULT_SWEEP_INTERVAL)
    }
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty store that sweeps expired entries every `interval`.
    pub fn with_sweep_interval(interval: Duration) -> Self {
        Self {
            values: DashMap::new(),
            locks: DashMap::new(),
            buckets: Mutex::new(HashMap::new()),
            sweep_interval: interval,
            last_sweep: Mutex::new(Instant::now()),
        }
    }

    /// Number of live values.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.values
            .iter()
            .filter(|v| v.expires_at.map_or(true, |at| at > now))
            .count()
    }

    /// Whether no live value is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops expired values, locks and idle buckets.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.values
            .retain(|_, v| v.expires_at.map_or(true, |at| at > now));
        self.locks.retain(|_, l| l.expires_at > now);
        self.buckets.lock().retain(|_, tat| *tat > now);
    }

    fn sweep_if_due(&self, now: Instant) {
        {
            let mut last = self.last_sweep.lock();
            if now.duration_since(*last) < self.sweep_interval {
                return;
            }
            *last = now;
        }
        self.purge_expired();
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        let now = Instant::now();
        match self.values.get(key) {
            None => return Ok(None),
            Some(value) if value.expires_at.map_or(true, |at| at > now) => {
                return Ok(Some(value.data.clone()));
            }
            Some(_) => {}
        }
        self.values
            .remove_if(key, |_, v| v.expires_at.is_some_and(|at| at <= now));
        Ok(None)
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> Result<(), StoreError> {
        let now = Instant::now();
        self.sweep_if_due(now);
        let expires_at = ttl.filter(|t| !t.is_zero()).map(|t| now + t);
        self.values.insert(
            key.to_string(),
            Value {
                data: value,
                expires_at,
            },
        );
        Ok(())
    }

    async fn try_lock(&self, key: &str, value: &str, expiry: Duration) -> Result<bool, StoreError> {
        let now = Instant::now();
        self.sweep_if_due(now);
        let lock = Lock {
            owner: value.to_string(),
            expires_at: now + expiry,
        };
        match self.locks.entry(key.to_string()) {
            Entry::Occupied(mut held) => {
                if held.get().expires_at <= now {
                    held.insert(lock);
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            Entry::Vacant(free) => {
                free.insert(lock);
                Ok(true)
            }
        }
    }

    async fn unlock(&self, token: &LockToken) -> Result<(), StoreError> {
        self.locks
            .remove_if(&token.key, |_, lock| lock.owner == token.value);
        Ok(())
    }

    async fn allow(&self, key: &str, rate: &RateSpec) -> Result<RateDecision, StoreError> {
        let now = Instant::now();
        self.sweep_if_due(now);
        let increment = rate.emission_interval();
        let burst_offset = increment * rate.burst;

        let mut buckets = self.buckets.lock();
        let tat = buckets.get(key).copied().map_or(now, |stored| stored.max(now));
        let new_tat = tat + increment;
        let allow_at = now + burst_offset;

        if new_tat > allow_at {
            return Ok(RateDecision {
                allowed: false,
                retry_after: new_tat - allow_at,
            });
        }

        buckets.insert(key.to_string(), new_tat);
        Ok(RateDecision {
            allowed: true,
            retry_after: Duration::ZERO,
        })
    }
}
