//! Shared state behind idempotency and rate limiting.
//!
//! A [`StateStore`] offers TTL values, expiring mutual-exclusion locks and a
//! token-bucket admission check. [`MemoryStore`] keeps all three in process.
//! Networked backends implement the same trait and are registered with a
//! [`StoreRegistry`].

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;
use wrench_config::{IdempotencySettings, Manifest, RateLimitSettings};

use crate::BuildError;

/// Store kind that needs no connection.
pub const MEMORY_KIND: &str = "memory";

/// A backend operation failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("store '{store}' failed: {message}")]
pub struct StoreError {
    /// Store id or kind.
    pub store: String,
    /// Backend message.
    pub message: String,
}

impl StoreError {
    /// Creates a store error.
    pub fn new(store: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            store: store.into(),
            message: message.into(),
        }
    }
}

/// A lock could not be taken.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LockError {
    /// Still held by someone else after every try.
    #[error("lock '{key}' still held after {tries} tries")]
    Contended {
        /// Lock key.
        key: String,
        /// Attempts made.
        tries: u32,
    },

    /// The backend failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// How hard to try for a lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockOptions {
    /// Attempts before giving up.
    pub tries: u32,
    /// Pause between attempts.
    pub retry_delay: Duration,
    /// Lifetime of an acquired lock.
    pub expiry: Duration,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            tries: 5,
            retry_delay: Duration::from_millis(500),
            expiry: Duration::from_secs(20),
        }
    }
}

impl From<&IdempotencySettings> for LockOptions {
    fn from(settings: &IdempotencySettings) -> Self {
        Self {
            tries: settings.lock_tries.max(1),
            retry_delay: Duration::from_millis(settings.lock_retry_delay_ms),
            expiry: Duration::from_secs(settings.lock_expiry_secs),
        }
    }
}

/// Proof of lock ownership. Only the holder of the random value can release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockToken {
    /// Lock key.
    pub key: String,
    /// Random owner value.
    pub value: String,
}

/// Admission rate for a bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateSpec {
    /// Tokens per period.
    pub rate: u32,
    /// Refill period.
    pub period: Duration,
    /// Bucket capacity.
    pub burst: u32,
}

impl RateSpec {
    /// `rate` requests per second.
    pub const fn per_second(rate: u32, burst: u32) -> Self {
        Self {
            rate,
            period: Duration::from_secs(1),
            burst,
        }
    }

    /// `rate` requests per minute.
    pub const fn per_minute(rate: u32, burst: u32) -> Self {
        Self {
            rate,
            period: Duration::from_secs(60),
            burst,
        }
    }

    /// Reads a policy. The burst defaults to the rate.
    pub fn from_settings(settings: &RateLimitSettings) -> Option<Self> {
        let spec = match (settings.requests_per_second, settings.requests_per_minute) {
            (Some(rate), None) => Self::per_second(rate, settings.burst_limit.unwrap_or(rate)),
            (None, Some(rate)) => Self::per_minute(rate, settings.burst_limit.unwrap_or(rate)),
            _ => return None,
        };
        (spec.rate > 0 && spec.burst > 0).then_some(spec)
    }

    /// Time between two tokens.
    pub fn emission_interval(&self) -> Duration {
        self.period / self.rate.max(1)
    }
}

/// Result of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    /// Whether the request may proceed.
    pub allowed: bool,
    /// How long until a token is available, when denied.
    pub retry_after: Duration,
}

/// Shared state backend.
#[async_trait]
pub trait StateStore: Send + Sync + fmt::Debug {
    /// Reads a value.
    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError>;

    /// Writes a value, optionally expiring after `ttl`.
    async fn set(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> Result<(), StoreError>;

    /// One lock attempt. Returns `false` when the lock is held.
    async fn try_lock(&self, key: &str, value: &str, expiry: Duration) -> Result<bool, StoreError>;

    /// Releases a lock if `token` still owns it.
    async fn unlock(&self, token: &LockToken) -> Result<(), StoreError>;

    /// Takes one token from the bucket at `key`.
    async fn allow(&self, key: &str, rate: &RateSpec) -> Result<RateDecision, StoreError>;

    /// Acquires a lock, retrying per `options`.
    async fn lock(&self, key: &str, options: &LockOptions) -> Result<LockToken, LockError> {
        let token = LockToken {
            key: key.to_string(),
            value: Uuid::new_v4().to_string(),
        };
        let tries = options.tries.max(1);
        for attempt in 1..=tries {
            if self.try_lock(key, &token.value, options.expiry).await? {
                return Ok(token);
            }
            debug!(key, attempt, "lock held, retrying");
            if attempt < tries {
                tokio::time::sleep(options.retry_delay).await;
            }
        }
        Err(LockError::Contended {
            key: key.to_string(),
            tries,
        })
    }
}

/// Stores by id, plus the default used by policies without a `storeId`.
#[derive(Debug, Clone)]
pub struct StoreRegistry {
    stores: HashMap<String, Arc<dyn StateStore>>,
    default: Arc<dyn StateStore>,
}

impl Default for StoreRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl StoreRegistry {
    /// Creates a registry whose default store is a fresh [`MemoryStore`].
    pub fn new() -> Self {
        Self {
            stores: HashMap::new(),
            default: Arc::new(MemoryStore::new()),
        }
    }

    /// Registers a store under `id`, replacing any previous one.
    pub fn register(mut self, id: impl Into<String>, store: Arc<dyn StateStore>) -> Self {
        self.stores.insert(id.into(), store);
        self
    }

    /// Adds every `connections.stores` entry not registered yet.
    ///
    /// Only the `memory` kind can be created here; other kinds must be
    /// registered beforehand.
    pub fn with_manifest(mut self, manifest: &Manifest) -> Result<Self, BuildError> {
        for settings in &manifest.connections.stores {
            if self.stores.contains_key(&settings.id) {
                continue;
            }
            if settings.kind != MEMORY_KIND {
                return Err(BuildError::UnsupportedStore {
                    id: settings.id.clone(),
                    kind: settings.kind.clone(),
                });
            }
            self.stores
                .insert(settings.id.clone(), Arc::new(MemoryStore::new()));
        }
        Ok(self)
    }

    /// The store for a policy.
    pub fn resolve(&self, store_id: Option<&str>) -> Result<Arc<dyn StateStore>, BuildError> {
        match store_id {
            None => Ok(Arc::clone(&self.default)),
            Some(id) => self
                .stores
                .get(id)
                .cloned()
                .ok_or_else(|| BuildError::UnknownStore {
                    store_id: id.to_string(),
                }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wrench_config::StoreSettings;

    fn policy(rps: Option<u32>, rpm: Option<u32>, burst: Option<u32>) -> RateLimitSettings {
        RateLimitSettings {
            id: "p".to_string(),
            route_enabled: false,
            keys: Vec::new(),
            requests_per_second: rps,
            requests_per_minute: rpm,
            burst_limit: burst,
            store_id: None,
        }
    }

    #[test]
    fn test_rate_spec_from_settings() {
        let spec = RateSpec::from_settings(&policy(Some(10), None, None)).unwrap();
        assert_eq!(spec, RateSpec::per_second(10, 10));
        assert_eq!(spec.emission_interval(), Duration::from_millis(100));

        let spec = RateSpec::from_settings(&policy(None, Some(60), Some(5))).unwrap();
        assert_eq!(spec.period, Duration::from_secs(60));
        assert_eq!(spec.burst, 5);

        assert!(RateSpec::from_settings(&policy(Some(1), Some(1), None)).is_none());
        assert!(RateSpec::from_settings(&policy(None, None, None)).is_none());
        assert!(RateSpec::from_settings(&policy(Some(0), None, None)).is_none());
    }

    #[test]
    fn test_lock_options_default() {
        let options = LockOptions::default();
        assert_eq!(options.tries, 5);
        assert_eq!(options.retry_delay, Duration::from_millis(500));
        assert_eq!(options.expiry, Duration::from_secs(20));
    }

    #[test]
    fn test_registry_from_manifest() {
        let mut manifest = Manifest::default();
        manifest.connections.stores.push(StoreSettings {
            id: "local".to_string(),
            kind: MEMORY_KIND.to_string(),
            address: None,
        });
        let registry = StoreRegistry::new().with_manifest(&manifest).unwrap();
        assert!(registry.resolve(Some("local")).is_ok());
        assert!(registry.resolve(None).is_ok());
        assert!(matches!(
            registry.resolve(Some("other")),
            Err(BuildError::UnknownStore { .. })
        ));
    }

    #[test]
    fn test_registry_rejects_unregistered_kinds() {
        let mut manifest = Manifest::default();
        manifest.connections.stores.push(StoreSettings {
            id: "cache".to_string(),
            kind: "redis".to_string(),
            address: Some("redis://localhost".to_string()),
        });
        assert!(matches!(
            StoreRegistry::new().with_manifest(&manifest),
            Err(BuildError::UnsupportedStore { .. })
        ));

        let registry = StoreRegistry::new()
            .register("cache", Arc::new(MemoryStore::new()))
            .with_manifest(&manifest)
            .unwrap();
        assert!(registry.resolve(Some("cache")).is_ok());
    }
}
