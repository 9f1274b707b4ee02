//! At-most-once execution per idempotency key.
//!
//! The stage resolves the policy key, hashes it with the route and takes a
//! distributed lock on `{service}:{route}:{hash}:lock`. With the lock held it
//! looks for a stored response under `{service}:{route}:{hash}:data`:
//!
//! - found: the response is replayed and the chain is marked cached
//! - absent: the chain runs; once it finishes without error the response is
//!   stored for `ttl` seconds
//!
//! The lock is released after the chain finishes, whatever the outcome.

use bytes::Bytes;
use hmac::digest::InvalidLength;
use http::StatusCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};
use wrench_config::IdempotencySettings;
use wrench_core::{resolver, CachedResponse, PipelineContext, RouteContext};
use wrench_telemetry::metrics::{self, IdempotencyOutcome};

use super::hash_key;
use crate::handler::{BoxFuture, Deferred, Flow, Handler};
use crate::store::{LockError, LockOptions, LockToken, StateStore};

/// Body of a 409, when another request holds the key.
pub const LOCKED: &str = "the distributed lock block request";

/// Guards an endpoint with an idempotency policy.
#[derive(Debug, Clone)]
pub struct IdempotencyHandler {
    policy_id: String,
    service: String,
    key: String,
    ttl: Duration,
    lock: LockOptions,
    store: Arc<dyn StateStore>,
}

impl IdempotencyHandler {
    /// Creates the stage for one policy, namespaced by `service`.
    pub fn new(
        settings: &IdempotencySettings,
        service: impl Into<String>,
        store: Arc<dyn StateStore>,
    ) -> Self {
        Self {
            policy_id: settings.id.clone(),
            service: service.into(),
            key: settings.key.clone(),
            ttl: Duration::from_secs(settings.ttl),
            lock: LockOptions::from(settings),
            store,
        }
    }

    fn base_key(
        &self,
        route: &RouteContext,
        pipeline: &PipelineContext,
    ) -> Result<String, InvalidLength> {
        let value = resolver::resolve_string(&self.key, route, pipeline);
        let hash = hash_key(route.route(), &value)?;
        Ok(format!("{}:{}:{hash}", self.service, route.route()))
    }

    fn record(&self, outcome: IdempotencyOutcome) {
        metrics::record_idempotency(&self.policy_id, outcome);
    }
}

impl Handler for IdempotencyHandler {
    fn name(&self) -> &'static str {
        "idempotency"
    }

    fn handle<'a>(
        &'a self,
        route: &'a RouteContext,
        pipeline: &'a mut PipelineContext,
    ) -> BoxFuture<'a, Flow> {
        Box::pin(async move {
            let base = match self.base_key(route, pipeline) {
                Ok(base) => base,
                Err(e) => {
                    error!(request_id = %route.request_id(), error = %e, "idempotency key failed");
                    self.record(IdempotencyOutcome::Error);
                    pipeline.fail(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
                    return Flow::Continue;
                }
            };
            let lock_key = format!("{base}:lock");
            let data_key = format!("{base}:data");

            let token = match self.store.lock(&lock_key, &self.lock).await {
                Ok(token) => token,
                Err(LockError::Contended { tries, .. }) => {
                    debug!(
                        request_id = %route.request_id(),
                        policy_id = %self.policy_id,
                        tries,
                        "idempotency key locked"
                    );
                    self.record(IdempotencyOutcome::Conflict);
                    pipeline.fail(StatusCode::CONFLICT, LOCKED);
                    return Flow::Continue;
                }
                Err(LockError::Store(e)) => {
                    error!(
                        request_id = %route.request_id(),
                        policy_id = %self.policy_id,
                        error = %e,
                        "idempotency lock failed"
                    );
                    self.record(IdempotencyOutcome::Error);
                    pipeline.fail(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
                    return Flow::Continue;
                }
            };

            let completion = Box::new(Completion {
                store: Arc::clone(&self.store),
                token,
                data_key: data_key.clone(),
                ttl: self.ttl,
            });

            match self.store.get(&data_key).await {
                Ok(None) => self.record(IdempotencyOutcome::Executed),
                Ok(Some(stored)) => {
                    let restored = CachedResponse::from_bytes(&stored)
                        .and_then(|cached| pipeline.restore(cached));
                    match restored {
                        Ok(()) => {
                            debug!(
                                request_id = %route.request_id(),
                                policy_id = %self.policy_id,
                                "replaying stored response"
                            );
                            self.record(IdempotencyOutcome::Replayed);
                        }
                        Err(e) => {
                            error!(
                                request_id = %route.request_id(),
                                policy_id = %self.policy_id,
                                error = %e,
                                "stored response unreadable"
                            );
                            self.record(IdempotencyOutcome::Error);
                            pipeline.fail(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
                        }
                    }
                }
                Err(e) => {
                    error!(
                        request_id = %route.request_id(),
                        policy_id = %self.policy_id,
                        error = %e,
                        "idempotency lookup failed"
                    );
                    self.record(IdempotencyOutcome::Error);
                    pipeline.fail(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
                }
            }

            Flow::Defer(completion)
        })
    }
}

/// Stores the response and releases the lock.
struct Completion {
    store: Arc<dyn StateStore>,
    token: LockToken,
    data_key: String,
    ttl: Duration,
}

impl Deferred for Completion {
    fn complete<'a>(
        self: Box<Self>,
        route: &'a RouteContext,
        pipeline: &'a PipelineContext,
    ) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            if !pipeline.has_error() && !pipeline.has_cache() {
                let stored = pipeline.snapshot().to_bytes();
                match stored {
                    Ok(bytes) => {
                        let ttl = Some(self.ttl).filter(|t| !t.is_zero());
                        if let Err(e) = self.store.set(&self.data_key, Bytes::from(bytes), ttl).await {
                            warn!(request_id = %route.request_id(), error = %e, "failed to store response");
                        }
                    }
                    Err(e) => {
                        warn!(request_id = %route.request_id(), error = %e, "failed to encode response");
                    }
                }
            }
            if let Err(e) = self.store.unlock(&self.token).await {
                warn!(request_id = %route.request_id(), error = %e, "failed to release lock");
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::test_support::request;

    fn settings() -> IdempotencySettings {
        IdempotencySettings {
            id: "once".to_string(),
            key: "{{wrenchContext.request.headers.idempotency-key}}".to_string(),
            ttl: 60,
            store_id: None,
            lock_tries: 1,
            lock_retry_delay_ms: 10,
            lock_expiry_secs: 20,
        }
    }

    fn route(key: &str) -> RouteContext {
        request("POST", "/orders", "/orders")
            .header("idempotency-key", key)
            .build()
    }

    async fn first_pass(
        handler: &IdempotencyHandler,
        route: &RouteContext,
    ) -> (PipelineContext, Box<dyn Deferred>) {
        let mut pipeline = PipelineContext::new();
        let flow = handler.handle(route, &mut pipeline).await;
        match flow {
            Flow::Defer(completion) => (pipeline, completion),
            Flow::Continue => panic!("expected a deferred completion"),
        }
    }

    #[tokio::test]
    async fn test_stores_then_replays() {
        let store = Arc::new(MemoryStore::new());
        let handler = IdempotencyHandler::new(&settings(), "orders", store.clone());
        let route = route("k1");

        let (mut pipeline, completion) = first_pass(&handler, &route).await;
        assert!(!pipeline.is_halted());
        pipeline.set_status(StatusCode::CREATED);
        pipeline.set_payload(r#"{"id":7}"#);
        completion.complete(&route, &pipeline).await;

        let (replayed, completion) = first_pass(&handler, &route).await;
        assert!(replayed.has_cache());
        assert_eq!(replayed.status(), Some(StatusCode::CREATED));
        assert_eq!(replayed.payload_text(), r#"{"id":7}"#);
        completion.complete(&route, &replayed).await;
    }

    #[tokio::test]
    async fn test_concurrent_request_conflicts() {
        let store = Arc::new(MemoryStore::new());
        let handler = IdempotencyHandler::new(&settings(), "orders", store.clone());
        let route = route("k2");

        let (pipeline, completion) = first_pass(&handler, &route).await;

        let mut second = PipelineContext::new();
        let flow = handler.handle(&route, &mut second).await;
        assert!(matches!(flow, Flow::Continue));
        assert_eq!(second.status(), Some(StatusCode::CONFLICT));
        assert_eq!(second.payload_text(), LOCKED);

        completion.complete(&route, &pipeline).await;
    }

    #[tokio::test]
    async fn test_errors_are_not_stored() {
        let store = Arc::new(MemoryStore::new());
        let handler = IdempotencyHandler::new(&settings(), "orders", store.clone());
        let route = route("k3");

        let (mut pipeline, completion) = first_pass(&handler, &route).await;
        pipeline.fail(StatusCode::BAD_GATEWAY, "upstream failed");
        completion.complete(&route, &pipeline).await;

        let (retry, completion) = first_pass(&handler, &route).await;
        assert!(!retry.has_cache());
        completion.complete(&route, &retry).await;
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_fails() {
        let store = Arc::new(MemoryStore::new());
        let handler = IdempotencyHandler::new(&settings(), "orders", store.clone());
        let route = route("k4");
        let data_key = format!("{}:data", handler.base_key(&route, &PipelineContext::new()).unwrap());
        store
            .set(&data_key, Bytes::from_static(b"not json"), None)
            .await
            .unwrap();

        let (pipeline, completion) = first_pass(&handler, &route).await;
        assert_eq!(pipeline.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
        completion.complete(&route, &pipeline).await;
    }
}
