//! Token-bucket admission per policy key.

use hmac::digest::InvalidLength;
use http::StatusCode;
use std::sync::Arc;
use tracing::{debug, error};
use wrench_config::RateLimitSettings;
use wrench_core::{resolver, PipelineContext, RouteContext};
use wrench_telemetry::metrics;

use super::hash_key;
use crate::handler::{BoxFuture, Flow, Handler};
use crate::store::{RateSpec, StateStore};

/// Standard headers written by this stage.
pub mod headers {
    /// Seconds until the next token.
    pub const RETRY_AFTER: &str = "retry-after";
}

/// Body of a 429.
pub const RATE_LIMITED: &str = "rate limit exceeded";

/// Rejects requests beyond the policy's rate with `429 Too Many Requests`.
///
/// The bucket key is the route (when `routeEnabled`), the policy id and every
/// resolved `keys` entry, hashed. Requests with the same key share a bucket.
#[derive(Debug, Clone)]
pub struct RateLimitHandler {
    policy_id: String,
    route_enabled: bool,
    keys: Vec<String>,
    rate: RateSpec,
    store: Arc<dyn StateStore>,
}

impl RateLimitHandler {
    /// Creates the stage for one policy.
    pub fn new(settings: &RateLimitSettings, rate: RateSpec, store: Arc<dyn StateStore>) -> Self {
        Self {
            policy_id: settings.id.clone(),
            route_enabled: settings.route_enabled,
            keys: settings.keys.clone(),
            rate,
            store,
        }
    }

    fn bucket_key(
        &self,
        route: &RouteContext,
        pipeline: &PipelineContext,
    ) -> Result<String, InvalidLength> {
        let mut raw = String::new();
        if self.route_enabled {
            raw.push_str(route.route());
        }
        raw.push_str(&self.policy_id);
        for key in &self.keys {
            raw.push_str(&resolver::resolve_string(key, route, pipeline));
        }
        hash_key(route.route(), &raw)
    }
}

/// Whole seconds to wait, rounded up and never zero.
fn retry_after_secs(wait: std::time::Duration) -> u64 {
    let secs = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
    secs.max(1)
}

impl Handler for RateLimitHandler {
    fn name(&self) -> &'static str {
        "rate_limit"
    }

    fn handle<'a>(
        &'a self,
        route: &'a RouteContext,
        pipeline: &'a mut PipelineContext,
    ) -> BoxFuture<'a, Flow> {
        Box::pin(async move {
            let key = match self.bucket_key(route, pipeline) {
                Ok(key) => key,
                Err(e) => {
                    error!(request_id = %route.request_id(), error = %e, "rate limit key failed");
                    pipeline.fail(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
                    return Flow::Continue;
                }
            };
            match self.store.allow(&key, &self.rate).await {
                Ok(decision) if decision.allowed => {
                    metrics::record_rate_limit(&self.policy_id, true);
                }
                Ok(decision) => {
                    metrics::record_rate_limit(&self.policy_id, false);
                    let secs = retry_after_secs(decision.retry_after);
                    debug!(
                        request_id = %route.request_id(),
                        policy_id = %self.policy_id,
                        retry_after = secs,
                        "rate limit exceeded"
                    );
                    pipeline.set_header(headers::RETRY_AFTER, secs.to_string());
                    pipeline.fail(StatusCode::TOO_MANY_REQUESTS, RATE_LIMITED);
                }
                Err(e) => {
                    error!(
                        request_id = %route.request_id(),
                        policy_id = %self.policy_id,
                        error = %e,
                        "rate limit store failed"
                    );
                    pipeline.fail(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
                }
            }
            Flow::Continue
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::test_support::request;
    use std::time::Duration;

    fn settings(keys: &[&str]) -> RateLimitSettings {
        RateLimitSettings {
            id: "per-client".to_string(),
            route_enabled: true,
            keys: keys.iter().map(|k| (*k).to_string()).collect(),
            requests_per_second: Some(2),
            requests_per_minute: None,
            burst_limit: Some(2),
            store_id: None,
        }
    }

    fn handler(keys: &[&str]) -> RateLimitHandler {
        let settings = settings(keys);
        let rate = RateSpec::from_settings(&settings).unwrap();
        RateLimitHandler::new(&settings, rate, Arc::new(MemoryStore::new()))
    }

    async fn call(handler: &RateLimitHandler, client: &str) -> PipelineContext {
        let route = request("GET", "/orders", "/orders")
            .header("x-client", client)
            .build();
        let mut pipeline = PipelineContext::new();
        handler.handle(&route, &mut pipeline).await;
        pipeline
    }

    #[test]
    fn test_retry_after_rounds_up() {
        assert_eq!(retry_after_secs(Duration::from_millis(1)), 1);
        assert_eq!(retry_after_secs(Duration::ZERO), 1);
        assert_eq!(retry_after_secs(Duration::from_millis(1500)), 2);
        assert_eq!(retry_after_secs(Duration::from_secs(3)), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_denies_beyond_burst() {
        let handler = handler(&["{{wrenchContext.request.headers.x-client}}"]);

        assert!(!call(&handler, "a").await.has_error());
        assert!(!call(&handler, "a").await.has_error());

        let denied = call(&handler, "a").await;
        assert_eq!(denied.status(), Some(StatusCode::TOO_MANY_REQUESTS));
        assert_eq!(denied.payload_text(), RATE_LIMITED);
        assert_eq!(
            denied.headers().get(headers::RETRY_AFTER).map(String::as_str),
            Some("1")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_keys_separate_buckets() {
        let handler = handler(&["{{wrenchContext.request.headers.x-client}}"]);
        call(&handler, "a").await;
        call(&handler, "a").await;
        assert!(call(&handler, "a").await.has_error());
        assert!(!call(&handler, "b").await.has_error());
    }

    #[tokio::test(start_paused = true)]
    async fn test_refills_over_time() {
        let handler = handler(&[]);
        for _ in 0..6 {
            assert!(!call(&handler, "a").await.has_error());
            tokio::time::advance(Duration::from_millis(500)).await;
        }
    }
}
