//! Compiled chains and the registry that serves them.

use bytes::Bytes;
use http::{Response, StatusCode};
use http_body_util::Full;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, warn};
use wrench_core::{PipelineContext, RouteContext};
use wrench_telemetry::metrics;

use crate::handler::{Flow, Handler};
use crate::stages::responder;

/// A handler stored in a chain.
pub type BoxedHandler = Arc<dyn Handler>;

/// Message written when the chain deadline elapses.
pub const DEADLINE_MESSAGE: &str = "request deadline exceeded";

/// The handlers of one endpoint, in execution order.
///
/// The chain runs every handler in a loop. Once the pipeline is halted only
/// handlers that run when halted are invoked. Deferred completions run last,
/// most recent first.
pub struct Chain {
    key: String,
    handlers: Vec<BoxedHandler>,
    deadline: Option<Duration>,
}

impl fmt::Debug for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chain")
            .field("key", &self.key)
            .field("handlers", &self.handler_names())
            .field("deadline", &self.deadline)
            .finish()
    }
}

impl Chain {
    /// Creates a chain without a deadline.
    pub fn new(key: impl Into<String>, handlers: Vec<BoxedHandler>) -> Self {
        Self {
            key: key.into(),
            handlers,
            deadline: None,
        }
    }

    /// Bounds the handlers that do not run when halted.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// The `METHOD_route` key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Handler names in order.
    pub fn handler_names(&self) -> Vec<&'static str> {
        self.handlers.iter().map(|h| h.name()).collect()
    }

    /// Runs the chain against an existing pipeline.
    pub async fn execute(&self, route: &RouteContext, pipeline: &mut PipelineContext) {
        let deadline = self.deadline.map(|d| Instant::now() + d);
        let mut completions = Vec::new();

        for handler in &self.handlers {
            let always = handler.runs_when_halted();
            if pipeline.is_halted() && !always {
                debug!(chain = %self.key, handler = handler.name(), "skipped, pipeline halted");
                continue;
            }

            let flow = match deadline.filter(|_| !always) {
                Some(at) => {
                    let outcome = timeout_at(at, handler.handle(route, pipeline)).await;
                    match outcome {
                        Ok(flow) => flow,
                        Err(_) => {
                            warn!(
                                chain = %self.key,
                                handler = handler.name(),
                                request_id = %route.request_id(),
                                "deadline exceeded"
                            );
                            pipeline.fail(StatusCode::GATEWAY_TIMEOUT, DEADLINE_MESSAGE);
                            continue;
                        }
                    }
                }
                None => handler.handle(route, pipeline).await,
            };

            if let Flow::Defer(completion) = flow {
                completions.push(completion);
            }
        }

        while let Some(completion) = completions.pop() {
            completion.complete(route, pipeline).await;
        }
    }

    /// Runs the chain with a fresh pipeline and returns it.
    pub async fn run(&self, route: &RouteContext) -> PipelineContext {
        let mut pipeline = PipelineContext::new();
        self.execute(route, &mut pipeline).await;
        pipeline
    }

    /// Runs the chain and renders the HTTP response.
    pub async fn respond(&self, route: &RouteContext) -> Response<Full<Bytes>> {
        let pipeline = self.run(route).await;
        let response = responder::render(&pipeline);

        let status = response.status().as_u16();
        let elapsed = pipeline.elapsed();
        metrics::record_request(&self.key, status, elapsed);
        wrench_telemetry::log_request_complete!(
            route.request_id(),
            self.key,
            status,
            u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
        );
        response
    }
}

/// Compiled chains keyed by `METHOD_route`. Read-only once built.
#[derive(Debug, Default)]
pub struct ChainRegistry {
    chains: HashMap<String, Arc<Chain>>,
}

impl ChainRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, chain: Chain) {
        self.chains.insert(chain.key().to_string(), Arc::new(chain));
    }

    /// Looks a chain up by key.
    pub fn get(&self, key: &str) -> Option<Arc<Chain>> {
        self.chains.get(key).cloned()
    }

    /// Looks a chain up by method and route template.
    pub fn find(&self, method: &str, route: &str) -> Option<Arc<Chain>> {
        self.get(&format!("{}_{route}", method.to_ascii_uppercase()))
    }

    /// Registered keys, sorted.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.chains.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    /// Number of chains.
    pub fn len(&self) -> usize {
        self.chains.len()
    }

    /// Whether no chain is registered.
    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }
}
