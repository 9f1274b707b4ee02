//! # Wrench Chain
//!
//! Turns a validated [`Manifest`](wrench_config::Manifest) into one compiled
//! [`Chain`] per endpoint and runs those chains against requests.
//!
//! ## Architecture
//!
//! ```text
//! Request → Entry → Auth → RateLimit → Idempotency
//!                                          │
//!             ┌────────────────────────────┘
//!             ▼
//!   [before map → Action → after map]*  → Responder → Response
//!                                          ▲
//!          deferred completions run here ──┘
//! ```
//!
//! - [`ChainBuilder`] resolves every manifest reference once, at startup.
//! - [`Handler`] is the contract each stage implements.
//! - [`store`] holds the shared state behind idempotency and rate limiting.
//! - [`actions`] holds the built-in action executors and their registry.
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use wrench_chain::ChainBuilder;
//! use wrench_config::Manifest;
//!
//! let manifest = Manifest::from_yaml_str(r#"
//! api:
//!   endpoints:
//!     - route: /echo
//!       method: post
//!       actionId: echo
//! actions:
//!   - id: echo
//!     type: httpRequestMock
//!     http:
//!       mock:
//!         mirrorBody: true
//! "#).unwrap();
//!
//! let chains = ChainBuilder::new(Arc::new(manifest)).build().unwrap();
//! assert_eq!(chains.keys(), vec!["POST_/echo"]);
//! ```

#![doc(html_root_url = "https://docs.rs/wrench-chain/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod actions;
mod builder;
mod chain;
mod error;
pub mod handler;
pub mod stages;
pub mod store;

pub use actions::{ActionError, ActionExecutor, ActionOutput, ActionRequest, ExecutorRegistry};
pub use builder::ChainBuilder;
pub use chain::{BoxedHandler, Chain, ChainRegistry, DEADLINE_MESSAGE};
pub use error::BuildError;
pub use handler::{BoxFuture, Deferred, Flow, Handler};
pub use stages::responder::render;
pub use store::{MemoryStore, StateStore, StoreError, StoreRegistry};

#[cfg(test)]
pub(crate) mod test_support {
    use bytes::Bytes;
    use std::sync::Arc;
    use wrench_config::{EndpointSettings, HttpMethod};
    use wrench_core::RouteContext;

    /// A request against an endpoint built from `method` and `template`.
    pub(crate) fn request(method: &str, template: &str, uri: &str) -> TestRequest {
        let endpoint = EndpointSettings {
            route: template.to_string(),
            method: method.parse::<HttpMethod>().unwrap(),
            ..Default::default()
        };
        TestRequest {
            method: method.to_string(),
            uri: uri.to_string(),
            headers: Vec::new(),
            endpoint,
        }
    }

    pub(crate) struct TestRequest {
        method: String,
        uri: String,
        headers: Vec<(String, String)>,
        endpoint: EndpointSettings,
    }

    impl TestRequest {
        pub(crate) fn header(mut self, name: &str, value: &str) -> Self {
            self.headers.push((name.to_string(), value.to_string()));
            self
        }

        pub(crate) fn endpoint(mut self, f: impl FnOnce(&mut EndpointSettings)) -> Self {
            f(&mut self.endpoint);
            self
        }

        pub(crate) fn body(self, body: &str) -> RouteContext {
            self.finish(Bytes::copy_from_slice(body.as_bytes()))
        }

        pub(crate) fn build(self) -> RouteContext {
            self.finish(Bytes::new())
        }

        fn finish(self, body: Bytes) -> RouteContext {
            let mut builder = http::Request::builder()
                .method(self.method.as_str())
                .uri(self.uri.as_str());
            for (name, value) in &self.headers {
                builder = builder.header(name.as_str(), value.as_str());
            }
            let request = builder.body(body).unwrap();
            RouteContext::from_request(request, Arc::new(self.endpoint))
        }
    }
}
