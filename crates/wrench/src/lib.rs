//! # Wrench
//!
//! **A declarative, manifest-driven HTTP gateway.**
//!
//! Endpoints, actions, payload contract maps, idempotency and rate-limit
//! policies are described in a YAML manifest. At startup every endpoint is
//! compiled into a linear handler chain; at request time the chain runs top
//! to bottom over a per-request pipeline context.
//!
//! ```text
//! Request → Entry → Auth → RateLimit → Idempotency
//!         → [before map → Action → after map]* → Responder → Response
//! ```
//!
//! ## Crates
//!
//! | Re-export | Crate |
//! |-----------|-------|
//! | [`config`] | manifest schema and process configuration |
//! | [`core`] | JSON paths, calculated values, contract maps, contexts |
//! | [`chain`] | handlers, chain builder, stores, action executors |
//! | [`server`] | hyper server and route table |
//! | [`telemetry`] | logging and metrics |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use wrench::Gateway;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let manifests = vec!["manifest.yaml".into()];
//!     Gateway::load(None, &manifests)?.run().await?;
//!     Ok(())
//! }
//! ```

#![doc(html_root_url = "https://docs.rs/wrench/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod gateway;

pub use gateway::{Gateway, GatewayError, ENV_PREFIX};

pub use wrench_chain as chain;
pub use wrench_config as config;
pub use wrench_core as core;
pub use wrench_server as server;
pub use wrench_telemetry as telemetry;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Common imports.
pub mod prelude {
    pub use crate::{Gateway, GatewayError};
    pub use wrench_chain::{
        ActionError, ActionExecutor, ActionOutput, ActionRequest, ChainBuilder, ExecutorRegistry,
        StateStore, StoreRegistry,
    };
    pub use wrench_config::{GatewayConfig, Manifest};
    pub use wrench_core::{PipelineContext, RouteContext};
}
