//! Configuration for the Wrench gateway.
//!
//! This crate owns the two configuration documents a gateway process reads
//! at startup:
//!
//! - The **process configuration** ([`GatewayConfig`]): listen address,
//!   timeouts, telemetry and the location of the manifest files. It is
//!   loaded in layers (defaults → TOML/JSON file → environment) by
//!   [`ConfigLoader`].
//! - The **manifest** ([`Manifest`]): the YAML description of endpoints,
//!   actions, contract maps, idempotency and rate-limit policies. It is
//!   merged from one or more files by [`ManifestLoader`] and validated as a
//!   whole, so that every cross reference resolves before the first request
//!   is served.
//!
//! Both documents are immutable once loaded and are passed explicitly to the
//! components that need them.
//!
//! # Example
//!
//! ```no_run
//! use wrench_config::{ConfigLoader, ManifestLoader};
//!
//! # fn main() -> Result<(), wrench_config::ConfigError> {
//! let config = ConfigLoader::new()
//!     .with_defaults()
//!     .with_optional_file("wrench.toml")?
//!     .with_env_prefix("WRENCH")
//!     .load()?;
//!
//! let manifest = ManifestLoader::new()
//!     .with_paths(&config.manifest.paths)?
//!     .load()?;
//!
//! println!("{} endpoints", manifest.api.endpoints.len());
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration File Format
//!
//! ```toml
//! [server]
//! http_addr = "0.0.0.0:8080"
//! shutdown_timeout_secs = 30
//! request_timeout_ms = 30000
//!
//! [telemetry]
//! service_name = "orders-gateway"
//! environment = "production"
//!
//! [telemetry.metrics]
//! enabled = true
//! addr = "0.0.0.0:9090"
//!
//! [telemetry.logging]
//! level = "info"
//! format = "json"
//!
//! [manifest]
//! paths = ["config/manifest.yaml"]
//! ```
//!
//! # Environment Variable Overrides
//!
//! Values can be overridden with `PREFIX__SECTION__KEY` variables:
//!
//! - `WRENCH__SERVER__HTTP_ADDR=0.0.0.0:9000`
//! - `WRENCH__TELEMETRY__LOGGING__LEVEL=debug`
//! - `WRENCH__MANIFEST__PATHS=base.yaml,routes.yaml`

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod config;
mod error;
mod loader;
mod manifest;
mod manifest_loader;
mod validate;

pub use config::*;
pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use manifest::*;
pub use manifest_loader::ManifestLoader;
pub use validate::validate_manifest;
