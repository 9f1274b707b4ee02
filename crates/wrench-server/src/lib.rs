//! # Wrench Server
//!
//! HTTP front end of the Wrench gateway:
//!
//! - HTTP/1.1 via hyper, one task per connection
//! - [`RouteTable`] matching of manifest route templates and proxy prefixes
//! - request body limit and read deadline
//! - graceful shutdown on SIGTERM / Ctrl+C
//! - `GET /health`
//!
//! ## Example
//!
//! ```rust,ignore
//! use wrench_server::{HealthCheck, RouteTable, Server};
//!
//! let routes = RouteTable::new(&manifest, &chains)?;
//! let health = HealthCheck::new(manifest.service_name(), "1.0.0", routes.len());
//! Server::new(config.server.clone(), routes, health).run().await?;
//! ```

#![doc(html_root_url = "https://docs.rs/wrench-server/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod error;
pub mod health;
pub mod routes;
mod server;
pub mod shutdown;

pub use error::ServerError;
pub use health::{HealthCheck, HealthStatus};
pub use routes::{Route, RouteLookup, RouteTable};
pub use server::{HttpResponse, Server};
pub use shutdown::{ConnectionTracker, ShutdownSignal};
