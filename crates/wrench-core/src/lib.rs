//! # Wrench Core
//!
//! Request-independent building blocks of the Wrench gateway:
//!
//! - [`json_path`] - dot-addressed reads and writes on JSON documents
//! - [`resolver`] - `{{...}}` calculated values
//! - [`ContractMap`] - compiled payload transformations
//! - [`PipelineContext`] / [`RouteContext`] - per-request state
//!
//! ## Example
//!
//! ```
//! use wrench_core::json_path;
//! use serde_json::json;
//!
//! let mut doc = json!({"user": {"name": "Ana"}}).as_object().cloned().unwrap();
//! json_path::rename(&mut doc, "user.name", "fullName");
//!
//! assert_eq!(serde_json::Value::Object(doc), json!({"user": {}, "fullName": "Ana"}));
//! ```

#![doc(html_root_url = "https://docs.rs/wrench-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod context;
mod contract;
mod error;
pub mod json_path;
pub mod layout;
pub mod numeric;
pub mod resolver;

pub use context::{decode_claims, CachedResponse, PipelineContext, RequestId, RouteContext};
pub use contract::{ContractMap, DEFAULT_ORDER};
pub use error::{ContextError, ContractError};
