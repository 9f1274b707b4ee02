//! The handler contract.
//!
//! Every step of a compiled chain implements [`Handler`]. Handlers never call
//! each other: the [`Chain`](crate::Chain) loop invokes them in order and
//! skips the ones that do not run once the pipeline is halted.
//!
//! # Example
//!
//! ```ignore
//! use wrench_chain::{BoxFuture, Flow, Handler};
//! use wrench_core::{PipelineContext, RouteContext};
//!
//! struct Stamp;
//!
//! impl Handler for Stamp {
//!     fn name(&self) -> &'static str {
//!         "stamp"
//!     }
//!
//!     fn handle<'a>(
//!         &'a self,
//!         _route: &'a RouteContext,
//!         pipeline: &'a mut PipelineContext,
//!     ) -> BoxFuture<'a, Flow> {
//!         Box::pin(async move {
//!             pipeline.set_header("x-stamped", "1");
//!             Flow::Continue
//!         })
//!     }
//! }
//! ```

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use wrench_core::{PipelineContext, RouteContext};

/// A boxed, sendable future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// One step of a chain.
///
/// Handlers hold only their static settings; per-request data lives in the
/// contexts they receive.
pub trait Handler: Send + Sync {
    /// Stable name, used in logs.
    fn name(&self) -> &'static str;

    /// Whether the handler still runs after `hasError` or `hasCache` is set.
    fn runs_when_halted(&self) -> bool {
        false
    }

    /// Processes the request.
    fn handle<'a>(
        &'a self,
        route: &'a RouteContext,
        pipeline: &'a mut PipelineContext,
    ) -> BoxFuture<'a, Flow>;
}

/// Work that runs after the whole chain, whatever the outcome.
pub trait Deferred: Send {
    /// Runs the completion.
    fn complete<'a>(
        self: Box<Self>,
        route: &'a RouteContext,
        pipeline: &'a PipelineContext,
    ) -> BoxFuture<'a, ()>;
}

/// What the chain does after a handler returns.
pub enum Flow {
    /// Move to the next handler.
    Continue,
    /// Move on, and run this completion once the chain has finished.
    Defer(Box<dyn Deferred>),
}

impl fmt::Debug for Flow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Continue => write!(f, "Flow::Continue"),
            Self::Defer(_) => write!(f, "Flow::Defer(<completion>)"),
        }
    }
}
