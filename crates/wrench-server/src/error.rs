//! Server errors.

use thiserror::Error;

/// The server could not start or keep running.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The configured address does not parse.
    #[error("invalid address '{addr}': {reason}")]
    InvalidAddress {
        /// Configured address.
        addr: String,
        /// Parser message.
        reason: String,
    },

    /// The listener could not be bound.
    #[error("failed to bind {addr}")]
    Bind {
        /// Address that was tried.
        addr: String,
        /// Cause.
        #[source]
        source: std::io::Error,
    },

    /// An endpoint has no compiled chain.
    #[error("no chain compiled for {key}")]
    MissingChain {
        /// `METHOD_route` key.
        key: String,
    },

    /// An endpoint cannot be served.
    #[error("route {route} is invalid: {reason}")]
    InvalidRoute {
        /// Route template.
        route: String,
        /// What is wrong.
        reason: String,
    },

    /// Accepting or serving failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
