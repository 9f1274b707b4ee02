//! Liveness endpoint.
//!
//! `GET /health` (and the legacy `GET /hc`) answers with the service
//! identity, uptime and the number of served routes.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Paths answered by the health check.
pub const HEALTH_PATHS: [&str; 2] = ["/health", "/hc"];

/// Body of a health response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthStatus {
    /// Always `healthy` while the process serves requests.
    pub status: String,
    /// Service name.
    pub service: String,
    /// Service version.
    pub version: String,
    /// Seconds since startup.
    pub uptime_seconds: u64,
    /// Number of manifest routes.
    pub routes: usize,
}

/// Produces [`HealthStatus`] snapshots.
#[derive(Debug, Clone)]
pub struct HealthCheck {
    service: String,
    version: String,
    routes: usize,
    started: Instant,
}

impl HealthCheck {
    /// Starts the uptime clock.
    pub fn new(service: impl Into<String>, version: impl Into<String>, routes: usize) -> Self {
        Self {
            service: service.into(),
            version: version.into(),
            routes,
            started: Instant::now(),
        }
    }

    /// Time since [`HealthCheck::new`].
    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    /// Current status.
    pub fn status(&self) -> HealthStatus {
        HealthStatus {
            status: "healthy".to_string(),
            service: self.service.clone(),
            version: self.version.clone(),
            uptime_seconds: self.uptime().as_secs(),
            routes: self.routes,
        }
    }
}
