//! Prometheus metrics.
//!
//! | Metric | Type | Labels |
//! |--------|------|--------|
//! | `wrench_requests_total` | Counter | `chain`, `status` |
//! | `wrench_request_duration_seconds` | Histogram | `chain` |
//! | `wrench_action_duration_seconds` | Histogram | `action`, `outcome` |
//! | `wrench_rate_limit_decisions_total` | Counter | `policy`, `decision` |
//! | `wrench_idempotency_outcomes_total` | Counter | `policy`, `outcome` |
//!
//! Recording without an installed recorder is a no-op.

use crate::error::TelemetryError;
use crate::TelemetryResult;
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Duration;
use wrench_config::MetricsConfig as MetricsSection;

/// Metrics configuration.
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// Whether metrics are enabled.
    pub enabled: bool,

    /// Address the scrape endpoint listens on.
    pub addr: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            addr: "0.0.0.0:9090".to_string(),
        }
    }
}

impl From<&MetricsSection> for MetricsConfig {
    fn from(section: &MetricsSection) -> Self {
        Self {
            enabled: section.enabled,
            addr: section.addr.clone(),
        }
    }
}

/// Outcome of an idempotency check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdempotencyOutcome {
    /// First execution for the key.
    Executed,
    /// Stored response replayed.
    Replayed,
    /// Lock held by another request.
    Conflict,
    /// Store failure.
    Error,
}

impl IdempotencyOutcome {
    /// Label value.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Executed => "executed",
            Self::Replayed => "replayed",
            Self::Conflict => "conflict",
            Self::Error => "error",
        }
    }
}

/// Installs the Prometheus recorder and its HTTP scrape listener.
///
/// The listener runs on the current tokio runtime when there is one.
///
/// # Errors
///
/// Returns `TelemetryError::InvalidAddress` for a bad address and
/// `TelemetryError::MetricsInit` when a recorder is already installed.
pub fn init_metrics(config: &MetricsConfig) -> TelemetryResult<()> {
    if !config.enabled {
        return Ok(());
    }

    let addr: SocketAddr = config
        .addr
        .parse()
        .map_err(|e| TelemetryError::InvalidAddress(format!("{}: {e}", config.addr)))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;

    register_metric_descriptions();

    Ok(())
}

fn register_metric_descriptions() {
    describe_counter!("wrench_requests_total", "Total number of requests served by a chain");
    describe_histogram!(
        "wrench_request_duration_seconds",
        "Chain execution time in seconds"
    );
    describe_histogram!(
        "wrench_action_duration_seconds",
        "Action executor latency in seconds"
    );
    describe_counter!(
        "wrench_rate_limit_decisions_total",
        "Rate-limit admissions and denials"
    );
    describe_counter!(
        "wrench_idempotency_outcomes_total",
        "Idempotency checks by outcome"
    );
}

/// Records a completed request.
pub fn record_request(chain: &str, status_code: u16, duration: Duration) {
    counter!(
        "wrench_requests_total",
        "chain" => chain.to_string(),
        "status" => status_code.to_string()
    )
    .increment(1);

    histogram!(
        "wrench_request_duration_seconds",
        "chain" => chain.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Records one action execution.
pub fn record_action(action_id: &str, success: bool, duration: Duration) {
    histogram!(
        "wrench_action_duration_seconds",
        "action" => action_id.to_string(),
        "outcome" => if success { "success" } else { "failure" }
    )
    .record(duration.as_secs_f64());
}

/// Records a rate-limit decision.
pub fn record_rate_limit(policy_id: &str, allowed: bool) {
    counter!(
        "wrench_rate_limit_decisions_total",
        "policy" => policy_id.to_string(),
        "decision" => if allowed { "allowed" } else { "denied" }
    )
    .increment(1);
}

/// Records an idempotency outcome.
pub fn record_idempotency(policy_id: &str, outcome: IdempotencyOutcome) {
    counter!(
        "wrench_idempotency_outcomes_total",
        "policy" => policy_id.to_string(),
        "outcome" => outcome.as_str()
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MetricsConfig::default();
        assert!(config.enabled);
        assert_eq!(config.addr, "0.0.0.0:9090");
    }

    #[test]
    fn test_disabled_metrics() {
        let config = MetricsConfig {
            enabled: false,
            addr: "not an address".to_string(),
        };
        assert!(init_metrics(&config).is_ok());
    }

    #[test]
    fn test_invalid_address() {
        let config = MetricsConfig {
            enabled: true,
            addr: "not an address".to_string(),
        };
        assert!(matches!(
            init_metrics(&config),
            Err(TelemetryError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_record_functions_dont_panic() {
        record_request("GET_/orders", 200, Duration::from_millis(10));
        record_action("fetch", true, Duration::from_millis(3));
        record_rate_limit("per-client", false);
        record_idempotency("once", IdempotencyOutcome::Replayed);
    }

    #[test]
    fn test_outcome_labels() {
        assert_eq!(IdempotencyOutcome::Conflict.as_str(), "conflict");
        assert_eq!(IdempotencyOutcome::Executed.as_str(), "executed");
    }
}
