//! Process configuration.
//!
//! [`GatewayConfig`] says how the gateway process runs: where it listens,
//! how long a chain may take, where telemetry goes and which manifest files
//! to read. What it serves is described by the [`Manifest`](crate::Manifest).
//!
//! Every section is `#[serde(default)]`, so a file only names what it
//! changes, and `deny_unknown_fields`, so a typo fails at startup.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

use crate::ConfigError;

/// Complete gateway process configuration.
///
/// # Example
///
/// ```
/// use wrench_config::GatewayConfig;
///
/// let config: GatewayConfig = toml::from_str(r#"
///     [server]
///     http_addr = "127.0.0.1:3000"
/// "#).unwrap();
/// assert_eq!(config.server.http_addr, "127.0.0.1:3000");
/// assert_eq!(config.manifest.paths, vec!["manifest.yaml"]);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default, deny_unknown_fields)]
pub struct GatewayConfig {
    /// Listener and request limits.
    pub server: ServerConfig,
    /// Logs and metrics.
    pub telemetry: TelemetryConfigSection,
    /// Manifest locations.
    pub manifest: ManifestConfig,
}

impl GatewayConfig {
    /// Checks the values serde cannot.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        socket_addr("server.http_addr", &self.server.http_addr)?;
        if self.server.request_timeout_ms == 0 {
            return Err(ConfigError::invalid_value(
                "server.request_timeout_ms",
                "a chain needs a deadline above zero",
            ));
        }
        if self.server.max_body_bytes == 0 {
            return Err(ConfigError::invalid_value(
                "server.max_body_bytes",
                "no request body would fit",
            ));
        }
        if self.telemetry.metrics.enabled {
            socket_addr("telemetry.metrics.addr", &self.telemetry.metrics.addr)?;
        }
        if self.manifest.paths.iter().all(|p| p.trim().is_empty()) {
            return Err(ConfigError::invalid_value(
                "manifest.paths",
                "at least one manifest file or directory is required",
            ));
        }
        Ok(())
    }
}

fn socket_addr(field: &str, value: &str) -> Result<SocketAddr, ConfigError> {
    value
        .parse()
        .map_err(|e| ConfigError::invalid_value(field, format!("'{value}': {e}")))
}

/// The HTTP listener.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Bind address.
    pub http_addr: String,
    /// How long in-flight requests may drain after a shutdown signal.
    pub shutdown_timeout_secs: u64,
    /// Deadline for a whole handler chain, in milliseconds.
    pub request_timeout_ms: u64,
    /// Largest request body accepted, in bytes.
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: "0.0.0.0:8080".to_string(),
            shutdown_timeout_secs: 30,
            request_timeout_ms: 30_000,
            max_body_bytes: 4 * 1024 * 1024,
        }
    }
}

impl ServerConfig {
    /// The chain deadline.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// The drain period.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

/// Logs and metrics.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct TelemetryConfigSection {
    /// Service name attached to logs and metrics.
    pub service_name: String,
    /// Deployment environment label.
    pub environment: String,
    /// Prometheus exporter.
    pub metrics: MetricsConfig,
    /// Log output.
    pub logging: LoggingConfig,
}

impl Default for TelemetryConfigSection {
    fn default() -> Self {
        Self {
            service_name: "wrench".to_string(),
            environment: "development".to_string(),
            metrics: MetricsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Prometheus exporter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct MetricsConfig {
    /// Whether to serve `/metrics`.
    pub enabled: bool,
    /// Scrape address.
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

/// Log line encoding.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per line.
    #[default]
    Json,
    /// Multi-line, human readable.
    Pretty,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            _ => Err(format!("expected 'json' or 'pretty', got '{s}'")),
        }
    }
}

/// Log output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// Whether to install a subscriber at all.
    pub enabled: bool,
    /// Filter directive, e.g. `info,wrench_chain=debug`.
    pub level: String,
    /// Line encoding.
    pub format: LogFormat,
    /// Colour pretty output.
    pub ansi_enabled: bool,
    /// Add source file and line.
    pub include_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: "info".to_string(),
            format: LogFormat::Json,
            ansi_enabled: false,
            include_location: false,
        }
    }
}

/// Where the manifest lives.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ManifestConfig {
    /// Files or directories, merged in order. A directory contributes its
    /// `.yaml`/`.yml` files sorted by name.
    pub paths: Vec<String>,
}

impl Default for ManifestConfig {
    fn default() -> Self {
        Self {
            paths: vec!["manifest.yaml".to_string()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = GatewayConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.server.shutdown_timeout(), Duration::from_secs(30));
        assert_eq!(config.telemetry.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_partial_sections_keep_defaults() {
        let config: GatewayConfig = toml::from_str(
            r#"
            [server]
            request_timeout_ms = 500

            [telemetry.logging]
            format = "pretty"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.request_timeout_ms, 500);
        assert_eq!(config.server.http_addr, "0.0.0.0:8080");
        assert_eq!(config.telemetry.logging.format, LogFormat::Pretty);
        assert_eq!(config.telemetry.logging.level, "info");
        assert_eq!(config.telemetry.service_name, "wrench");
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let result: Result<GatewayConfig, _> = toml::from_str("[server]\nhttp3 = true\n");
        assert!(result.is_err());

        let result: Result<GatewayConfig, _> = toml::from_str("[routes]\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_names_the_field() {
        let cases = [
            (
                GatewayConfig {
                    server: ServerConfig {
                        http_addr: "localhost".to_string(),
                        ..ServerConfig::default()
                    },
                    ..GatewayConfig::default()
                },
                "server.http_addr",
            ),
            (
                GatewayConfig {
                    server: ServerConfig {
                        request_timeout_ms: 0,
                        ..ServerConfig::default()
                    },
                    ..GatewayConfig::default()
                },
                "server.request_timeout_ms",
            ),
            (
                GatewayConfig {
                    manifest: ManifestConfig {
                        paths: vec![" ".to_string()],
                    },
                    ..GatewayConfig::default()
                },
                "manifest.paths",
            ),
        ];

        for (config, field) in cases {
            let err = config.validate().unwrap_err();
            assert!(
                matches!(err, ConfigError::InvalidValue { field: ref f, .. } if f == field),
                "{err}"
            );
        }
    }

    #[test]
    fn test_metrics_addr_checked_only_when_enabled() {
        let mut config = GatewayConfig::default();
        config.telemetry.metrics.addr = "nowhere".to_string();
        assert!(config.validate().is_err());

        config.telemetry.metrics.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_log_format_from_str() {
        assert_eq!("PRETTY".parse::<LogFormat>(), Ok(LogFormat::Pretty));
        assert!("xml".parse::<LogFormat>().is_err());
    }
}
