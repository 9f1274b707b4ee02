//! Structured logging through `tracing-subscriber`.
//!
//! One `fmt` layer, JSON or pretty, behind an [`EnvFilter`] built from the
//! configured directive. The chain logs one line per request with
//! [`log_request_complete!`](crate::log_request_complete).

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};
use wrench_config::{LogFormat, LoggingConfig};

use crate::error::TelemetryError;
use crate::TelemetryResult;

/// What [`init_logging`] installs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Install nothing when false.
    pub enabled: bool,
    /// `EnvFilter` directive, e.g. `info,wrench_chain=debug,hyper=warn`.
    pub filter: String,
    /// Line encoding.
    pub format: LogFormat,
    /// Colour pretty output.
    pub ansi: bool,
    /// Add source file and line.
    pub location: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::from(&LoggingConfig::default())
    }
}

impl From<&LoggingConfig> for LogConfig {
    fn from(section: &LoggingConfig) -> Self {
        Self {
            enabled: section.enabled,
            filter: section.level.clone(),
            format: section.format,
            ansi: section.ansi_enabled,
            location: section.include_location,
        }
    }
}

/// Installs the global subscriber.
///
/// # Errors
///
/// `TelemetryError::LoggingInit` for a bad filter directive or when a
/// global subscriber is already set.
pub fn init_logging(config: &LogConfig) -> TelemetryResult<()> {
    if !config.enabled {
        return Ok(());
    }

    let filter = EnvFilter::try_new(&config.filter).map_err(|e| {
        TelemetryError::LoggingInit(format!("bad filter '{}': {e}", config.filter))
    })?;

    let layer: Box<dyn Layer<Registry> + Send + Sync> = match config.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_file(config.location)
            .with_line_number(config.location)
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .pretty()
            .with_ansi(config.ansi)
            .with_file(config.location)
            .with_line_number(config.location)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(layer.with_filter(filter))
        .try_init()
        .map_err(|e| TelemetryError::LoggingInit(e.to_string()))
}

/// Logs a completed request.
#[macro_export]
macro_rules! log_request_complete {
    ($request_id:expr, $chain:expr, $status:expr, $duration_ms:expr) => {
        tracing::info!(
            request_id = %$request_id,
            chain = %$chain,
            http.status_code = $status,
            duration_ms = $duration_ms,
            "request completed"
        );
    };
}
