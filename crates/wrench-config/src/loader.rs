//! Layered loading of the process configuration.

use std::env;
use std::ffi::OsStr;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use tracing::debug;

use crate::{ConfigError, GatewayConfig};

/// Applies one override value to the configuration.
type Setter = fn(&mut GatewayConfig, &str) -> Result<(), String>;

/// Every `PREFIX__<KEY>` the loader understands.
const OVERRIDES: &[(&str, Setter)] = &[
    ("SERVER__HTTP_ADDR", |c, v| {
        c.server.http_addr = v.trim().to_string();
        Ok(())
    }),
    ("SERVER__SHUTDOWN_TIMEOUT_SECS", |c, v| {
        c.server.shutdown_timeout_secs = number(v)?;
        Ok(())
    }),
    ("SERVER__REQUEST_TIMEOUT_MS", |c, v| {
        c.server.request_timeout_ms = number(v)?;
        Ok(())
    }),
    ("SERVER__MAX_BODY_BYTES", |c, v| {
        c.server.max_body_bytes = number(v)?;
        Ok(())
    }),
    ("TELEMETRY__SERVICE_NAME", |c, v| {
        c.telemetry.service_name = v.trim().to_string();
        Ok(())
    }),
    ("TELEMETRY__ENVIRONMENT", |c, v| {
        c.telemetry.environment = v.trim().to_string();
        Ok(())
    }),
    ("TELEMETRY__METRICS__ENABLED", |c, v| {
        c.telemetry.metrics.enabled = flag(v)?;
        Ok(())
    }),
    ("TELEMETRY__METRICS__ADDR", |c, v| {
        c.telemetry.metrics.addr = v.trim().to_string();
        Ok(())
    }),
    ("TELEMETRY__LOGGING__ENABLED", |c, v| {
        c.telemetry.logging.enabled = flag(v)?;
        Ok(())
    }),
    ("TELEMETRY__LOGGING__LEVEL", |c, v| {
        c.telemetry.logging.level = v.trim().to_string();
        Ok(())
    }),
    ("TELEMETRY__LOGGING__FORMAT", |c, v| {
        c.telemetry.logging.format = v.trim().parse()?;
        Ok(())
    }),
    ("TELEMETRY__LOGGING__ANSI_ENABLED", |c, v| {
        c.telemetry.logging.ansi_enabled = flag(v)?;
        Ok(())
    }),
    ("TELEMETRY__LOGGING__INCLUDE_LOCATION", |c, v| {
        c.telemetry.logging.include_location = flag(v)?;
        Ok(())
    }),
    ("MANIFEST__PATHS", |c, v| {
        c.manifest.paths = v
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect();
        Ok(())
    }),
];

fn number<T: std::str::FromStr>(value: &str) -> Result<T, String> {
    value
        .trim()
        .parse()
        .map_err(|_| format!("expected a non-negative integer, got '{value}'"))
}

fn flag(value: &str) -> Result<bool, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(format!("expected a boolean, got '{value}'")),
    }
}

/// Builds a [`GatewayConfig`] from defaults, one file and the environment.
///
/// A file replaces the defaults wholesale (missing keys fall back to their
/// defaults through serde). `PREFIX__SECTION__KEY` variables are applied on
/// top when [`load`](Self::load) runs, and the result is validated.
///
/// ```no_run
/// use wrench_config::ConfigLoader;
///
/// # fn main() -> Result<(), wrench_config::ConfigError> {
/// let config = ConfigLoader::new()
///     .with_optional_file("wrench.toml")?
///     .with_dotenv()?
///     .with_env_prefix("WRENCH")
///     .load()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct ConfigLoader {
    config: GatewayConfig,
    env_prefix: Option<String>,
}

impl ConfigLoader {
    /// Starts from the defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resets to the defaults.
    #[must_use]
    pub fn with_defaults(mut self) -> Self {
        self.config = GatewayConfig::default();
        self
    }

    /// Reads a `.toml` or `.json` file.
    ///
    /// # Errors
    ///
    /// `FileNotFound` when the file is missing, otherwise any read, format or
    /// parse failure.
    pub fn with_file(self, path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))?;
        self.with_content(path, &content)
    }

    /// Like [`with_file`](Self::with_file), but a missing file is skipped.
    ///
    /// # Errors
    ///
    /// Any failure other than the file being absent.
    pub fn with_optional_file(self, path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(content) => self.with_content(path, &content),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "no configuration file, using defaults");
                Ok(self)
            }
            Err(e) => Err(ConfigError::read_error(path, e)),
        }
    }

    /// Applies `PREFIX__SECTION__KEY` variables at load time.
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_ascii_uppercase());
        self
    }

    /// Loads `.env` into the process environment, when there is one.
    ///
    /// # Errors
    ///
    /// `Dotenv` when the file exists but cannot be parsed.
    pub fn with_dotenv(self) -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(path) => debug!(path = %path.display(), ".env loaded"),
            Err(e) if e.not_found() => {}
            Err(e) => return Err(e.into()),
        }
        Ok(self)
    }

    /// Applies the environment overrides and validates the result.
    ///
    /// # Errors
    ///
    /// `EnvParseError` for an override that does not parse, `InvalidValue`
    /// when the final configuration fails [`GatewayConfig::validate`].
    pub fn load(mut self) -> Result<GatewayConfig, ConfigError> {
        if let Some(prefix) = self.env_prefix.take() {
            let vars = env::vars_os()
                .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)));
            self.apply_env(&prefix, vars)?;
        }
        self.config.validate()?;
        Ok(self.config)
    }

    fn with_content(mut self, path: &Path, content: &str) -> Result<Self, ConfigError> {
        let extension = path
            .extension()
            .and_then(OsStr::to_str)
            .map(str::to_ascii_lowercase);
        self.config = match extension.as_deref() {
            Some("toml") => toml::from_str(content)?,
            Some("json") => serde_json::from_str(content)?,
            _ => {
                return Err(ConfigError::UnsupportedFormat {
                    path: path.to_path_buf(),
                })
            }
        };
        debug!(path = %path.display(), "configuration file loaded");
        Ok(self)
    }

    fn apply_env(
        &mut self,
        prefix: &str,
        vars: impl IntoIterator<Item = (String, String)>,
    ) -> Result<(), ConfigError> {
        for (var, value) in vars {
            let Some(key) = var.strip_prefix(prefix).and_then(|k| k.strip_prefix("__")) else {
                continue;
            };
            match OVERRIDES.iter().find(|(name, _)| *name == key) {
                Some((_, set)) => {
                    set(&mut self.config, &value)
                        .map_err(|reason| ConfigError::env_parse_error(&var, reason))?;
                    debug!(var = %var, "environment override applied");
                }
                None => debug!(var = %var, "unknown environment override ignored"),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LogFormat;
    use std::io::Write;

    fn file(suffix: &str, content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_toml_and_json_files() {
        let toml = file(".toml", "[telemetry]\nservice_name = \"orders\"\n");
        let config = ConfigLoader::new().with_file(toml.path()).unwrap().load().unwrap();
        assert_eq!(config.telemetry.service_name, "orders");

        let json = file(".JSON", r#"{"manifest": {"paths": ["a.yaml", "b.yaml"]}}"#);
        let config = ConfigLoader::new().with_file(json.path()).unwrap().load().unwrap();
        assert_eq!(config.manifest.paths, vec!["a.yaml", "b.yaml"]);
    }

    #[test]
    fn test_missing_files() {
        let result = ConfigLoader::new().with_file("/nonexistent/wrench.toml");
        assert!(matches!(result, Err(ConfigError::FileNotFound { .. })));

        let config = ConfigLoader::new()
            .with_optional_file("/nonexistent/wrench.toml")
            .unwrap()
            .load()
            .unwrap();
        assert_eq!(config, GatewayConfig::default());
    }

    #[test]
    fn test_unsupported_extension() {
        let ini = file(".ini", "[server]\n");
        let result = ConfigLoader::new().with_optional_file(ini.path());
        assert!(matches!(result, Err(ConfigError::UnsupportedFormat { .. })));
    }

    #[test]
    fn test_load_validates() {
        let toml = file(".toml", "[server]\nrequest_timeout_ms = 0\n");
        let err = ConfigLoader::new().with_file(toml.path()).unwrap().load().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_env_overrides() {
        let mut loader = ConfigLoader::new();
        loader
            .apply_env(
                "WRENCH",
                vars(&[
                    ("WRENCH__SERVER__HTTP_ADDR", "127.0.0.1:9000"),
                    ("WRENCH__SERVER__REQUEST_TIMEOUT_MS", " 1500 "),
                    ("WRENCH__TELEMETRY__METRICS__ENABLED", "off"),
                    ("WRENCH__TELEMETRY__LOGGING__FORMAT", "Pretty"),
                    ("WRENCH__MANIFEST__PATHS", "base.yaml, routes/,"),
                    ("WRENCH__SOMETHING__ELSE", "ignored"),
                    ("WRENCH_HOME", "/opt/wrench"),
                    ("PATH", "/usr/bin"),
                ]),
            )
            .unwrap();

        let config = loader.load().unwrap();
        assert_eq!(config.server.http_addr, "127.0.0.1:9000");
        assert_eq!(config.server.request_timeout_ms, 1500);
        assert!(!config.telemetry.metrics.enabled);
        assert_eq!(config.telemetry.logging.format, LogFormat::Pretty);
        assert_eq!(config.manifest.paths, vec!["base.yaml", "routes/"]);
    }

    #[test]
    fn test_bad_env_override_names_the_variable() {
        let mut loader = ConfigLoader::new();

        let err = loader
            .apply_env("WRENCH", vars(&[("WRENCH__SERVER__MAX_BODY_BYTES", "-1")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::EnvParseError { ref var, .. } if var == "WRENCH__SERVER__MAX_BODY_BYTES"));

        let err = loader
            .apply_env("WRENCH", vars(&[("WRENCH__TELEMETRY__LOGGING__FORMAT", "xml")]))
            .unwrap_err();
        assert!(err.to_string().contains("'json' or 'pretty'"));

        let err = loader
            .apply_env("WRENCH", vars(&[("WRENCH__TELEMETRY__LOGGING__ENABLED", "maybe")]))
            .unwrap_err();
        assert!(err.to_string().contains("boolean"));
    }

    #[test]
    fn test_override_keys_are_unique() {
        let mut keys: Vec<&str> = OVERRIDES.iter().map(|(k, _)| *k).collect();
        keys.sort_unstable();
        keys.dedup();
        assert_eq!(keys.len(), OVERRIDES.len());
    }
}
