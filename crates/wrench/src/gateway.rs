//! Process bootstrap.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::info;
use wrench_chain::{BuildError, ChainBuilder, ExecutorRegistry, StoreRegistry};
use wrench_config::{ConfigError, ConfigLoader, GatewayConfig, Manifest, ManifestLoader};
use wrench_server::{HealthCheck, RouteTable, Server, ServerError};
use wrench_telemetry::{init_telemetry, TelemetryConfig, TelemetryError};

/// Environment prefix for configuration overrides.
pub const ENV_PREFIX: &str = "WRENCH";

/// Anything that stops the gateway from starting or serving.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Configuration or manifest problem.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The manifest could not be compiled.
    #[error(transparent)]
    Build(#[from] BuildError),

    /// Telemetry could not be installed.
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),

    /// The server failed.
    #[error(transparent)]
    Server(#[from] ServerError),
}

/// A configured, not yet running gateway.
///
/// # Example
///
/// ```rust,no_run
/// use wrench::Gateway;
///
/// # async fn run() -> Result<(), wrench::GatewayError> {
/// Gateway::load(Some("wrench.toml".as_ref()), &[])?.run().await
/// # }
/// ```
#[derive(Debug)]
pub struct Gateway {
    config: GatewayConfig,
    manifest: Arc<Manifest>,
    stores: StoreRegistry,
    executors: ExecutorRegistry,
}

impl Gateway {
    /// Creates a gateway from loaded documents.
    pub fn new(config: GatewayConfig, manifest: Manifest) -> Self {
        Self {
            config,
            manifest: Arc::new(manifest),
            stores: StoreRegistry::new(),
            executors: ExecutorRegistry::with_builtins(),
        }
    }

    /// Loads the configuration and the manifest.
    ///
    /// The configuration comes from defaults, then `config_path` when given
    /// (`wrench.toml` when present otherwise), then `.env` and `WRENCH__*`
    /// variables. Non-empty `manifest_paths` replace the configured paths.
    pub fn load(
        config_path: Option<&Path>,
        manifest_paths: &[PathBuf],
    ) -> Result<Self, GatewayError> {
        let loader = ConfigLoader::new().with_defaults();
        let loader = match config_path {
            Some(path) => loader.with_file(path)?,
            None => loader.with_optional_file("wrench.toml")?,
        };
        let mut config = loader.with_dotenv()?.with_env_prefix(ENV_PREFIX).load()?;

        if !manifest_paths.is_empty() {
            config.manifest.paths = manifest_paths
                .iter()
                .map(|p| p.display().to_string())
                .collect();
        }

        let manifest = ManifestLoader::new()
            .with_paths(&config.manifest.paths)?
            .load()?;
        Ok(Self::new(config, manifest))
    }

    /// Replaces the store registry, e.g. to add networked stores.
    pub fn with_stores(mut self, stores: StoreRegistry) -> Self {
        self.stores = stores;
        self
    }

    /// Replaces the executor registry, e.g. to add connector executors.
    pub fn with_executors(mut self, executors: ExecutorRegistry) -> Self {
        self.executors = executors;
        self
    }

    /// The process configuration.
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// The manifest.
    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Compiles the chains and binds them to routes.
    pub fn build(self) -> Result<Server, GatewayError> {
        let chains = ChainBuilder::new(Arc::clone(&self.manifest))
            .stores(self.stores)
            .executors(self.executors)
            .deadline(self.config.server.request_timeout())
            .build()?;
        let routes = RouteTable::new(&self.manifest, &chains)?;

        let version = self
            .manifest
            .service
            .as_ref()
            .and_then(|s| s.version.clone())
            .unwrap_or_else(|| crate::VERSION.to_string());
        let health = HealthCheck::new(self.manifest.service_name(), version, routes.len());
        Ok(Server::new(self.config.server, routes, health))
    }

    /// Installs telemetry, builds and serves until shutdown.
    pub async fn run(self) -> Result<(), GatewayError> {
        init_telemetry(&TelemetryConfig::from(&self.config.telemetry))?;
        info!(
            version = crate::VERSION,
            service = %self.manifest.service_name(),
            endpoints = self.manifest.api.endpoints.len(),
            "starting wrench"
        );
        self.build()?.run().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const MANIFEST: &str = r#"
service:
  name: billing
  version: 2.0.0
api:
  endpoints:
    - route: /invoices/{id}
      actionId: invoice
actions:
  - id: invoice
    type: httpRequestMock
    http:
      mock:
        body: '{"id":"1"}'
"#;

    #[test]
    fn test_load_from_files() {
        let dir = tempfile::tempdir().unwrap();
        let manifest_path = dir.path().join("manifest.yaml");
        fs::write(&manifest_path, MANIFEST).unwrap();
        let config_path = dir.path().join("wrench.toml");
        fs::write(
            &config_path,
            "[server]\nhttp_addr = \"127.0.0.1:0\"\nrequest_timeout_ms = 2000\n",
        )
        .unwrap();

        let gateway = Gateway::load(Some(config_path.as_path()), &[manifest_path.clone()]).unwrap();
        assert_eq!(gateway.config().server.http_addr, "127.0.0.1:0");
        assert_eq!(gateway.manifest().service_name(), "billing");
        assert_eq!(
            gateway.config().manifest.paths,
            vec![manifest_path.display().to_string()]
        );

        let server = gateway.build().unwrap();
        assert_eq!(server.socket_addr().unwrap().ip().to_string(), "127.0.0.1");
    }

    #[test]
    fn test_missing_manifest_fails() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.yaml");
        let config_path = dir.path().join("wrench.toml");
        fs::write(&config_path, "[server]\nhttp_addr = \"127.0.0.1:0\"\n").unwrap();

        let err = Gateway::load(Some(config_path.as_path()), &[missing]).unwrap_err();
        assert!(matches!(err, GatewayError::Config(ConfigError::FileNotFound { .. })));
    }

    #[test]
    fn test_unknown_executor_fails_build() {
        let manifest = Manifest::from_yaml_str(
            "api:\n  endpoints:\n    - route: /p\n      actionId: p\nactions:\n  - id: p\n    type: natsPublish\n",
        )
        .unwrap();
        let err = Gateway::new(GatewayConfig::default(), manifest)
            .build()
            .unwrap_err();
        assert!(matches!(err, GatewayError::Build(BuildError::MissingExecutor { .. })));
    }
}
