//! Multi-file manifest loading.
//!
//! Large gateways split their manifest across files (one per domain, one for
//! shared policies, ...). [`ManifestLoader`] merges them into a single
//! [`Manifest`] by concatenating every list; singleton sections may be
//! declared in only one file.

use std::fs;
use std::path::{Path, PathBuf};

use crate::{validate_manifest, ConfigError, Manifest};

/// Loads and merges manifest files, then validates the result.
///
/// # Example
///
/// ```
/// use wrench_config::ManifestLoader;
///
/// let manifest = ManifestLoader::new()
///     .with_str("actions:\n  - { id: a, type: httpRequestMock, http: { mock: { body: ok } } }")
///     .unwrap()
///     .with_str("api:\n  endpoints:\n    - { route: /a, actionId: a }")
///     .unwrap()
///     .load()
///     .unwrap();
///
/// assert_eq!(manifest.actions.len(), 1);
/// assert_eq!(manifest.api.endpoints.len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct ManifestLoader {
    manifest: Manifest,
    sources: Vec<String>,
}

impl ManifestLoader {
    /// Create an empty loader.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one manifest file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file is missing, unreadable, malformed,
    /// or redeclares a singleton section.
    pub fn with_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))?;
        self.merge_str(&content, path.display().to_string())
    }

    /// Merge every `.yaml`/`.yml` file of a directory, sorted by name.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the directory cannot be listed or any file
    /// fails to load.
    pub fn with_dir<P: AsRef<Path>>(mut self, dir: P) -> Result<Self, ConfigError> {
        let dir = dir.as_ref();
        let entries = fs::read_dir(dir).map_err(|e| ConfigError::read_error(dir, e))?;

        let mut files: Vec<PathBuf> = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| ConfigError::read_error(dir, e))?.path();
            let is_yaml = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"));
            if path.is_file() && is_yaml {
                files.push(path);
            }
        }
        files.sort();

        for file in files {
            self = self.with_file(file)?;
        }
        Ok(self)
    }

    /// Merge each configured path, whether a file or a directory.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if any path fails to load.
    pub fn with_paths<S: AsRef<str>>(mut self, paths: &[S]) -> Result<Self, ConfigError> {
        for path in paths {
            let path = Path::new(path.as_ref());
            self = if path.is_dir() {
                self.with_dir(path)?
            } else {
                self.with_file(path)?
            };
        }
        Ok(self)
    }

    /// Merge a manifest held in memory.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the document is malformed or redeclares a
    /// singleton section.
    pub fn with_str(self, content: &str) -> Result<Self, ConfigError> {
        let label = format!("<inline #{}>", self.sources.len() + 1);
        self.merge_str(content, label)
    }

    /// Validate and return the merged manifest.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ManifestInvalid` when references do not resolve.
    pub fn load(self) -> Result<Manifest, ConfigError> {
        validate_manifest(&self.manifest)?;
        tracing::info!(
            sources = self.sources.len(),
            endpoints = self.manifest.api.endpoints.len(),
            actions = self.manifest.actions.len(),
            "manifest loaded"
        );
        Ok(self.manifest)
    }

    fn merge_str(mut self, content: &str, source: String) -> Result<Self, ConfigError> {
        let part = Manifest::from_yaml_str(content)?;
        self.merge(part, &source)?;
        tracing::debug!(source = %source, "merged manifest source");
        self.sources.push(source);
        Ok(self)
    }

    fn merge(&mut self, part: Manifest, source: &str) -> Result<(), ConfigError> {
        if let Some(service) = part.service {
            if self.manifest.service.is_some() {
                return Err(ConfigError::duplicate_section("service", source));
            }
            self.manifest.service = Some(service);
        }

        if let Some(authorization) = part.api.authorization {
            if self.manifest.api.authorization.is_some() {
                return Err(ConfigError::duplicate_section("api.authorization", source));
            }
            self.manifest.api.authorization = Some(authorization);
        }

        let target = &mut self.manifest;
        target.connections.stores.extend(part.connections.stores);
        target.api.endpoints.extend(part.api.endpoints);
        target.actions.extend(part.actions);
        target.contract.maps.extend(part.contract.maps);
        target.idemps.extend(part.idemps);
        target.keys.extend(part.keys);
        target.rate_limits.extend(part.rate_limits);

        Ok(())
    }
}
