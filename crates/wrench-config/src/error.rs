//! Errors raised while reading the process configuration or the manifest.

use std::path::PathBuf;
use thiserror::Error;

/// A configuration or manifest could not be loaded.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A named file does not exist.
    #[error("{} does not exist", .path.display())]
    FileNotFound {
        /// The missing path.
        path: PathBuf,
    },

    /// A file exists but could not be read.
    #[error("cannot read {}", .path.display())]
    ReadError {
        /// The unreadable path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The process configuration file has an extension other than `.toml`
    /// or `.json`.
    #[error("{} is neither .toml nor .json", .path.display())]
    UnsupportedFormat {
        /// The offending path.
        path: PathBuf,
    },

    /// Malformed TOML process configuration.
    #[error("bad TOML configuration: {0}")]
    TomlError(#[from] toml::de::Error),

    /// Malformed JSON process configuration.
    #[error("bad JSON configuration: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Malformed YAML manifest.
    #[error("bad YAML manifest: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// A `.env` file exists but could not be parsed.
    #[error("bad .env file: {0}")]
    Dotenv(#[from] dotenvy::Error),

    /// A process setting parsed but makes no sense.
    #[error("{field}: {reason}")]
    InvalidValue {
        /// Dotted field path, e.g. `server.http_addr`.
        field: String,
        /// What is wrong.
        reason: String,
    },

    /// A `WRENCH__*` override could not be applied.
    #[error("{var}: {reason}")]
    EnvParseError {
        /// The variable name.
        var: String,
        /// What is wrong.
        reason: String,
    },

    /// A manifest section that may appear once was declared in two sources.
    #[error("{section} is declared more than once (again in {source_name})")]
    DuplicateSection {
        /// Section path, e.g. `api.authorization`.
        section: &'static str,
        /// The source that declared it the second time.
        source_name: String,
    },

    /// The manifest failed cross-reference validation.
    ///
    /// Every problem found is reported, not only the first one.
    #[error("manifest validation failed: {}", .errors.join("; "))]
    ManifestInvalid {
        /// One human-readable message per problem.
        errors: Vec<String>,
    },
}

impl ConfigError {
    pub(crate) fn file_not_found(path: impl Into<PathBuf>) -> Self {
        Self::FileNotFound { path: path.into() }
    }

    pub(crate) fn read_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::ReadError {
            path: path.into(),
            source,
        }
    }

    /// Maps an I/O failure on `path`, keeping "not found" distinct.
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            Self::file_not_found(path)
        } else {
            Self::read_error(path, source)
        }
    }

    pub(crate) fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn env_parse_error(var: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::EnvParseError {
            var: var.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn duplicate_section(section: &'static str, source_name: impl Into<String>) -> Self {
        Self::DuplicateSection {
            section,
            source_name: source_name.into(),
        }
    }

    /// Returns the individual manifest messages, if this is a manifest error.
    pub fn manifest_errors(&self) -> &[String] {
        match self {
            Self::ManifestInvalid { errors } => errors,
            _ => &[],
        }
    }
}
