//! Action executors.
//!
//! An [`ActionExecutor`] performs the side effect of one manifest action and
//! returns its output; the [`ActionHandler`](crate::stages::ActionHandler)
//! stage writes that output into the pipeline. Executors are created at build
//! time by the factory registered for the action's type in an
//! [`ExecutorRegistry`].
//!
//! | Type | Executor |
//! |------|----------|
//! | `httpRequest` | [`HttpRequestExecutor`] |
//! | `httpRequestMock` | [`HttpMockExecutor`] |
//! | `funcHash` | [`HashExecutor`] |
//! | `funcVarContext` | [`VarContextExecutor`] |
//! | `funcStringConcatenate` | [`ConcatenateExecutor`] |
//! | `funcGeneral` | [`GeneralExecutor`] |
//! | `funcSignature` | [`SignatureExecutor`], keys from [`ExecutorRegistry::with_keys`] |
//!
//! Connector types (`kafkaProducer`, `snsPublish`, ...) have no built-in
//! executor; register one with [`ExecutorRegistry::register`].

mod func;
mod http_request;
mod mock;
mod sign;

pub use self::func::{ConcatenateExecutor, GeneralExecutor, HashExecutor, VarContextExecutor};
pub use self::http_request::HttpRequestExecutor;
pub use self::mock::HttpMockExecutor;
pub use self::sign::{KeyRing, SignatureExecutor};

use async_trait::async_trait;
use bytes::Bytes;
use http::StatusCode;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use wrench_config::{ActionSettings, ActionType};
use wrench_core::{PipelineContext, RouteContext};

use crate::BuildError;

/// Everything an executor can read.
#[derive(Debug, Clone, Copy)]
pub struct ActionRequest<'a> {
    /// The inbound request.
    pub route: &'a RouteContext,
    /// State produced so far.
    pub pipeline: &'a PipelineContext,
    /// The action input, after `body.use`.
    pub body: &'a Bytes,
}

/// What an action produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionOutput {
    /// Response status, when the action decides one.
    pub status: Option<StatusCode>,
    /// New payload.
    pub body: Bytes,
    /// Content type of `body`.
    pub content_type: Option<String>,
    /// Response headers to add.
    pub headers: BTreeMap<String, String>,
}

impl ActionOutput {
    /// An output with only a body.
    pub fn body(body: impl Into<Bytes>) -> Self {
        Self {
            body: body.into(),
            ..Default::default()
        }
    }

    /// Sets the content type.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Sets the status.
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = Some(status);
        self
    }
}

/// An action failed before producing output.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct ActionError {
    /// Response status.
    pub status: StatusCode,
    /// Plain-text response body.
    pub message: String,
}

impl ActionError {
    /// Creates an error.
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// `500 Internal Server Error`.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

/// Performs one action.
#[async_trait]
pub trait ActionExecutor: Send + Sync + fmt::Debug {
    /// Runs the action.
    async fn execute(&self, request: ActionRequest<'_>) -> Result<ActionOutput, ActionError>;
}

/// Creates an executor from its settings, failing at build time.
pub type ExecutorFactory =
    Arc<dyn Fn(&ActionSettings) -> Result<Arc<dyn ActionExecutor>, BuildError> + Send + Sync>;

/// Executor factories by action type.
#[derive(Clone, Default)]
pub struct ExecutorRegistry {
    factories: HashMap<ActionType, ExecutorFactory>,
}

impl fmt::Debug for ExecutorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<&str> = self.factories.keys().map(|k| k.as_str()).collect();
        kinds.sort_unstable();
        f.debug_struct("ExecutorRegistry")
            .field("kinds", &kinds)
            .finish()
    }
}

impl ExecutorRegistry {
    /// Creates a registry with no factory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with every built-in executor.
    pub fn with_builtins() -> Self {
        Self::new()
            .register(ActionType::HttpRequest, |s| {
                Ok(Arc::new(HttpRequestExecutor::from_settings(s)?) as Arc<dyn ActionExecutor>)
            })
            .register(ActionType::HttpRequestMock, |s| {
                Ok(Arc::new(HttpMockExecutor::from_settings(s)?) as Arc<dyn ActionExecutor>)
            })
            .register(ActionType::FuncHash, |s| {
                Ok(Arc::new(HashExecutor::from_settings(s)?) as Arc<dyn ActionExecutor>)
            })
            .register(ActionType::FuncVarContext, |s| {
                Ok(Arc::new(VarContextExecutor::from_settings(s)?) as Arc<dyn ActionExecutor>)
            })
            .register(ActionType::FuncStringConcatenate, |s| {
                Ok(Arc::new(ConcatenateExecutor::from_settings(s)?) as Arc<dyn ActionExecutor>)
            })
            .register(ActionType::FuncGeneral, |s| {
                Ok(Arc::new(GeneralExecutor::from_settings(s)?) as Arc<dyn ActionExecutor>)
            })
            .with_keys(KeyRing::new())
    }

    /// Registers the `funcSignature` factory over `keys`.
    pub fn with_keys(self, keys: KeyRing) -> Self {
        let keys = Arc::new(keys);
        self.register(ActionType::FuncSignature, move |s| {
            Ok(Arc::new(SignatureExecutor::from_settings(s, &keys)?) as Arc<dyn ActionExecutor>)
        })
    }

    /// Registers the factory for `kind`, replacing any previous one.
    pub fn register<F>(mut self, kind: ActionType, factory: F) -> Self
    where
        F: Fn(&ActionSettings) -> Result<Arc<dyn ActionExecutor>, BuildError>
            + Send
            + Sync
            + 'static,
    {
        self.factories.insert(kind, Arc::new(factory));
        self
    }

    /// Whether a factory exists for `kind`.
    pub fn supports(&self, kind: ActionType) -> bool {
        self.factories.contains_key(&kind)
    }

    /// Creates the executor for an action.
    pub fn build(&self, settings: &ActionSettings) -> Result<Arc<dyn ActionExecutor>, BuildError> {
        let factory =
            self.factories
                .get(&settings.kind)
                .ok_or_else(|| BuildError::MissingExecutor {
                    action_id: settings.id.clone(),
                    kind: settings.kind.to_string(),
                })?;
        factory(settings)
    }
}

#[cfg(test)]
pub(crate) fn action(yaml: &str) -> ActionSettings {
    serde_yaml::from_str(yaml).unwrap()
}
