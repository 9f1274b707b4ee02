//! Built-in function actions.

use async_trait::async_trait;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use bytes::Bytes;
use hmac::{Hmac, Mac};
use serde_json::{Map, Value};
use sha1::Sha1;
use sha2::{Sha256, Sha512};
use std::collections::BTreeMap;
use wrench_config::{ActionSettings, FuncSettings, HashAlgorithm};
use wrench_core::resolver;

use super::{ActionError, ActionExecutor, ActionOutput, ActionRequest};
use crate::BuildError;

fn func_settings<'a>(settings: &'a ActionSettings) -> Result<&'a FuncSettings, BuildError> {
    settings
        .func
        .as_ref()
        .ok_or_else(|| BuildError::invalid_action(&settings.id, "func is required"))
}

fn hmac_hex<M: Mac + hmac::digest::KeyInit>(key: &[u8], data: &[u8]) -> Result<String, ActionError> {
    let mut mac = <M as Mac>::new_from_slice(key)
        .map_err(|e| ActionError::internal(format!("invalid hash key: {e}")))?;
    mac.update(data);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// `funcHash`: hex HMAC of the action input.
#[derive(Debug, Clone)]
pub struct HashExecutor {
    key: String,
    alg: HashAlgorithm,
}

impl HashExecutor {
    /// Creates the executor for a `funcHash` action.
    pub fn from_settings(settings: &ActionSettings) -> Result<Self, BuildError> {
        let hash = func_settings(settings)?
            .hash
            .as_ref()
            .ok_or_else(|| BuildError::invalid_action(&settings.id, "func.hash is required"))?;
        Ok(Self {
            key: hash.key.clone(),
            alg: hash.alg,
        })
    }
}

#[async_trait]
impl ActionExecutor for HashExecutor {
    async fn execute(&self, request: ActionRequest<'_>) -> Result<ActionOutput, ActionError> {
        let key = resolver::resolve_string(&self.key, request.route, request.pipeline);
        let digest = match self.alg {
            HashAlgorithm::Sha1 => hmac_hex::<Hmac<Sha1>>(key.as_bytes(), request.body)?,
            HashAlgorithm::Sha256 => hmac_hex::<Hmac<Sha256>>(key.as_bytes(), request.body)?,
            HashAlgorithm::Sha512 => hmac_hex::<Hmac<Sha512>>(key.as_bytes(), request.body)?,
        };
        Ok(ActionOutput::body(digest))
    }
}

/// `funcVarContext`: a JSON object of resolved variables.
#[derive(Debug, Clone)]
pub struct VarContextExecutor {
    vars: BTreeMap<String, String>,
}

impl VarContextExecutor {
    /// Creates the executor for a `funcVarContext` action.
    pub fn from_settings(settings: &ActionSettings) -> Result<Self, BuildError> {
        let vars = &func_settings(settings)?.vars;
        if vars.is_empty() {
            return Err(BuildError::invalid_action(&settings.id, "func.vars is required"));
        }
        Ok(Self { vars: vars.clone() })
    }
}

#[async_trait]
impl ActionExecutor for VarContextExecutor {
    async fn execute(&self, request: ActionRequest<'_>) -> Result<ActionOutput, ActionError> {
        let object: Map<String, Value> = self
            .vars
            .iter()
            .map(|(name, token)| {
                let value = resolver::resolve(token, request.route, request.pipeline);
                (name.clone(), value)
            })
            .collect();
        let body = serde_json::to_vec(&Value::Object(object))
            .map_err(|e| ActionError::internal(e.to_string()))?;
        Ok(ActionOutput::body(body).with_content_type("application/json"))
    }
}

/// `funcStringConcatenate`: resolved parts joined without separator.
#[derive(Debug, Clone)]
pub struct ConcatenateExecutor {
    parts: Vec<String>,
}

impl ConcatenateExecutor {
    /// Creates the executor for a `funcStringConcatenate` action.
    pub fn from_settings(settings: &ActionSettings) -> Result<Self, BuildError> {
        let parts = &func_settings(settings)?.concatenate;
        if parts.is_empty() {
            return Err(BuildError::invalid_action(
                &settings.id,
                "func.concatenate is required",
            ));
        }
        Ok(Self {
            parts: parts.clone(),
        })
    }
}

#[async_trait]
impl ActionExecutor for ConcatenateExecutor {
    async fn execute(&self, request: ActionRequest<'_>) -> Result<ActionOutput, ActionError> {
        let joined: String = self
            .parts
            .iter()
            .map(|part| resolver::resolve_string(part, request.route, request.pipeline))
            .collect();
        Ok(ActionOutput::body(joined).with_content_type("text/plain"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    TimestampMillis,
    Base64,
    Base64Url,
}

/// `funcGeneral`: one built-in function applied to the action input.
#[derive(Debug, Clone)]
pub struct GeneralExecutor {
    command: Command,
}

impl GeneralExecutor {
    /// Creates the executor for a `funcGeneral` action.
    pub fn from_settings(settings: &ActionSettings) -> Result<Self, BuildError> {
        let raw = func_settings(settings)?
            .command
            .as_deref()
            .ok_or_else(|| BuildError::invalid_action(&settings.id, "func.command is required"))?;
        let command = match resolver::unwrap(raw) {
            Some("func.timestamp(milli)") => Command::TimestampMillis,
            Some("func.base64(encode)") => Command::Base64,
            Some("func.base64url(encode)") => Command::Base64Url,
            _ => {
                return Err(BuildError::invalid_action(
                    &settings.id,
                    format!("func.command '{raw}' is invalid"),
                ))
            }
        };
        Ok(Self { command })
    }
}

#[async_trait]
impl ActionExecutor for GeneralExecutor {
    async fn execute(&self, request: ActionRequest<'_>) -> Result<ActionOutput, ActionError> {
        let value = match self.command {
            Command::TimestampMillis => chrono::Utc::now().timestamp_millis().to_string(),
            Command::Base64 => STANDARD.encode(request.body),
            Command::Base64Url => URL_SAFE_NO_PAD.encode(request.body),
        };
        Ok(ActionOutput::body(Bytes::from(value)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::action;
    use crate::test_support::request;
    use serde_json::json;
    use wrench_core::{PipelineContext, RouteContext};

    async fn run(executor: &dyn ActionExecutor, route: &RouteContext, input: &[u8]) -> ActionOutput {
        let pipeline = PipelineContext::new();
        let body = Bytes::copy_from_slice(input);
        executor
            .execute(ActionRequest {
                route,
                pipeline: &pipeline,
                body: &body,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_hash_known_vector() {
        let exec = HashExecutor::from_settings(&action(
            "id: sign\ntype: funcHash\nfunc:\n  hash:\n    key: key\n    alg: sha256\n",
        ))
        .unwrap();
        let route = request("POST", "/s", "/s").build();
        let output = run(&exec, &route, b"The quick brown fox jumps over the lazy dog").await;
        assert_eq!(
            output.body,
            Bytes::from_static(b"f7bc83f430538424b13298e6aa6fb143ef4d59a14946175997479dbc2d1a3cd8")
        );
        assert_eq!(output.status, None);
    }

    #[tokio::test]
    async fn test_hash_key_is_resolved() {
        let exec = HashExecutor::from_settings(&action(
            "id: sign\ntype: funcHash\nfunc:\n  hash:\n    key: '{{wrenchContext.request.headers.x-key}}'\n    alg: sha1\n",
        ))
        .unwrap();
        let route = request("POST", "/s", "/s").header("x-key", "key").build();
        let output = run(&exec, &route, b"The quick brown fox jumps over the lazy dog").await;
        assert_eq!(
            output.body,
            Bytes::from_static(b"de7c9b85b8b78aa6bc8a7a36f70a90701c9db4d9")
        );
    }

    #[tokio::test]
    async fn test_var_context() {
        let exec = VarContextExecutor::from_settings(&action(
            "id: vars\ntype: funcVarContext\nfunc:\n  vars:\n    orderId: '{{wrenchContext.request.uri.params.id}}'\n    source: gateway\n",
        ))
        .unwrap();
        let route = request("GET", "/orders/{id}", "/orders/9").build();
        let output = run(&exec, &route, b"").await;
        let body: Value = serde_json::from_slice(&output.body).unwrap();
        assert_eq!(body, json!({"orderId": "9", "source": "gateway"}));
        assert_eq!(output.content_type.as_deref(), Some("application/json"));
    }

    #[tokio::test]
    async fn test_concatenate() {
        let exec = ConcatenateExecutor::from_settings(&action(
            "id: cat\ntype: funcStringConcatenate\nfunc:\n  concatenate: ['order-', '{{wrenchContext.request.uri.params.id}}']\n",
        ))
        .unwrap();
        let route = request("GET", "/orders/{id}", "/orders/9").build();
        let output = run(&exec, &route, b"").await;
        assert_eq!(output.body, Bytes::from_static(b"order-9"));
    }

    #[tokio::test]
    async fn test_general_commands() {
        let route = request("POST", "/g", "/g").build();

        let exec = GeneralExecutor::from_settings(&action(
            "id: b64\ntype: funcGeneral\nfunc:\n  command: '{{func.base64(encode)}}'\n",
        ))
        .unwrap();
        assert_eq!(run(&exec, &route, b"hi?").await.body, Bytes::from_static(b"aGk/"));

        let exec = GeneralExecutor::from_settings(&action(
            "id: b64u\ntype: funcGeneral\nfunc:\n  command: '{{func.base64url(encode)}}'\n",
        ))
        .unwrap();
        assert_eq!(run(&exec, &route, b"hi?").await.body, Bytes::from_static(b"aGk_"));

        let exec = GeneralExecutor::from_settings(&action(
            "id: ts\ntype: funcGeneral\nfunc:\n  command: '{{func.timestamp(milli)}}'\n",
        ))
        .unwrap();
        let ts = run(&exec, &route, b"").await.body;
        assert!(std::str::from_utf8(&ts).unwrap().parse::<i64>().is_ok());
    }

    #[test]
    fn test_invalid_settings() {
        assert!(GeneralExecutor::from_settings(&action(
            "id: g\ntype: funcGeneral\nfunc:\n  command: '{{uuid}}'\n"
        ))
        .is_err());
        assert!(VarContextExecutor::from_settings(&action("id: v\ntype: funcVarContext\nfunc: {}\n")).is_err());
        assert!(HashExecutor::from_settings(&action("id: h\ntype: funcHash\n")).is_err());
    }
}
