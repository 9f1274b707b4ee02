//! Canned HTTP responses.

use async_trait::async_trait;
use bytes::Bytes;
use http::StatusCode;
use std::collections::BTreeMap;
use wrench_config::{ActionSettings, HttpMockSettings};

use super::{ActionError, ActionExecutor, ActionOutput, ActionRequest};
use crate::BuildError;

/// Answers with a fixed body, or echoes its input with `mirrorBody`.
#[derive(Debug, Clone)]
pub struct HttpMockExecutor {
    body: Bytes,
    mirror_body: bool,
    content_type: String,
    headers: BTreeMap<String, String>,
    status: StatusCode,
}

impl HttpMockExecutor {
    /// Creates the executor for an `httpRequestMock` action.
    pub fn from_settings(settings: &ActionSettings) -> Result<Self, BuildError> {
        let mock: &HttpMockSettings = settings
            .http
            .as_ref()
            .and_then(|h| h.mock.as_ref())
            .ok_or_else(|| BuildError::invalid_action(&settings.id, "http.mock is required"))?;

        let body = mock.body.clone().unwrap_or_default();
        if body.is_empty() && !mock.mirror_body {
            return Err(BuildError::invalid_action(
                &settings.id,
                "http.mock.body is required unless mirrorBody is set",
            ));
        }
        let status = StatusCode::from_u16(mock.status_code).map_err(|_| {
            BuildError::invalid_action(
                &settings.id,
                format!("invalid status code {}", mock.status_code),
            )
        })?;

        Ok(Self {
            body: Bytes::from(body),
            mirror_body: mock.mirror_body,
            content_type: mock.content_type.clone(),
            headers: mock
                .headers
                .iter()
                .map(|(k, v)| (k.to_ascii_lowercase(), v.clone()))
                .collect(),
            status,
        })
    }
}

#[async_trait]
impl ActionExecutor for HttpMockExecutor {
    async fn execute(&self, request: ActionRequest<'_>) -> Result<ActionOutput, ActionError> {
        let body = if self.mirror_body {
            request.body.clone()
        } else {
            self.body.clone()
        };
        Ok(ActionOutput {
            status: Some(self.status),
            body,
            content_type: Some(self.content_type.clone()),
            headers: self.headers.clone(),
        })
    }
}
