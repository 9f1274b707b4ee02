//! Outbound HTTP calls.

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode};
use reqwest::Client;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;
use wrench_config::ActionSettings;
use wrench_core::{resolver, PipelineContext, RouteContext};

use super::{ActionError, ActionExecutor, ActionOutput, ActionRequest};
use crate::BuildError;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Sends the action input to an upstream URL and returns its response.
///
/// On proxy endpoints the inbound method is used and the part of the request
/// URI below the route is appended to the URL. An upstream status above 399
/// still yields output; the action stage marks the pipeline as failed.
#[derive(Debug, Clone)]
pub struct HttpRequestExecutor {
    client: Client,
    method: Method,
    url: String,
    headers: BTreeMap<String, String>,
    fixed_headers: BTreeMap<String, String>,
    mapped_headers: Vec<(String, String)>,
}

impl HttpRequestExecutor {
    /// Creates the executor for an `httpRequest` action.
    pub fn from_settings(settings: &ActionSettings) -> Result<Self, BuildError> {
        let http = settings
            .http
            .as_ref()
            .ok_or_else(|| BuildError::invalid_action(&settings.id, "http is required"))?;
        let request = http
            .request
            .as_ref()
            .ok_or_else(|| BuildError::invalid_action(&settings.id, "http.request is required"))?;
        if request.url.trim().is_empty() {
            return Err(BuildError::invalid_action(&settings.id, "http.request.url is required"));
        }

        let timeout = request
            .timeout_ms
            .filter(|ms| *ms > 0)
            .map_or(DEFAULT_TIMEOUT, Duration::from_millis);
        let client = Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(request.insecure)
            .build()
            .map_err(|e| {
                BuildError::invalid_action(&settings.id, format!("failed to create client: {e}"))
            })?;

        let mapped_headers = http
            .response
            .map_response_headers
            .iter()
            .map(|entry| match entry.split_once(':') {
                Some((src, dst)) => (src.trim().to_string(), dst.trim().to_string()),
                None => (entry.trim().to_string(), entry.trim().to_string()),
            })
            .collect();

        Ok(Self {
            client,
            method: Method::from_bytes(request.method.as_str().as_bytes())
                .unwrap_or(Method::GET),
            url: request.url.clone(),
            headers: request.headers.clone(),
            fixed_headers: http.response.map_fixed_headers.clone(),
            mapped_headers,
        })
    }

    fn target(&self, route: &RouteContext, pipeline: &PipelineContext) -> (Method, String) {
        let url = resolve_url(&self.url, route, pipeline);
        if route.endpoint().is_proxy {
            let base = url.trim_end_matches('/');
            (route.method().clone(), format!("{base}{}", route.proxy_suffix()))
        } else {
            (self.method.clone(), url)
        }
    }

    fn response_headers(&self, upstream: &HeaderMap) -> BTreeMap<String, String> {
        let mut headers = self.fixed_headers.clone();
        for (src, dst) in &self.mapped_headers {
            if let Some(value) = upstream.get(src.as_str()).and_then(|v| v.to_str().ok()) {
                headers.insert(dst.to_ascii_lowercase(), value.to_string());
            }
        }
        headers
    }
}

/// Resolves every calculated `/`-separated segment of `url`.
fn resolve_url(url: &str, route: &RouteContext, pipeline: &PipelineContext) -> String {
    url.split('/')
        .map(|segment| {
            if resolver::is_calculated(segment) {
                let value = resolver::resolve_string(segment, route, pipeline);
                value.strip_prefix('/').map(str::to_string).unwrap_or(value)
            } else {
                segment.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[async_trait]
impl ActionExecutor for HttpRequestExecutor {
    async fn execute(&self, request: ActionRequest<'_>) -> Result<ActionOutput, ActionError> {
        let (method, url) = self.target(request.route, request.pipeline);
        debug!(request_id = %request.route.request_id(), %method, %url, "calling upstream");

        let mut builder = self.client.request(method, &url);
        for (name, value) in resolver::resolve_map(&self.headers, request.route, request.pipeline) {
            builder = builder.header(name, value);
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        let response = builder.send().await.map_err(upstream_error)?;
        let status = response.status();
        let content_type = response
            .headers()
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let headers = self.response_headers(response.headers());
        let body: Bytes = response.bytes().await.map_err(upstream_error)?;

        Ok(ActionOutput {
            status: Some(status),
            body,
            content_type,
            headers,
        })
    }
}

fn upstream_error(error: reqwest::Error) -> ActionError {
    let status = if error.is_timeout() {
        StatusCode::GATEWAY_TIMEOUT
    } else {
        StatusCode::BAD_GATEWAY
    };
    ActionError::new(status, format!("upstream request failed: {error}"))
}
