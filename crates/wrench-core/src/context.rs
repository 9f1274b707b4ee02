//! Per-request state.
//!
//! Every inbound request gets one [`RouteContext`] (what was asked, read-only)
//! and one [`PipelineContext`] (what the chain has produced so far). Neither
//! is shared across requests.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode, Uri};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;
use wrench_config::{BodySettings, EndpointSettings};

use crate::ContextError;

const BODY_ACTIONS_PREFIX: &str = "bodyContext.actions.";

/// A unique identifier for each request, using UUID v7.
///
/// UUID v7 is time-ordered, which keeps log lines of one request easy to
/// correlate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Creates a new unique request ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Reuses an inbound `x-request-id` when it is a UUID.
    pub fn from_header(value: Option<&str>) -> Self {
        value
            .and_then(|v| Uuid::parse_str(v.trim()).ok())
            .map_or_else(Self::new, Self)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The inbound request as matched against an endpoint.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use bytes::Bytes;
/// use wrench_config::EndpointSettings;
/// use wrench_core::RouteContext;
///
/// let endpoint = EndpointSettings {
///     route: "/items/{id}".to_string(),
///     ..Default::default()
/// };
/// let request = http::Request::builder()
///     .uri("/items/42?expand=true")
///     .body(Bytes::new())
///     .unwrap();
///
/// let route = RouteContext::from_request(request, Arc::new(endpoint));
/// assert_eq!(route.uri_param("id"), Some("42"));
/// ```
#[derive(Debug, Clone)]
pub struct RouteContext {
    request_id: RequestId,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
    endpoint: Arc<EndpointSettings>,
}

impl RouteContext {
    /// Creates a route context for a matched request.
    pub fn new(
        method: Method,
        uri: Uri,
        headers: HeaderMap,
        body: Bytes,
        endpoint: Arc<EndpointSettings>,
    ) -> Self {
        let request_id = RequestId::from_header(
            headers.get("x-request-id").and_then(|v| v.to_str().ok()),
        );
        Self {
            request_id,
            method,
            uri,
            headers,
            body,
            endpoint,
        }
    }

    /// Creates a route context from an `http::Request`.
    pub fn from_request(request: http::Request<Bytes>, endpoint: Arc<EndpointSettings>) -> Self {
        let (parts, body) = request.into_parts();
        Self::new(parts.method, parts.uri, parts.headers, body, endpoint)
    }

    /// Request identifier.
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Inbound method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Inbound URI.
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Path and query, as received.
    pub fn request_uri(&self) -> &str {
        self.uri
            .path_and_query()
            .map_or_else(|| self.uri.path(), |pq| pq.as_str())
    }

    /// Inbound headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// A header value, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Inbound body.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// The matched endpoint.
    pub fn endpoint(&self) -> &EndpointSettings {
        &self.endpoint
    }

    /// The matched route template.
    pub fn route(&self) -> &str {
        &self.endpoint.route
    }

    /// The live path segment matching the template segment `{name}`.
    pub fn uri_param(&self, name: &str) -> Option<&str> {
        let position = self
            .route()
            .split('/')
            .position(|segment| {
                segment
                    .strip_prefix('{')
                    .and_then(|s| s.strip_suffix('}'))
                    .is_some_and(|s| s == name)
            })?;
        self.uri.path().split('/').nth(position)
    }

    /// What follows the route prefix in the request URI, query included.
    ///
    /// Used by proxy endpoints to forward sub-paths.
    pub fn proxy_suffix(&self) -> &str {
        let prefix = self.route().trim_end_matches('/');
        self.request_uri().strip_prefix(prefix).unwrap_or("")
    }

    /// The bearer token of the `Authorization` header.
    pub fn bearer_token(&self) -> Option<&str> {
        let value = self.header("authorization")?.trim();
        let (scheme, token) = value.split_once(' ')?;
        scheme
            .eq_ignore_ascii_case("bearer")
            .then(|| token.trim())
            .filter(|t| !t.is_empty())
    }

    /// The decoded, unverified payload of the bearer token.
    pub fn token_claims(&self) -> Option<Map<String, Value>> {
        decode_claims(self.bearer_token()?)
    }
}

/// Decodes the payload segment of a JWT without verifying it.
pub fn decode_claims(token: &str) -> Option<Map<String, Value>> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    match serde_json::from_slice(&bytes).ok()? {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

/// Serializable form of a finished response, stored by idempotency.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CachedResponse {
    /// Status code.
    pub status: u16,
    /// Content type.
    #[serde(default)]
    pub content_type: Option<String>,
    /// Response headers.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Base64 encoded body.
    pub body: String,
}

impl CachedResponse {
    /// Encodes the snapshot as JSON bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ContextError> {
        serde_json::to_vec(self).map_err(|e| ContextError::InvalidSnapshot(e.to_string()))
    }

    /// Decodes a snapshot previously produced by [`to_bytes`](Self::to_bytes).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ContextError> {
        let snapshot: Self =
            serde_json::from_slice(bytes).map_err(|e| ContextError::InvalidSnapshot(e.to_string()))?;
        StatusCode::from_u16(snapshot.status)
            .map_err(|e| ContextError::InvalidSnapshot(e.to_string()))?;
        STANDARD
            .decode(&snapshot.body)
            .map_err(|e| ContextError::InvalidSnapshot(e.to_string()))?;
        Ok(snapshot)
    }
}

/// Mutable state threaded through a handler chain.
///
/// Handlers communicate only through this context. Once
/// [`has_error`](Self::has_error) or [`has_cache`](Self::has_cache) is set it
/// stays set, and the remaining handlers skip their work.
#[derive(Debug, Clone)]
pub struct PipelineContext {
    payload: Bytes,
    preserved: HashMap<String, Bytes>,
    status: Option<StatusCode>,
    content_type: Option<String>,
    headers: BTreeMap<String, String>,
    has_error: bool,
    has_cache: bool,
    error_message: Option<String>,
    started_at: Instant,
}

impl Default for PipelineContext {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineContext {
    /// Creates an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self {
            payload: Bytes::new(),
            preserved: HashMap::new(),
            status: None,
            content_type: None,
            headers: BTreeMap::new(),
            has_error: false,
            has_cache: false,
            error_message: None,
            started_at: Instant::now(),
        }
    }

    /// Current payload.
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Current payload as text (lossy).
    pub fn payload_text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }

    /// Replaces the current payload.
    pub fn set_payload(&mut self, payload: impl Into<Bytes>) {
        self.payload = payload.into();
    }

    /// Whether the current payload is a JSON array.
    pub fn is_array(&self) -> bool {
        self.payload
            .iter()
            .find(|b| !b.is_ascii_whitespace())
            .is_some_and(|b| *b == b'[')
    }

    /// The current payload parsed as a JSON object, if it is one.
    pub fn payload_object(&self) -> Option<Map<String, Value>> {
        match serde_json::from_slice(&self.payload).ok()? {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }

    /// A payload preserved by the given action.
    pub fn preserved(&self, action_id: &str) -> Option<&Bytes> {
        self.preserved.get(action_id)
    }

    /// Stores a payload under an action id without touching the current one.
    pub fn preserve(&mut self, action_id: impl Into<String>, payload: impl Into<Bytes>) {
        self.preserved.insert(action_id.into(), payload.into());
    }

    /// Writes an action's output, honouring `preserveCurrentBody`.
    pub fn set_action_body(&mut self, action_id: &str, settings: &BodySettings, body: Bytes) {
        if settings.preserve_current_body {
            self.preserve(action_id, body);
        } else {
            self.payload = body;
        }
    }

    /// The input an action should read, honouring `body.use`.
    pub fn action_body(&self, settings: &BodySettings) -> Result<Bytes, ContextError> {
        let Some(reference) = settings.use_body.as_deref() else {
            return Ok(self.payload.clone());
        };
        let action_id = reference
            .trim()
            .strip_prefix("{{")
            .and_then(|s| s.strip_suffix("}}"))
            .map(str::trim)
            .and_then(|s| s.strip_prefix(BODY_ACTIONS_PREFIX))
            .ok_or_else(|| ContextError::InvalidBodyReference {
                reference: reference.to_string(),
            })?;
        self.preserved
            .get(action_id)
            .cloned()
            .ok_or_else(|| ContextError::PreservedBodyNotFound {
                action_id: action_id.to_string(),
            })
    }

    /// Response status, if any handler set one.
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// Sets the response status.
    pub fn set_status(&mut self, status: StatusCode) {
        self.status = Some(status);
    }

    /// Response content type.
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// Sets the response content type.
    pub fn set_content_type(&mut self, content_type: impl Into<String>) {
        self.content_type = Some(content_type.into());
    }

    /// Response headers.
    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    /// Sets a response header. Names are stored lower-case.
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
    }

    /// Whether a handler failed.
    pub fn has_error(&self) -> bool {
        self.has_error
    }

    /// Whether the response was replayed from the idempotency store.
    pub fn has_cache(&self) -> bool {
        self.has_cache
    }

    /// Whether the remaining handlers should skip their work.
    pub fn is_halted(&self) -> bool {
        self.has_error || self.has_cache
    }

    /// Why the chain failed, if it did.
    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// Fails the chain with a plain-text message as the response body.
    pub fn fail(&mut self, status: StatusCode, message: impl Into<String>) {
        let message = message.into();
        self.has_error = true;
        self.status = Some(status);
        self.content_type = Some("text/plain".to_string());
        self.payload = Bytes::from(message.clone());
        self.error_message = Some(message);
    }

    /// Fails the chain but keeps the current payload, e.g. an upstream error body.
    pub fn mark_error(&mut self, status: StatusCode, message: impl Into<String>) {
        self.has_error = true;
        self.status = Some(status);
        self.error_message = Some(message.into());
    }

    /// Time since the context was created.
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Captures the response for the idempotency store.
    pub fn snapshot(&self) -> CachedResponse {
        CachedResponse {
            status: self.status.unwrap_or(StatusCode::OK).as_u16(),
            content_type: self.content_type.clone(),
            headers: self.headers.clone(),
            body: STANDARD.encode(&self.payload),
        }
    }

    /// Replays a stored response and marks the context as cached.
    pub fn restore(&mut self, cached: CachedResponse) -> Result<(), ContextError> {
        let status = StatusCode::from_u16(cached.status)
            .map_err(|e| ContextError::InvalidSnapshot(e.to_string()))?;
        let body = STANDARD
            .decode(&cached.body)
            .map_err(|e| ContextError::InvalidSnapshot(e.to_string()))?;
        self.status = Some(status);
        self.content_type = cached.content_type;
        self.headers = cached.headers;
        self.payload = Bytes::from(body);
        self.has_cache = true;
        Ok(())
    }
}
