//! Calculated values.
//!
//! A token wrapped in `{{` and `}}` is resolved at request time against the
//! route, the pipeline payload or a built-in function. Anything else is a
//! literal. Resolution never fails: absent sources read as `""` or `null`.
//!
//! ```
//! use std::sync::Arc;
//! use bytes::Bytes;
//! use serde_json::json;
//! use wrench_config::EndpointSettings;
//! use wrench_core::{resolver, PipelineContext, RouteContext};
//!
//! let endpoint = EndpointSettings { route: "/items/{id}".into(), ..Default::default() };
//! let request = http::Request::builder().uri("/items/42").body(Bytes::new()).unwrap();
//! let route = RouteContext::from_request(request, Arc::new(endpoint));
//! let pipeline = PipelineContext::new();
//!
//! let id = resolver::resolve("{{wrenchContext.request.uri.params.id}}", &route, &pipeline);
//! assert_eq!(id, json!("42"));
//! assert_eq!(resolver::resolve("plain", &route, &pipeline), json!("plain"));
//! ```

use std::collections::BTreeMap;

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::context::decode_claims;
use crate::{json_path, layout, PipelineContext, RouteContext};

const BODY: &str = "bodyContext.";
const BODY_ACTIONS: &str = "bodyContext.actions.";
const CURRENT_BODY: &str = "currentBody";
const REQUEST: &str = "wrenchContext.request.";

/// Where a calculated value comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source<'a> {
    /// `bodyContext.actions.<id>`: a preserved payload as text.
    Preserved(&'a str),
    /// `bodyContext.actions.<id>.<path>`: a field of a preserved payload.
    PreservedField {
        /// Action that preserved the payload.
        action_id: &'a str,
        /// Field path.
        path: &'a str,
    },
    /// `bodyContext.<path>`: a field of the current payload.
    Body(&'a str),
    /// `wrenchContext.request.uri`
    RequestUri,
    /// `wrenchContext.request.headers.<name>`
    Header(&'a str),
    /// `wrenchContext.request.uri.params.<name>`
    UriParam(&'a str),
    /// `wrenchContext.request.token.claims.<name>`
    Claim(&'a str),
    /// `uuid`
    Uuid,
    /// `time` or `time <layout>`
    Time(Option<&'a str>),
    /// `func.timestamp(milli)`
    TimestampMillis,
    /// `func.base64(encode)`
    Base64,
    /// `func.base64url(encode)`
    Base64Url,
    /// Anything else.
    Literal(&'a str),
}

impl<'a> Source<'a> {
    /// Classifies an unwrapped expression.
    ///
    /// Body references win over request references, which win over
    /// functions.
    pub fn parse(expr: &'a str) -> Self {
        if let Some(rest) = expr.strip_prefix(BODY_ACTIONS) {
            return match rest.split_once('.') {
                Some((action_id, path)) => Self::PreservedField { action_id, path },
                None => Self::Preserved(rest),
            };
        }
        if let Some(path) = expr.strip_prefix(BODY) {
            return Self::Body(path);
        }
        if let Some(rest) = expr.strip_prefix(REQUEST) {
            if let Some(name) = rest.strip_prefix("uri.params.") {
                return Self::UriParam(name);
            }
            if rest == "uri" {
                return Self::RequestUri;
            }
            if let Some(name) = rest.strip_prefix("headers.") {
                return Self::Header(name);
            }
            if let Some(name) = rest.strip_prefix("token.claims.") {
                return Self::Claim(name);
            }
            return Self::Literal(expr);
        }
        match expr {
            "uuid" => Self::Uuid,
            "time" => Self::Time(None),
            "func.timestamp(milli)" => Self::TimestampMillis,
            "func.base64(encode)" => Self::Base64,
            "func.base64url(encode)" => Self::Base64Url,
            _ => expr
                .strip_prefix("time ")
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map_or(Self::Literal(expr), |l| Self::Time(Some(l))),
        }
    }

    /// Whether repeated resolution can yield different values.
    pub const fn is_volatile(&self) -> bool {
        matches!(self, Self::Uuid | Self::Time(_) | Self::TimestampMillis)
    }
}

/// The inner expression of a `{{...}}` token.
pub fn unwrap(token: &str) -> Option<&str> {
    token
        .trim()
        .strip_prefix("{{")
        .and_then(|s| s.strip_suffix("}}"))
        .map(str::trim)
}

/// Whether `token` is a `{{...}}` calculated value.
pub fn is_calculated(token: &str) -> bool {
    unwrap(token).is_some()
}

/// Resolves `token` to a JSON value.
pub fn resolve(token: &str, route: &RouteContext, pipeline: &PipelineContext) -> Value {
    match unwrap(token) {
        Some(expr) => resolve_source(Source::parse(expr), route, pipeline),
        None => Value::String(token.to_string()),
    }
}

/// Resolves `token` and renders it as text.
pub fn resolve_string(token: &str, route: &RouteContext, pipeline: &PipelineContext) -> String {
    render(&resolve(token, route, pipeline))
}

/// Resolves every value of a string map.
pub fn resolve_map(
    values: &BTreeMap<String, String>,
    route: &RouteContext,
    pipeline: &PipelineContext,
) -> BTreeMap<String, String> {
    values
        .iter()
        .map(|(k, v)| (k.clone(), resolve_string(v, route, pipeline)))
        .collect()
}

/// Text form of a resolved value: strings raw, `null` empty, anything else
/// compact JSON.
pub fn render(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(_) | Value::Number(_) | Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

fn resolve_source(source: Source<'_>, route: &RouteContext, pipeline: &PipelineContext) -> Value {
    match source {
        Source::Preserved(action_id) => pipeline.preserved(action_id).map_or(Value::Null, |b| {
            Value::String(String::from_utf8_lossy(b).into_owned())
        }),
        Source::PreservedField { action_id, path } => pipeline
            .preserved(action_id)
            .and_then(|b| serde_json::from_slice::<Value>(b).ok())
            .and_then(|v| match v {
                Value::Object(doc) => json_path::get(&doc, path).cloned(),
                _ => None,
            })
            .unwrap_or(Value::Null),
        Source::Body(path) => {
            let found = pipeline
                .payload_object()
                .and_then(|doc| json_path::get(&doc, path).cloned());
            match found {
                Some(value) if path != CURRENT_BODY || !is_empty(&value) => value,
                _ if path == CURRENT_BODY => Value::String(pipeline.payload_text()),
                _ => Value::Null,
            }
        }
        Source::RequestUri => Value::String(route.request_uri().to_string()),
        Source::Header(name) => Value::String(route.header(name).unwrap_or_default().to_string()),
        Source::UriParam(name) => Value::String(route.uri_param(name).unwrap_or_default().to_string()),
        Source::Claim(name) => route
            .bearer_token()
            .and_then(decode_claims)
            .and_then(|mut claims| claims.remove(name))
            .unwrap_or_else(|| Value::String(String::new())),
        Source::Uuid => Value::String(Uuid::new_v4().to_string()),
        Source::Time(None) => Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true)),
        Source::Time(Some(l)) => Value::String(layout::format(&Utc::now(), l)),
        Source::TimestampMillis => Value::from(Utc::now().timestamp_millis()),
        Source::Base64 => Value::String(STANDARD.encode(pipeline.payload())),
        Source::Base64Url => Value::String(URL_SAFE_NO_PAD.encode(pipeline.payload())),
        Source::Literal(expr) => Value::String(expr.to_string()),
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Bool(_) | Value::Number(_) | Value::Array(_) | Value::Object(_) => false,
    }
}
