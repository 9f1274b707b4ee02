//! Final stage: settles the response metadata.

use bytes::Bytes;
use http::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use http::{Response, StatusCode};
use http_body_util::Full;
use tracing::warn;
use wrench_core::{PipelineContext, RouteContext};

use crate::handler::{BoxFuture, Flow, Handler};

const JSON: &str = "application/json";

/// Fills in defaults once every other stage has run.
///
/// Without a status, a failed pipeline answers 500 and a successful one 200.
/// A non-empty payload without a content type is labelled JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct Responder;

impl Handler for Responder {
    fn name(&self) -> &'static str {
        "responder"
    }

    fn runs_when_halted(&self) -> bool {
        true
    }

    fn handle<'a>(
        &'a self,
        _route: &'a RouteContext,
        pipeline: &'a mut PipelineContext,
    ) -> BoxFuture<'a, Flow> {
        Box::pin(async move {
            if pipeline.status().is_none() {
                let status = if pipeline.has_error() {
                    StatusCode::INTERNAL_SERVER_ERROR
                } else {
                    StatusCode::OK
                };
                pipeline.set_status(status);
            }
            if pipeline.content_type().is_none() && !pipeline.payload().is_empty() {
                pipeline.set_content_type(JSON);
            }
            Flow::Continue
        })
    }
}

/// Converts a finished pipeline into an HTTP response.
///
/// Headers whose name or value is not valid HTTP are dropped with a warning.
pub fn render(pipeline: &PipelineContext) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(pipeline.payload().clone()));
    *response.status_mut() = pipeline.status().unwrap_or(if pipeline.has_error() {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::OK
    });

    let headers = response.headers_mut();
    for (name, value) in pipeline.headers() {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => warn!(header = %name, "dropping invalid response header"),
        }
    }
    if let Some(content_type) = pipeline.content_type() {
        match HeaderValue::from_str(content_type) {
            Ok(value) => {
                headers.insert(CONTENT_TYPE, value);
            }
            Err(_) => warn!(content_type, "dropping invalid content type"),
        }
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::request;
    use http_body_util::BodyExt;

    async fn settle(pipeline: &mut PipelineContext) {
        let route = request("GET", "/r", "/r").build();
        Responder.handle(&route, pipeline).await;
    }

    #[tokio::test]
    async fn test_defaults_for_success() {
        let mut pipeline = PipelineContext::new();
        pipeline.set_payload(r#"{"ok":true}"#);
        settle(&mut pipeline).await;
        assert_eq!(pipeline.status(), Some(StatusCode::OK));
        assert_eq!(pipeline.content_type(), Some(JSON));
    }

    #[tokio::test]
    async fn test_empty_body_has_no_content_type() {
        let mut pipeline = PipelineContext::new();
        settle(&mut pipeline).await;
        assert_eq!(pipeline.status(), Some(StatusCode::OK));
        assert_eq!(pipeline.content_type(), None);
    }

    #[tokio::test]
    async fn test_failure_keeps_status() {
        let mut pipeline = PipelineContext::new();
        pipeline.fail(StatusCode::TOO_MANY_REQUESTS, "slow down");
        settle(&mut pipeline).await;
        assert_eq!(pipeline.status(), Some(StatusCode::TOO_MANY_REQUESTS));
        assert_eq!(pipeline.content_type(), Some("text/plain"));
    }

    #[tokio::test]
    async fn test_render() {
        let mut pipeline = PipelineContext::new();
        pipeline.set_status(StatusCode::CREATED);
        pipeline.set_content_type("application/json");
        pipeline.set_header("X-Trace", "abc");
        pipeline.set_header("bad header", "x");
        pipeline.set_payload(r#"{"id":1}"#);

        let response = render(&pipeline);
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()["x-trace"], "abc");
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
        assert_eq!(response.headers().len(), 2);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body, Bytes::from_static(br#"{"id":1}"#));
    }
}
