//! First stage of every chain.

use crate::handler::{BoxFuture, Flow, Handler};
use wrench_core::{PipelineContext, RouteContext};

/// Copies the inbound body and content type into the pipeline.
#[derive(Debug, Clone, Copy, Default)]
pub struct EntryHandler;

impl Handler for EntryHandler {
    fn name(&self) -> &'static str {
        "entry"
    }

    fn handle<'a>(
        &'a self,
        route: &'a RouteContext,
        pipeline: &'a mut PipelineContext,
    ) -> BoxFuture<'a, Flow> {
        Box::pin(async move {
            pipeline.set_payload(route.body().clone());
            if let Some(content_type) = route.header("content-type") {
                pipeline.set_content_type(content_type);
            }
            Flow::Continue
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::request;

    #[tokio::test]
    async fn test_loads_body_and_content_type() {
        let route = request("POST", "/orders", "/orders")
            .header("content-type", "application/json")
            .body(r#"{"id":1}"#);
        let mut pipeline = PipelineContext::new();

        EntryHandler.handle(&route, &mut pipeline).await;

        assert_eq!(pipeline.payload_text(), r#"{"id":1}"#);
        assert_eq!(pipeline.content_type(), Some("application/json"));
    }

    #[tokio::test]
    async fn test_empty_request() {
        let route = request("GET", "/orders", "/orders").build();
        let mut pipeline = PipelineContext::new();

        EntryHandler.handle(&route, &mut pipeline).await;

        assert!(pipeline.payload().is_empty());
        assert_eq!(pipeline.content_type(), None);
    }
}
