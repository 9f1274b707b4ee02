//! Applies a compiled contract map to the current payload.

use http::StatusCode;
use std::sync::Arc;
use tracing::warn;
use wrench_core::{ContractMap, PipelineContext, RouteContext};

use crate::handler::{BoxFuture, Flow, Handler};

/// Runs a contract map as a `before` or `after` action trigger.
#[derive(Debug, Clone)]
pub struct ContractMapHandler {
    map: Arc<ContractMap>,
}

impl ContractMapHandler {
    /// Wraps a compiled map.
    pub fn new(map: Arc<ContractMap>) -> Self {
        Self { map }
    }

    /// Id of the wrapped map.
    pub fn map_id(&self) -> &str {
        self.map.id()
    }
}

impl Handler for ContractMapHandler {
    fn name(&self) -> &'static str {
        "contract_map"
    }

    fn handle<'a>(
        &'a self,
        route: &'a RouteContext,
        pipeline: &'a mut PipelineContext,
    ) -> BoxFuture<'a, Flow> {
        Box::pin(async move {
            match self.map.apply(route, pipeline) {
                Ok(payload) => pipeline.set_payload(payload),
                Err(e) => {
                    warn!(
                        request_id = %route.request_id(),
                        contract_map = %self.map.id(),
                        error = %e,
                        "contract map failed"
                    );
                    pipeline.fail(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
                }
            }
            Flow::Continue
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::request;
    use serde_json::{json, Value};
    use wrench_config::ContractMapSettings;

    fn handler(settings: ContractMapSettings) -> ContractMapHandler {
        ContractMapHandler::new(Arc::new(ContractMap::compile(&settings).unwrap()))
    }

    #[tokio::test]
    async fn test_rewrites_payload() {
        let handler = handler(ContractMapSettings {
            id: "shape".to_string(),
            rename: vec!["name:fullName".to_string()],
            remove: vec!["secret".to_string()],
            ..Default::default()
        });
        let route = request("POST", "/users", "/users").build();
        let mut pipeline = PipelineContext::new();
        pipeline.set_payload(r#"{"name":"Ana","secret":"x"}"#);

        handler.handle(&route, &mut pipeline).await;

        let body: Value = serde_json::from_slice(pipeline.payload()).unwrap();
        assert_eq!(body, json!({"fullName": "Ana"}));
        assert_eq!(handler.map_id(), "shape");
    }

    #[tokio::test]
    async fn test_failure_halts_with_plain_text() {
        let handler = handler(ContractMapSettings {
            id: "ratio".to_string(),
            math: vec!["qty/0".to_string()],
            ..Default::default()
        });
        let route = request("POST", "/orders", "/orders").build();
        let mut pipeline = PipelineContext::new();
        pipeline.set_payload(r#"{"qty":4}"#);

        handler.handle(&route, &mut pipeline).await;

        assert!(pipeline.has_error());
        assert_eq!(pipeline.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
        assert_eq!(pipeline.content_type(), Some("text/plain"));
        assert!(pipeline.payload_text().contains("division by zero"));
    }
}
