//! Runs an action executor and writes its output into the pipeline.

use http::StatusCode;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};
use wrench_config::ActionSettings;
use wrench_core::{PipelineContext, RouteContext};
use wrench_telemetry::metrics;

use crate::actions::{ActionExecutor, ActionRequest};
use crate::handler::{BoxFuture, Flow, Handler};

/// One manifest action inside a chain.
///
/// The input is the current payload, or the body preserved by the action
/// named in `body.use`. The output replaces the payload, or is preserved under
/// this action's id when `preserveCurrentBody` is set. An output status of
/// 400 or above fails the chain but keeps the output as the response body.
#[derive(Debug, Clone)]
pub struct ActionHandler {
    settings: Arc<ActionSettings>,
    executor: Arc<dyn ActionExecutor>,
}

impl ActionHandler {
    /// Binds an executor to its action.
    pub fn new(settings: Arc<ActionSettings>, executor: Arc<dyn ActionExecutor>) -> Self {
        Self { settings, executor }
    }

    /// The action id.
    pub fn action_id(&self) -> &str {
        &self.settings.id
    }
}

impl Handler for ActionHandler {
    fn name(&self) -> &'static str {
        "action"
    }

    fn handle<'a>(
        &'a self,
        route: &'a RouteContext,
        pipeline: &'a mut PipelineContext,
    ) -> BoxFuture<'a, Flow> {
        Box::pin(async move {
            let action_id = self.settings.id.as_str();
            let input = match pipeline.action_body(&self.settings.body) {
                Ok(input) => input,
                Err(e) => {
                    warn!(request_id = %route.request_id(), action_id, error = %e, "action input unavailable");
                    pipeline.fail(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
                    return Flow::Continue;
                }
            };

            let started = Instant::now();
            let result = self
                .executor
                .execute(ActionRequest {
                    route,
                    pipeline: &*pipeline,
                    body: &input,
                })
                .await;
            let elapsed = started.elapsed();

            match result {
                Ok(output) => {
                    let failed = output.status.is_some_and(|s| s.as_u16() >= 400);
                    metrics::record_action(action_id, !failed, elapsed);
                    debug!(
                        request_id = %route.request_id(),
                        action_id,
                        status = output.status.map(|s| s.as_u16()),
                        duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                        "action completed"
                    );

                    pipeline.set_action_body(action_id, &self.settings.body, output.body);
                    if let Some(content_type) = output.content_type {
                        pipeline.set_content_type(content_type);
                    }
                    for (name, value) in output.headers {
                        pipeline.set_header(&name, value);
                    }
                    match output.status {
                        Some(status) if failed => {
                            pipeline.mark_error(status, format!("action '{action_id}' returned {status}"));
                        }
                        Some(status) => pipeline.set_status(status),
                        None => {}
                    }
                }
                Err(e) => {
                    metrics::record_action(action_id, false, elapsed);
                    warn!(
                        request_id = %route.request_id(),
                        action_id,
                        status = e.status.as_u16(),
                        error = %e,
                        "action failed"
                    );
                    pipeline.fail(e.status, e.message);
                }
            }
            Flow::Continue
        })
    }
}
