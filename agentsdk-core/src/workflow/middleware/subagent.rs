//! Sub-agent middleware (§4.6): drains sub-agent requests from the
//! execution context and runs each sequentially through an injected
//! runner, collecting results (and any errors) back into the context.

use super::{Middleware, Step};
use crate::error::AgentError;
use crate::workflow::context::ExecutionContext;
use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub const SUBAGENT_REQUESTS_KEY: &str = "subagent_requests";
pub const SUBAGENT_RESULTS_KEY: &str = "subagent_results";
pub const SESSION_KEY: &str = "session_id";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubAgentRequest {
    pub id: Option<String>,
    pub session: Option<String>,
    pub goal: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubAgentResult {
    pub id: String,
    pub output: Option<String>,
    pub error: Option<String>,
}

pub type SubAgentRunner =
    Arc<dyn Fn(SubAgentRequest) -> BoxFuture<'static, Result<String, AgentError>> + Send + Sync>;

pub struct SubAgentMiddleware {
    runner: SubAgentRunner,
    counter: AtomicU64,
    id_prefix: String,
}

impl SubAgentMiddleware {
    pub fn new(runner: SubAgentRunner) -> Self {
        Self {
            runner,
            counter: AtomicU64::new(0),
            id_prefix: "subagent".to_string(),
        }
    }

    pub fn with_id_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.id_prefix = prefix.into();
        self
    }

    fn next_id(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        format!("{}-{:06}", self.id_prefix, n)
    }

    /// Accepts a single request object, a single-element array, or an
    /// array of requests (§4.6: "accepting a single value, a pointer, a
    /// slice of values, or a slice of pointers").
    fn parse_requests(raw: serde_json::Value) -> Result<Vec<SubAgentRequest>, AgentError> {
        if raw.is_array() {
            serde_json::from_value(raw)
                .map_err(|e| AgentError::Workflow(format!("invalid subagent requests: {e}")))
        } else {
            let single: SubAgentRequest = serde_json::from_value(raw)
                .map_err(|e| AgentError::Workflow(format!("invalid subagent request: {e}")))?;
            Ok(vec![single])
        }
    }
}

#[async_trait]
impl Middleware for SubAgentMiddleware {
    async fn before_step(&self, ctx: &Arc<ExecutionContext>, _step: &Step) -> Result<(), AgentError> {
        let Some(raw) = ctx.remove(SUBAGENT_REQUESTS_KEY) else {
            return Ok(());
        };
        let requests = Self::parse_requests(raw)?;
        let session = ctx.get(SESSION_KEY).and_then(|v| v.as_str().map(str::to_string));

        let mut results = Vec::with_capacity(requests.len());
        let mut errors = Vec::new();

        for mut request in requests {
            if request.id.is_none() {
                request.id = Some(self.next_id());
            }
            if request.session.is_none() {
                request.session = session.clone();
            }
            let id = request.id.clone().unwrap();

            match (self.runner)(request).await {
                Ok(output) => results.push(SubAgentResult {
                    id,
                    output: Some(output),
                    error: None,
                }),
                Err(err) => {
                    errors.push(format!("{id}: {err}"));
                    results.push(SubAgentResult {
                        id,
                        output: None,
                        error: Some(err.to_string()),
                    });
                }
            }
        }

        ctx.set(SUBAGENT_RESULTS_KEY, serde_json::to_value(&results).unwrap());

        if !errors.is_empty() {
            return Err(AgentError::Workflow(errors.join("; ")));
        }
        Ok(())
    }

    async fn after_step(
        &self,
        _ctx: &Arc<ExecutionContext>,
        _step: &Step,
        _run_error: Option<&AgentError>,
    ) -> Result<(), AgentError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::ToolRegistry;

    fn ctx() -> Arc<ExecutionContext> {
        Arc::new(ExecutionContext::new(Arc::new(ToolRegistry::new())))
    }

    fn echo_runner() -> SubAgentRunner {
        Arc::new(|req| Box::pin(async move { Ok(format!("did: {}", req.goal)) }))
    }

    #[tokio::test]
    async fn single_request_object_is_accepted() {
        let middleware = SubAgentMiddleware::new(echo_runner());
        let context = ctx();
        context.set(
            SUBAGENT_REQUESTS_KEY,
            serde_json::json!({"id": null, "session": null, "goal": "investigate"}),
        );
        middleware
            .before_step(&context, &Step { node_name: "n".to_string() })
            .await
            .unwrap();
        let results: Vec<SubAgentResult> =
            serde_json::from_value(context.get(SUBAGENT_RESULTS_KEY).unwrap()).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].output.as_deref(), Some("did: investigate"));
    }

    #[tokio::test]
    async fn missing_ids_are_assigned_zero_padded() {
        let middleware = SubAgentMiddleware::new(echo_runner());
        let context = ctx();
        context.set(
            SUBAGENT_REQUESTS_KEY,
            serde_json::json!([
                {"id": null, "session": null, "goal": "a"},
                {"id": null, "session": null, "goal": "b"}
            ]),
        );
        middleware
            .before_step(&context, &Step { node_name: "n".to_string() })
            .await
            .unwrap();
        let results: Vec<SubAgentResult> =
            serde_json::from_value(context.get(SUBAGENT_RESULTS_KEY).unwrap()).unwrap();
        assert_eq!(results[0].id, "subagent-000001");
        assert_eq!(results[1].id, "subagent-000002");
    }

    #[tokio::test]
    async fn missing_session_is_injected_from_context() {
        let middleware = SubAgentMiddleware::new(echo_runner());
        let context = ctx();
        context.set(SESSION_KEY, serde_json::json!("sess-1"));
        context.set(
            SUBAGENT_REQUESTS_KEY,
            serde_json::json!([{"id": "x", "session": null, "goal": "a"}]),
        );
        middleware
            .before_step(&context, &Step { node_name: "n".to_string() })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn runner_error_is_recorded_and_joined() {
        let runner: SubAgentRunner =
            Arc::new(|_req| Box::pin(async move { Err(AgentError::Tool("boom".to_string())) }));
        let middleware = SubAgentMiddleware::new(runner);
        let context = ctx();
        context.set(
            SUBAGENT_REQUESTS_KEY,
            serde_json::json!([{"id": "x", "session": null, "goal": "a"}]),
        );
        let err = middleware
            .before_step(&context, &Step { node_name: "n".to_string() })
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Workflow(_)));
        let results: Vec<SubAgentResult> =
            serde_json::from_value(context.get(SUBAGENT_RESULTS_KEY).unwrap()).unwrap();
        assert_eq!(results[0].error.as_deref(), Some("tool error: boom"));
    }
}
