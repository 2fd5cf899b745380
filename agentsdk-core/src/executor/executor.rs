//! The executor (§4.4): resolves a `Call` through the registry, sandbox
//! and permission engine, then runs the tool and optionally diverts its
//! output to disk.

use super::persister::OutputPersister;
use crate::context::CancelToken;
use crate::error::AgentError;
use crate::permission::{Decision, PermissionEngine};
use crate::sandbox::{validate_path, SandboxPolicy};
use crate::tool::{Call, CallResult, ToolRegistry};
use chrono::Utc;
use std::sync::Arc;

pub struct Executor {
    registry: Arc<ToolRegistry>,
    sandbox: Option<SandboxPolicy>,
    permission: Option<PermissionEngine>,
    persister: Option<Arc<dyn OutputPersister>>,
}

impl Executor {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            sandbox: None,
            permission: None,
            persister: None,
        }
    }

    pub fn with_sandbox(mut self, sandbox: SandboxPolicy) -> Self {
        self.sandbox = Some(sandbox);
        self
    }

    pub fn with_permission(mut self, permission: PermissionEngine) -> Self {
        self.permission = Some(permission);
        self
    }

    pub fn with_persister(mut self, persister: Arc<dyn OutputPersister>) -> Self {
        self.persister = Some(persister);
        self
    }

    /// Selector string consulted by the permission engine: the tool name
    /// plus, for tools that execute a command, a truncated argument
    /// summary (§4.3 step 1).
    fn selector_for(call: &Call) -> String {
        let summary = call
            .params
            .get("command")
            .and_then(|v| v.as_str())
            .map(|s| s.split_whitespace().next().unwrap_or("").to_string());
        match summary {
            Some(first) if !first.is_empty() => format!("{} {}", call.name, first),
            _ => call.name.clone(),
        }
    }

    pub async fn execute(&self, ctx: &CancelToken, call: &Call) -> Result<CallResult, AgentError> {
        if call.name.trim().is_empty() {
            return Err(AgentError::Validation("call name must not be empty".to_string()));
        }

        let tool = self
            .registry
            .get(&call.name)
            .ok_or_else(|| AgentError::Tool(format!("tool '{}' is not registered", call.name)))?;

        if let (Some(path), Some(sandbox)) = (&call.path, &self.sandbox) {
            validate_path(sandbox, path)
                .await
                .map_err(|e| AgentError::PermissionDenied(format!("path denied: {e}")))?;
        }

        if let Some(permission) = &self.permission {
            let (decision, rule) = permission.evaluate(&Self::selector_for(call));
            match decision {
                Decision::Deny => {
                    return Err(AgentError::PermissionDenied(format!(
                        "call '{}' denied{}",
                        call.name,
                        rule.map(|r| format!(" by rule '{r}'")).unwrap_or_default()
                    )))
                }
                Decision::Ask => {
                    return Err(AgentError::PermissionDenied(format!(
                        "call '{}' requires approval{}",
                        call.name,
                        rule.map(|r| format!(" (rule '{r}')")).unwrap_or_default()
                    )))
                }
                Decision::Allow => {}
            }
        }

        let params = call.cloned_params();
        let started_at = Utc::now();

        let invocation = if let Some(sink) = call.stream_sink.clone().filter(|_| tool.supports_streaming()) {
            tool.stream_execute(ctx, &params, sink).await
        } else {
            tool.execute(ctx, &params).await
        };

        let completed_at = Utc::now();

        match invocation {
            Ok(mut result) => {
                if let Some(persister) = &self.persister {
                    let threshold = persister.threshold_for(&call.name);
                    if result.output.len() >= threshold {
                        let session = call.session_id.as_deref().unwrap_or("default");
                        match persister.persist(session, &call.name, &result.output).await {
                            Ok(output_ref) => result = result.with_output_ref(output_ref),
                            Err(_) => { /* leave output untouched, output_ref stays nil */ }
                        }
                    }
                }
                Ok(CallResult {
                    call_name: call.name.clone(),
                    result: Some(result),
                    error: None,
                    started_at: Some(started_at),
                    completed_at: Some(completed_at),
                })
            }
            Err(err) => Ok(CallResult {
                call_name: call.name.clone(),
                result: None,
                error: Some(Arc::new(err)),
                started_at: Some(started_at),
                completed_at: Some(completed_at),
            }),
        }
    }

    /// Run `execute` over every call in order, one at a time: the next
    /// call does not start until the previous one has completed (§5).
    pub async fn execute_all(&self, ctx: &CancelToken, calls: &[Call]) -> Vec<Result<CallResult, AgentError>> {
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            results.push(self.execute(ctx, call).await);
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::{Params, Tool, ToolDescriptor, ToolResult};
    use async_trait::async_trait;

    struct Echo(ToolDescriptor);

    #[async_trait]
    impl Tool for Echo {
        fn descriptor(&self) -> &ToolDescriptor {
            &self.0
        }
        async fn execute(&self, _ctx: &CancelToken, params: &Params) -> Result<ToolResult, AgentError> {
            let text = params.get("text").and_then(|v| v.as_str()).unwrap_or("").to_string();
            Ok(ToolResult::success(text))
        }
    }

    fn registry_with_echo() -> Arc<ToolRegistry> {
        let registry = Arc::new(ToolRegistry::new());
        registry
            .register(Arc::new(Echo(ToolDescriptor::new("echo", "echoes text"))))
            .unwrap();
        registry
    }

    #[tokio::test]
    async fn empty_name_is_rejected() {
        let executor = Executor::new(registry_with_echo());
        let call = Call::new("");
        let err = executor.execute(&CancelToken::new(), &call).await.unwrap_err();
        assert!(matches!(err, AgentError::Validation(_)));
    }

    #[tokio::test]
    async fn missing_tool_is_reported() {
        let executor = Executor::new(registry_with_echo());
        let call = Call::new("nonexistent");
        let err = executor.execute(&CancelToken::new(), &call).await.unwrap_err();
        assert!(matches!(err, AgentError::Tool(_)));
    }

    #[tokio::test]
    async fn successful_call_returns_result_with_timestamps() {
        let executor = Executor::new(registry_with_echo());
        let mut params = Params::new();
        params.insert("text".to_string(), serde_json::json!("hi"));
        let call = Call::new("echo").with_params(params);
        let result = executor.execute(&CancelToken::new(), &call).await.unwrap();
        assert_eq!(result.result.unwrap().output, "hi");
        assert!(result.started_at.is_some());
        assert!(result.completed_at.is_some());
    }

    #[tokio::test]
    async fn large_output_is_diverted_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let persister = Arc::new(super::super::persister::FileOutputPersister::new(dir.path(), 3));
        let executor = Executor::new(registry_with_echo()).with_persister(persister);
        let mut params = Params::new();
        params.insert("text".to_string(), serde_json::json!("a long output"));
        let call = Call::new("echo").with_params(params);
        let result = executor.execute(&CancelToken::new(), &call).await.unwrap();
        let tool_result = result.result.unwrap();
        assert!(tool_result.output.starts_with("[Output saved to: "));
        assert!(tool_result.output_ref.is_some());
    }

    #[tokio::test]
    async fn deny_rule_rejects_call() {
        let settings = crate::permission::PermissionSettings {
            deny: vec!["echo*".to_string()],
            ask: vec![],
            allow: vec![],
            default: Decision::Allow,
        };
        let permission = PermissionEngine::from_settings(&settings);
        let executor = Executor::new(registry_with_echo()).with_permission(permission);
        let call = Call::new("echo");
        let err = executor.execute(&CancelToken::new(), &call).await.unwrap_err();
        assert!(matches!(err, AgentError::PermissionDenied(_)));
    }

    #[tokio::test]
    async fn execute_all_preserves_order() {
        let executor = Executor::new(registry_with_echo());
        let calls: Vec<Call> = (0..5)
            .map(|i| {
                let mut params = Params::new();
                params.insert("text".to_string(), serde_json::json!(i.to_string()));
                Call::new("echo").with_params(params)
            })
            .collect();
        let results = executor.execute_all(&CancelToken::new(), &calls).await;
        for (i, result) in results.into_iter().enumerate() {
            assert_eq!(result.unwrap().result.unwrap().output, i.to_string());
        }
    }
}
