//! Summarisation middleware (§4.6): compresses older chat history once
//! the estimated token count crosses a threshold, keeping the most
//! recent turns and any tool-call/tool-result message verbatim.
//!
//! Token counting reuses the teacher's character-ratio heuristic
//! (`core/token_estimator.rs`'s `CharacterRatioTokenEstimator`, ~4 chars
//! per token) rather than a model-specific tokenizer.

use super::{Middleware, Step};
use crate::error::AgentError;
use crate::workflow::context::ExecutionContext;
use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

pub const MESSAGES_KEY: &str = "messages";
pub const FORCE_SUMMARY_KEY: &str = "force_summary";
pub const HISTORY_KEY: &str = "summary_history";

const DEFAULT_TOKEN_THRESHOLD: usize = 100_000;
const DEFAULT_KEEP_RECENT_TURNS: usize = 5;
const CHARS_PER_TOKEN: usize = 4;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryEntry {
    pub session_summary: String,
    pub stage_summary: String,
    pub compressed_count: usize,
}

/// Estimates tokens by dividing the serialized message's character count
/// by a fixed ratio — "a rough heuristic, never exact" (§4.6).
fn estimate_tokens(message: &Value) -> usize {
    let text = message.to_string();
    (text.len() + CHARS_PER_TOKEN - 1) / CHARS_PER_TOKEN
}

fn carries_tool_activity(message: &Value) -> bool {
    message.get("tool_call").is_some() || message.get("tool_result").is_some()
}

/// Calls out to the model to produce the two labelled summary sections.
pub type SummaryFn =
    Arc<dyn Fn(Vec<Value>) -> BoxFuture<'static, Result<(String, String), AgentError>> + Send + Sync>;

pub struct SummarizeMiddleware {
    summarize: SummaryFn,
    token_threshold: usize,
    keep_recent_turns: usize,
}

impl SummarizeMiddleware {
    pub fn new(summarize: SummaryFn) -> Self {
        Self {
            summarize,
            token_threshold: DEFAULT_TOKEN_THRESHOLD,
            keep_recent_turns: DEFAULT_KEEP_RECENT_TURNS,
        }
    }

    pub fn with_token_threshold(mut self, threshold: usize) -> Self {
        self.token_threshold = threshold;
        self
    }

    pub fn with_keep_recent_turns(mut self, turns: usize) -> Self {
        self.keep_recent_turns = turns;
        self
    }

    /// Split messages into (preserved, compressible): preserved is the
    /// last `keep_recent_turns` plus any tool-call/tool-result message
    /// anywhere in the transcript, in original order.
    fn partition(&self, messages: &[Value]) -> (Vec<usize>, Vec<usize>) {
        let recent_start = messages.len().saturating_sub(self.keep_recent_turns);
        let mut preserved = Vec::new();
        let mut compressible = Vec::new();
        for (i, message) in messages.iter().enumerate() {
            if i >= recent_start || carries_tool_activity(message) {
                preserved.push(i);
            } else {
                compressible.push(i);
            }
        }
        (preserved, compressible)
    }
}

#[async_trait]
impl Middleware for SummarizeMiddleware {
    async fn before_step(&self, ctx: &Arc<ExecutionContext>, _step: &Step) -> Result<(), AgentError> {
        let Some(raw) = ctx.get(MESSAGES_KEY) else {
            return Ok(());
        };
        let messages: Vec<Value> = serde_json::from_value(raw)
            .map_err(|e| AgentError::Workflow(format!("invalid message list: {e}")))?;

        let force = ctx
            .get(FORCE_SUMMARY_KEY)
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        let total_tokens: usize = messages.iter().map(estimate_tokens).sum();

        if !force && total_tokens <= self.token_threshold {
            return Ok(());
        }

        let (preserved, compressible) = self.partition(&messages);
        if compressible.is_empty() {
            return Ok(());
        }

        let compressible_messages: Vec<Value> = compressible.iter().map(|&i| messages[i].clone()).collect();
        let (session_summary, stage_summary) = (self.summarize)(compressible_messages).await?;

        let split = preserved
            .iter()
            .position(|&i| i >= messages.len().saturating_sub(self.keep_recent_turns))
            .unwrap_or(preserved.len());
        let (older_preserved, recent_preserved) = preserved.split_at(split);

        let summary_message = serde_json::json!({
            "role": "system",
            "content": format!("Session summary:\n{}\n\nStage summary:\n{}", session_summary, stage_summary)
        });

        let mut rewritten: Vec<Value> = older_preserved.iter().map(|&i| messages[i].clone()).collect();
        rewritten.push(summary_message);
        rewritten.extend(recent_preserved.iter().map(|&i| messages[i].clone()));

        ctx.set(MESSAGES_KEY, serde_json::to_value(&rewritten).unwrap());
        ctx.remove(FORCE_SUMMARY_KEY);

        let mut history: Vec<SummaryEntry> = ctx
            .get(HISTORY_KEY)
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();
        history.push(SummaryEntry {
            session_summary,
            stage_summary,
            compressed_count: compressible.len(),
        });
        ctx.set(HISTORY_KEY, serde_json::to_value(&history).unwrap());

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

/// Returns a defensive copy of the summary history, per §4.6 ("The
/// history accessor returns a defensive copy").
pub fn history(ctx: &ExecutionContext) -> Vec<SummaryEntry> {
    ctx.get(HISTORY_KEY)
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::ToolRegistry;

    fn ctx() -> Arc<ExecutionContext> {
        Arc::new(ExecutionContext::new(Arc::new(ToolRegistry::new())))
    }

    fn stub_summarizer() -> SummaryFn {
        Arc::new(|_msgs| Box::pin(async { Ok(("session".to_string(), "stage".to_string())) }))
    }

    fn message(role: &str, content: &str) -> Value {
        serde_json::json!({"role": role, "content": content})
    }

    #[tokio::test]
    async fn below_threshold_is_left_untouched() {
        let middleware = SummarizeMiddleware::new(stub_summarizer());
        let context = ctx();
        let messages = vec![message("user", "hi")];
        context.set(MESSAGES_KEY, serde_json::to_value(&messages).unwrap());
        middleware
            .before_step(&context, &Step { node_name: "n".to_string() })
            .await
            .unwrap();
        let after: Vec<Value> = serde_json::from_value(context.get(MESSAGES_KEY).unwrap()).unwrap();
        assert_eq!(after, messages);
    }

    #[tokio::test]
    async fn force_flag_triggers_compression_and_records_history() {
        let middleware = SummarizeMiddleware::new(stub_summarizer()).with_keep_recent_turns(1);
        let context = ctx();
        let messages: Vec<Value> = (0..5).map(|i| message("user", &format!("turn {i}"))).collect();
        context.set(MESSAGES_KEY, serde_json::to_value(&messages).unwrap());
        context.set(FORCE_SUMMARY_KEY, serde_json::json!(true));

        middleware
            .before_step(&context, &Step { node_name: "n".to_string() })
            .await
            .unwrap();

        let after: Vec<Value> = serde_json::from_value(context.get(MESSAGES_KEY).unwrap()).unwrap();
        assert!(after.iter().any(|m| m["role"] == "system"
            && m["content"].as_str().unwrap().contains("Session summary:")));
        assert_eq!(history(&context).len(), 1);
        assert!(context.get(FORCE_SUMMARY_KEY).is_none());
    }

    #[tokio::test]
    async fn tool_call_messages_are_preserved_even_when_old() {
        let middleware = SummarizeMiddleware::new(stub_summarizer()).with_keep_recent_turns(1);
        let context = ctx();
        let mut messages: Vec<Value> = (0..5).map(|i| message("user", &format!("turn {i}"))).collect();
        messages[0] = serde_json::json!({"role": "assistant", "content": "x", "tool_call": {"name": "echo"}});
        context.set(MESSAGES_KEY, serde_json::to_value(&messages).unwrap());
        context.set(FORCE_SUMMARY_KEY, serde_json::json!(true));

        middleware
            .before_step(&context, &Step { node_name: "n".to_string() })
            .await
            .unwrap();

        let after: Vec<Value> = serde_json::from_value(context.get(MESSAGES_KEY).unwrap()).unwrap();
        assert!(after.iter().any(|m| m.get("tool_call").is_some()));
    }
}
