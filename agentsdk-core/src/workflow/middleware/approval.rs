//! Approval middleware (§4.6): drains pending approval requests from the
//! execution context, submits them to a queue, and polls for a decision.

use super::{Middleware, Step};
use crate::error::AgentError;
use crate::workflow::context::ExecutionContext;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::sleep;

pub const APPROVAL_REQUESTS_KEY: &str = "approval_requests";
pub const PROGRESS_EVENTS_KEY: &str = "progress_events";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub id: Option<String>,
    pub tool: String,
    pub params: serde_json::Value,
    pub comment: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalDecision {
    Pending,
    Approved,
    Rejected,
    Timeout,
}

/// The §3 data-model record: monotonic state (pending → terminal, never
/// regresses) plus whether the decision was made by the whitelist rather
/// than an external approver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRecord {
    pub id: String,
    pub session_id: Option<String>,
    pub tool: String,
    pub params: serde_json::Value,
    pub decision: ApprovalDecision,
    pub auto: bool,
    pub comment: String,
    pub created: chrono::DateTime<chrono::Utc>,
}

/// Outcome of `submit`: the assigned id plus whether the queue resolved
/// it immediately via the whitelist, which callers use to suppress the
/// `approval_requested` event (§8 scenario 6).
pub struct SubmitOutcome {
    pub id: String,
    pub auto: bool,
}

/// A pending-approval store. `lookup` is polled until the decision leaves
/// `Pending` (§4.6: "polls queue.lookup(id) at a configured cadence").
#[async_trait]
pub trait ApprovalQueue: Send + Sync {
    async fn submit(&self, request: ApprovalRequest) -> SubmitOutcome;
    async fn lookup(&self, id: &str) -> ApprovalDecision;
}

/// In-memory queue that auto-approves requests matching a whitelist of
/// `(tool, params)` pairs seen within a recency window, and otherwise
/// leaves the request pending for an external decision (`resolve`).
pub struct WhitelistApprovalQueue {
    whitelist: Vec<(String, serde_json::Value)>,
    decisions: Mutex<HashMap<String, ApprovalDecision>>,
    next_id: Mutex<u64>,
}

impl WhitelistApprovalQueue {
    pub fn new(whitelist: Vec<(String, serde_json::Value)>) -> Self {
        Self {
            whitelist,
            decisions: Mutex::new(HashMap::new()),
            next_id: Mutex::new(0),
        }
    }

    pub async fn resolve(&self, id: &str, decision: ApprovalDecision) {
        self.decisions.lock().await.insert(id.to_string(), decision);
    }
}

#[async_trait]
impl ApprovalQueue for WhitelistApprovalQueue {
    async fn submit(&self, request: ApprovalRequest) -> SubmitOutcome {
        let id = match request.id.clone() {
            Some(id) => id,
            None => {
                let mut next_id = self.next_id.lock().await;
                *next_id += 1;
                format!("approval-{}", *next_id)
            }
        };
        let auto_approved = self
            .whitelist
            .iter()
            .any(|(tool, params)| tool == &request.tool && params == &request.params);
        let decision = if auto_approved {
            ApprovalDecision::Approved
        } else {
            ApprovalDecision::Pending
        };
        self.decisions.lock().await.insert(id.clone(), decision);
        SubmitOutcome { id, auto: auto_approved }
    }

    async fn lookup(&self, id: &str) -> ApprovalDecision {
        self.decisions
            .lock()
            .await
            .get(id)
            .copied()
            .unwrap_or(ApprovalDecision::Pending)
    }
}

pub struct ApprovalMiddleware {
    queue: Arc<dyn ApprovalQueue>,
    poll_interval: Duration,
    decision_timeout: Option<Duration>,
}

impl ApprovalMiddleware {
    pub fn new(queue: Arc<dyn ApprovalQueue>) -> Self {
        Self {
            queue,
            poll_interval: Duration::from_millis(100),
            decision_timeout: None,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_decision_timeout(mut self, timeout: Duration) -> Self {
        self.decision_timeout = Some(timeout);
        self
    }

    fn push_event(ctx: &ExecutionContext, event: &str, id: &str) {
        let mut events = ctx
            .get(PROGRESS_EVENTS_KEY)
            .and_then(|v| serde_json::from_value::<Vec<serde_json::Value>>(v).ok())
            .unwrap_or_default();
        events.push(serde_json::json!({"event": event, "id": id}));
        ctx.set(PROGRESS_EVENTS_KEY, serde_json::json!(events));
    }
}

#[async_trait]
impl Middleware for ApprovalMiddleware {
    async fn before_step(&self, ctx: &Arc<ExecutionContext>, _step: &Step) -> Result<(), AgentError> {
        let Some(raw) = ctx.remove(APPROVAL_REQUESTS_KEY) else {
            return Ok(());
        };
        let requests: Vec<ApprovalRequest> = serde_json::from_value(raw)
            .map_err(|e| AgentError::Workflow(format!("invalid approval requests: {e}")))?;

        for request in requests {
            let tool = request.tool.clone();
            let comment = request.comment.clone();
            let outcome = self.queue.submit(request).await;
            let id = outcome.id;
            if !outcome.auto {
                Self::push_event(ctx, "approval_requested", &id);
            }

            let deadline = self.decision_timeout.map(|d| tokio::time::Instant::now() + d);
            let decision = loop {
                let decision = self.queue.lookup(&id).await;
                if decision != ApprovalDecision::Pending {
                    break decision;
                }
                if let Some(deadline) = deadline {
                    if tokio::time::Instant::now() >= deadline {
                        break ApprovalDecision::Timeout;
                    }
                }
                tokio::select! {
                    _ = sleep(self.poll_interval) => {}
                    _ = ctx.cancel.cancelled() => return Err(AgentError::Cancelled("workflow cancelled while awaiting approval".to_string())),
                }
            };
            Self::push_event(ctx, "approval_decided", &id);

            match decision {
                ApprovalDecision::Approved => {}
                ApprovalDecision::Rejected => {
                    return Err(AgentError::PermissionDenied(format!(
                        "approval for tool '{tool}' rejected: {comment}"
                    )))
                }
                ApprovalDecision::Timeout => {
                    return Err(AgentError::Cancelled(format!(
                        "approval for tool '{tool}' timed out: {comment}"
                    )))
                }
                ApprovalDecision::Pending => unreachable!("loop only exits on a non-pending decision"),
            }
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

    #[tokio::test]
    async fn whitelisted_request_auto_approves() {
        let queue = Arc::new(WhitelistApprovalQueue::new(vec![(
            "run_shell".to_string(),
            serde_json::json!({"command": "ls"}),
        )]));
        let middleware = ApprovalMiddleware::new(queue).with_poll_interval(Duration::from_millis(1));
        let context = ctx();
        context.set(
            APPROVAL_REQUESTS_KEY,
            serde_json::json!([{
                "id": null,
                "tool": "run_shell",
                "params": {"command": "ls"},
                "comment": "list files"
            }]),
        );
        middleware
            .before_step(&context, &Step { node_name: "n".to_string() })
            .await
            .unwrap();

        let events = context
            .get(PROGRESS_EVENTS_KEY)
            .and_then(|v| serde_json::from_value::<Vec<serde_json::Value>>(v).ok())
            .unwrap_or_default();
        assert!(events.iter().all(|e| e["event"] != "approval_requested"));
    }

    #[tokio::test]
    async fn unresolved_request_times_out() {
        let queue = Arc::new(WhitelistApprovalQueue::new(vec![]));
        let middleware = ApprovalMiddleware::new(queue)
            .with_poll_interval(Duration::from_millis(1))
            .with_decision_timeout(Duration::from_millis(20));
        let context = ctx();
        context.set(
            APPROVAL_REQUESTS_KEY,
            serde_json::json!([{
                "id": null,
                "tool": "run_shell",
                "params": {"command": "rm -rf /"},
                "comment": "dangerous"
            }]),
        );
        let err = middleware
            .before_step(&context, &Step { node_name: "n".to_string() })
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Cancelled(_)));
    }

    #[tokio::test]
    async fn rejected_decision_fails_the_step() {
        let queue = Arc::new(WhitelistApprovalQueue::new(vec![]));
        let middleware = ApprovalMiddleware::new(queue.clone()).with_poll_interval(Duration::from_millis(1));
        let context = ctx();
        context.set(
            APPROVAL_REQUESTS_KEY,
            serde_json::json!([{
                "id": "fixed-id",
                "tool": "run_shell",
                "params": {"command": "rm -rf /"},
                "comment": "dangerous"
            }]),
        );
        tokio::spawn({
            let queue = queue.clone();
            async move {
                sleep(Duration::from_millis(5)).await;
                queue.resolve("fixed-id", ApprovalDecision::Rejected).await;
            }
        });
        let err = middleware
            .before_step(&context, &Step { node_name: "n".to_string() })
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::PermissionDenied(_)));
    }

    #[tokio::test]
    async fn non_whitelisted_request_emits_approval_requested() {
        let queue = Arc::new(WhitelistApprovalQueue::new(vec![]));
        let middleware = ApprovalMiddleware::new(queue.clone()).with_poll_interval(Duration::from_millis(1));
        let context = ctx();
        context.set(
            APPROVAL_REQUESTS_KEY,
            serde_json::json!([{
                "id": "needs-approval",
                "tool": "run_shell",
                "params": {"command": "ls"},
                "comment": "list files"
            }]),
        );
        tokio::spawn({
            let queue = queue.clone();
            async move {
                sleep(Duration::from_millis(5)).await;
                queue.resolve("needs-approval", ApprovalDecision::Approved).await;
            }
        });
        middleware
            .before_step(&context, &Step { node_name: "n".to_string() })
            .await
            .unwrap();

        let events = context
            .get(PROGRESS_EVENTS_KEY)
            .and_then(|v| serde_json::from_value::<Vec<serde_json::Value>>(v).ok())
            .unwrap_or_default();
        assert!(events.iter().any(|e| e["event"] == "approval_requested"));
    }

    #[test]
    fn approval_record_round_trips_the_auto_field() {
        let record = ApprovalRecord {
            id: "a-1".to_string(),
            session_id: Some("s".to_string()),
            tool: "echo".to_string(),
            params: serde_json::json!({"k": "v"}),
            decision: ApprovalDecision::Approved,
            auto: true,
            comment: "".to_string(),
            created: chrono::Utc::now(),
        };
        let value = serde_json::to_value(&record).unwrap();
        let back: ApprovalRecord = serde_json::from_value(value).unwrap();
        assert!(back.auto);
        assert_eq!(back.decision, ApprovalDecision::Approved);
    }
}
