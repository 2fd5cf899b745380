//! Core middlewares (§4.6): approval gating, context summarisation,
//! sub-agent delegation and todo-list bookkeeping.

pub mod approval;
pub mod subagent;
pub mod summarize;
pub mod todo;

use super::context::ExecutionContext;
use crate::error::AgentError;
use async_trait::async_trait;
use std::sync::Arc;

/// Identifies the node a middleware hook is wrapping.
#[derive(Debug, Clone)]
pub struct Step {
    pub node_name: String,
}

/// A middleware wraps every node execution with a before/after hook pair.
/// Before-hooks run in registration order and an error short-circuits the
/// node; after-hooks always run, in reverse order, for every middleware
/// whose before-hook succeeded (§4.5 "strict LIFO unwinding").
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn before_step(&self, ctx: &Arc<ExecutionContext>, step: &Step) -> Result<(), AgentError>;

    async fn after_step(
        &self,
        ctx: &Arc<ExecutionContext>,
        step: &Step,
        run_error: Option<&AgentError>,
    ) -> Result<(), AgentError>;
}
