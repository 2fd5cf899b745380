//! Crate-wide error classification.
//!
//! Every module-level error enum implements `Into<AgentError>` so callers at
//! the crate boundary can match on the §7 kind taxonomy (validation,
//! permission/sandbox, transport, timeout/cancellation, tool, workflow)
//! without needing to know which subsystem raised it.

use agentsdk_commons::ErrorCategory;
use thiserror::Error;

/// Crate-wide error kind, grouping every subsystem error into the
/// classification the spec requires for retry and reporting decisions.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("validation: {0}")]
    Validation(String),

    #[error("permission/sandbox: {0}")]
    PermissionDenied(String),

    #[error("transport: {0}")]
    Transport(String),

    #[error("timeout or cancellation: {0}")]
    Cancelled(String),

    #[error("tool error: {0}")]
    Tool(String),

    #[error("workflow error: {0}")]
    Workflow(String),
}

impl AgentError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            AgentError::Validation(_) => ErrorCategory::InvalidParameters,
            AgentError::PermissionDenied(_) => ErrorCategory::PermissionDenied,
            AgentError::Transport(_) => ErrorCategory::Network,
            AgentError::Cancelled(_) => ErrorCategory::Cancelled,
            AgentError::Tool(_) => ErrorCategory::ExecutionError,
            AgentError::Workflow(_) => ErrorCategory::ExecutionError,
        }
    }
}

pub type Result<T> = std::result::Result<T, AgentError>;
