//! Executor input/output value types: `Call` and `CallResult`.

use super::descriptor::Params;
use super::result::ToolResult;
use crate::error::AgentError;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;

/// Callback invoked once per output chunk when a tool streams.
/// `is_stderr` distinguishes stderr chunks from stdout/ordinary chunks.
pub type StreamSink = Arc<dyn Fn(&[u8], bool) + Send + Sync>;

/// Input to the executor.
#[derive(Clone)]
pub struct Call {
    pub name: String,
    pub params: Params,
    pub path: Option<PathBuf>,
    pub session_id: Option<String>,
    pub stream_sink: Option<StreamSink>,
}

impl Call {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Params::new(),
            path: None,
            session_id: None,
            stream_sink: None,
        }
    }

    pub fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    pub fn with_path(mut self, path: PathBuf) -> Self {
        self.path = Some(path);
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_stream_sink(mut self, sink: StreamSink) -> Self {
        self.stream_sink = Some(sink);
        self
    }

    /// Deep-clone the parameter map so a tool invocation cannot mutate the
    /// caller's copy (§4.4 step 5). `serde_json::Value::clone` already
    /// performs a structural clone of maps/arrays; scalars are shared by
    /// value, matching the spec's "scalars shared" wording.
    pub fn cloned_params(&self) -> Params {
        self.params.clone()
    }
}

/// Outcome of a single executor invocation.
#[derive(Debug, Clone)]
pub struct CallResult {
    pub call_name: String,
    pub result: Option<ToolResult>,
    pub error: Option<Arc<AgentError>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl CallResult {
    pub fn duration(&self) -> chrono::Duration {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => end - start,
            _ => chrono::Duration::zero(),
        }
    }
}
