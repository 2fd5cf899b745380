//! Tool execution layer: descriptors, the `Tool` trait, the call/result
//! value types, the registry, parameter validation and the remote-tool
//! wrapper (spec.md §4.1).

pub mod call;
pub mod descriptor;
pub mod mcp;
pub mod registry;
pub mod remote;
pub mod result;
pub mod validator;

pub use call::{Call, CallResult, StreamSink};
pub use descriptor::{ParamSchema, Params, PropertySchema, SchemaType, ToolDescriptor};
pub use mcp::McpSession;
pub use registry::ToolRegistry;
pub use remote::RemoteTool;
pub use result::{OutputRef, ToolResult};
pub use validator::{ValidationError, Validator};

use crate::context::CancelToken;
use crate::error::AgentError;
use async_trait::async_trait;

/// A single executable capability. Tools expose a capability set of
/// `{execute, optionally stream_execute}` (§9 "Polymorphic tools"): the
/// executor probes `supports_streaming` only when a caller actually
/// supplied a stream sink, so ordinary tools never need to think about
/// streaming at all.
#[async_trait]
pub trait Tool: Send + Sync {
    fn descriptor(&self) -> &ToolDescriptor;

    async fn execute(&self, ctx: &CancelToken, params: &Params) -> Result<ToolResult, AgentError>;

    /// Whether this tool has a meaningful `stream_execute`. Default `false`
    /// keeps every non-streaming tool's implementation to one method.
    fn supports_streaming(&self) -> bool {
        false
    }

    async fn stream_execute(
        &self,
        ctx: &CancelToken,
        params: &Params,
        sink: StreamSink,
    ) -> Result<ToolResult, AgentError> {
        let _ = sink;
        let _ = ctx;
        let _ = params;
        Err(AgentError::Tool(format!(
            "{} does not support streaming",
            self.descriptor().name
        )))
    }
}
