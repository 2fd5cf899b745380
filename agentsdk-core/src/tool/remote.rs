//! Wrapper that makes a tool hosted behind a remote-tool transport (§4.7)
//! look like any other locally-registered `Tool`.

use super::descriptor::{Params, ToolDescriptor};
use super::result::ToolResult;
use crate::context::CancelToken;
use crate::error::AgentError;
use async_trait::async_trait;
use std::sync::{Arc, Weak};

/// What a remote tool needs from its transport: invoke a named tool on the
/// remote server and get back a result. Implemented by the JSON-RPC
/// transport client in `crate::transport`.
#[async_trait]
pub trait RemoteToolTransport: Send + Sync {
    async fn call_tool(
        &self,
        name: &str,
        params: &Params,
        ctx: &CancelToken,
    ) -> Result<ToolResult, AgentError>;
}

/// A tool proxy backed by a remote server connection.
///
/// Holds a `Weak` reference to the transport (§9: "remote tools keep only a
/// weak back-reference to their server session") so a closed/dropped
/// session doesn't keep the registry entry pinned in memory; invocation
/// after the session is gone fails with a transport error rather than a
/// panic.
pub struct RemoteTool {
    descriptor: ToolDescriptor,
    transport: Weak<dyn RemoteToolTransport>,
}

impl RemoteTool {
    pub fn new(descriptor: ToolDescriptor, transport: &Arc<dyn RemoteToolTransport>) -> Self {
        Self {
            descriptor,
            transport: Arc::downgrade(transport),
        }
    }
}

#[async_trait]
impl super::Tool for RemoteTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn execute(&self, ctx: &CancelToken, params: &Params) -> Result<ToolResult, AgentError> {
        let transport = self.transport.upgrade().ok_or_else(|| {
            AgentError::Transport(format!(
                "remote server for tool '{}' is no longer connected",
                self.descriptor.name
            ))
        })?;
        transport.call_tool(&self.descriptor.name, params, ctx).await
    }
}
