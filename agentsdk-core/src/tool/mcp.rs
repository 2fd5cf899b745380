//! MCP-style remote tool server sessions (§4.1, §4.7, §6): parses the
//! transport spec string `register_remote_server` accepts, connects, and
//! adapts the JSON-RPC transport to `RemoteToolTransport` via the
//! `tools/list`/`tools/call` methods.
//!
//! The `tools/list` result shape (`{name, description, input_schema}` per
//! entry) follows the MCP `ToolSpec` convention used by
//! `graphweave`'s `tool_source::mcp` module.

use super::descriptor::{ParamSchema, Params, ToolDescriptor};
use super::remote::RemoteToolTransport;
use super::result::ToolResult;
use crate::context::CancelToken;
use crate::error::AgentError;
use crate::transport::{JsonRpcId, JsonRpcRequest, SseTransport, StdioTransport, Transport};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A connected MCP-style server session: owns the underlying JSON-RPC
/// transport and assigns ids for the calls it makes.
pub struct McpSession {
    transport: Arc<dyn Transport>,
    next_id: AtomicU64,
}

impl McpSession {
    /// Connects per the §6 MCP transport spec grammar: `stdio://<cmd>
    /// <args…>` spawns a subprocess; `sse://…`, `http[s]://…`,
    /// `http+sse://…` and `https+streamable://…` all resolve to the SSE
    /// transport (scheme defaults to `https` for a bare `sse://host`); an
    /// empty scheme defaults to stdio.
    pub async fn connect(spec: &str) -> Result<Arc<Self>, AgentError> {
        let transport = connect_transport(spec).await?;
        Ok(Arc::new(Self {
            transport,
            next_id: AtomicU64::new(1),
        }))
    }

    fn next_id(&self) -> JsonRpcId {
        JsonRpcId::string(self.next_id.fetch_add(1, Ordering::SeqCst).to_string())
    }

    /// `tools/list`: enumerate the server's tools.
    pub async fn list_tools(&self, ctx: &CancelToken) -> Result<Vec<ToolDescriptor>, AgentError> {
        let request = JsonRpcRequest::new("tools/list", None, self.next_id());
        let response = self.transport.call(ctx, request).await?;
        if let Some(error) = response.error {
            return Err(AgentError::Transport(format!("tools/list failed: {}", error.message)));
        }
        let result = response
            .result
            .ok_or_else(|| AgentError::Transport("tools/list returned no result".to_string()))?;
        let entries = result.get("tools").cloned().unwrap_or(result);
        let raw: Vec<serde_json::Value> = serde_json::from_value(entries)
            .map_err(|e| AgentError::Transport(format!("malformed tools/list response: {e}")))?;
        raw.into_iter().map(descriptor_from_json).collect()
    }

    pub async fn close(&self) {
        self.transport.close().await;
    }
}

#[async_trait]
impl RemoteToolTransport for McpSession {
    async fn call_tool(
        &self,
        name: &str,
        params: &Params,
        ctx: &CancelToken,
    ) -> Result<ToolResult, AgentError> {
        let request = JsonRpcRequest::new(
            "tools/call",
            Some(serde_json::json!({"name": name, "arguments": params})),
            self.next_id(),
        );
        let response = self.transport.call(ctx, request).await?;
        if let Some(error) = response.error {
            return Err(AgentError::Tool(format!("{name}: {}", error.message)));
        }
        let value = response.result.unwrap_or(serde_json::Value::Null);
        Ok(ToolResult::success(value.to_string()))
    }
}

fn descriptor_from_json(value: serde_json::Value) -> Result<ToolDescriptor, AgentError> {
    let name = value
        .get("name")
        .and_then(|v| v.as_str())
        .ok_or_else(|| AgentError::Transport("remote tool entry missing 'name'".to_string()))?
        .to_string();
    let description = value
        .get("description")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let mut descriptor = ToolDescriptor::new(name, description);
    if let Some(schema_value) = value.get("input_schema").or_else(|| value.get("inputSchema")) {
        if let Ok(schema) = serde_json::from_value::<ParamSchema>(schema_value.clone()) {
            descriptor = descriptor.with_schema(schema);
        }
    }
    Ok(descriptor)
}

async fn connect_transport(spec: &str) -> Result<Arc<dyn Transport>, AgentError> {
    let (scheme, rest) = spec.split_once("://").unwrap_or(("stdio", spec));
    match scheme {
        "" | "stdio" => {
            let mut parts = rest.split_whitespace();
            let cmd = parts
                .next()
                .ok_or_else(|| AgentError::Validation("empty stdio command in transport spec".to_string()))?;
            let args: Vec<String> = parts.map(str::to_string).collect();
            let transport = StdioTransport::spawn(cmd, &args).await?;
            Ok(transport as Arc<dyn Transport>)
        }
        "sse" | "http" | "https" | "http+sse" | "https+streamable" => {
            let base = if scheme == "sse" {
                format!("https://{rest}")
            } else {
                spec.to_string()
            };
            Ok(SseTransport::spawn(base.clone(), base) as Arc<dyn Transport>)
        }
        other => Err(AgentError::Validation(format!("unsupported MCP transport scheme: {other}"))),
    }
}
