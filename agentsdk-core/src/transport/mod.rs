//! The remote tool transport (§4.7): JSON-RPC over stdio subprocesses or
//! server-sent events, with a shared pending-call tracker and a retry
//! wrapper.

pub mod jsonrpc;
pub mod pending;
pub mod retry;
pub mod sse;
pub mod stdio;

pub use jsonrpc::{JsonRpcError, JsonRpcId, JsonRpcRequest, JsonRpcResponse};
pub use pending::PendingTracker;
pub use retry::{RetryPolicy, RetryTransport};
pub use sse::SseTransport;
pub use stdio::StdioTransport;

use crate::context::CancelToken;
use crate::error::AgentError;
use async_trait::async_trait;

/// `call` sends one request and awaits its matching response; `close` is
/// idempotent and fails every outstanding pending call.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn call(&self, ctx: &CancelToken, request: JsonRpcRequest) -> Result<JsonRpcResponse, AgentError>;
    async fn close(&self);
}
