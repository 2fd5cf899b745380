//! stdio JSON-RPC transport (§4.7): spawns a child process, decodes one
//! newline-delimited JSON-RPC response per line of its stdout, and
//! converts process exit into a tracker-wide failure.
//!
//! Grounded on the process-group spawn/terminate discipline in
//! `agentsdk-exec/src/pipe.rs`, adapted for line-framed JSON-RPC rather
//! than raw byte streaming.

use super::jsonrpc::{JsonRpcRequest, JsonRpcResponse};
use super::pending::PendingTracker;
use super::Transport;
use crate::context::CancelToken;
use crate::error::AgentError;
use async_trait::async_trait;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin};
use tokio::sync::Mutex;

pub struct StdioTransport {
    tracker: Arc<PendingTracker>,
    stdin: Mutex<Option<ChildStdin>>,
    child: Mutex<Option<Child>>,
}

impl StdioTransport {
    /// Spawns `program args...`, wiring its stdout to the tracker and its
    /// stderr into the failure message reported when the process exits.
    pub async fn spawn(program: &str, args: &[String]) -> Result<Arc<Self>, AgentError> {
        let mut child = tokio::process::Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| AgentError::Transport(format!("failed to spawn '{program}': {e}")))?;

        let stdin = child.stdin.take().expect("piped stdin");
        let stdout = child.stdout.take().expect("piped stdout");
        let stderr = child.stderr.take().expect("piped stderr");

        let tracker = Arc::new(PendingTracker::new());
        let transport = Arc::new(Self {
            tracker: tracker.clone(),
            stdin: Mutex::new(Some(stdin)),
            child: Mutex::new(Some(child)),
        });

        tokio::spawn(Self::read_responses(stdout, tracker.clone()));
        tokio::spawn(Self::wait_for_exit(transport.clone(), stderr));

        Ok(transport)
    }

    async fn read_responses<R>(stdout: R, tracker: Arc<PendingTracker>)
    where
        R: tokio::io::AsyncRead + Unpin,
    {
        let mut lines = BufReader::new(stdout).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<JsonRpcResponse>(&line) {
                        Ok(response) => {
                            if let Some(id) = &response.id {
                                tracker.deliver(&id.to_string(), Ok(response)).await;
                            }
                        }
                        Err(_) => continue,
                    }
                }
                Ok(None) => break,
                Err(_) => break,
            }
        }
    }

    async fn wait_for_exit<R>(self_: Arc<Self>, mut stderr: R)
    where
        R: tokio::io::AsyncRead + Unpin,
    {
        let mut captured = String::new();
        let _ = tokio::io::AsyncReadExt::read_to_string(&mut stderr, &mut captured).await;

        let mut guard = self_.child.lock().await;
        if let Some(child) = guard.as_mut() {
            let _ = child.wait().await;
        }
        drop(guard);

        let message = if captured.trim().is_empty() {
            "subprocess exited".to_string()
        } else {
            format!("subprocess exited: {}", captured.trim())
        };
        self_.tracker.fail_all(&message).await;
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn call(&self, ctx: &CancelToken, request: JsonRpcRequest) -> Result<JsonRpcResponse, AgentError> {
        let id = request
            .id
            .clone()
            .ok_or_else(|| AgentError::Validation("stdio call requires an id".to_string()))?;
        let rx = self.tracker.add(id.to_string()).await?;

        let mut payload = serde_json::to_vec(&request)
            .map_err(|e| AgentError::Transport(format!("failed to encode request: {e}")))?;
        payload.push(b'\n');

        {
            let mut guard = self.stdin.lock().await;
            let stdin = guard
                .as_mut()
                .ok_or_else(|| AgentError::Transport("stdio transport is closed".to_string()))?;
            if let Err(e) = stdin.write_all(&payload).await {
                return Err(AgentError::Transport(format!("failed to write request: {e}")));
            }
        }

        tokio::select! {
            result = rx => result.map_err(|_| AgentError::Transport("transport closed before a response arrived".to_string()))?,
            _ = ctx.cancelled() => {
                self.tracker.cancel(&id.to_string()).await;
                Err(AgentError::Cancelled("stdio call cancelled".to_string()))
            }
        }
    }

    async fn close(&self) {
        self.stdin.lock().await.take();
        if let Some(mut child) = self.child.lock().await.take() {
            let _ = child.kill().await;
        }
        self.tracker.fail_all("transport closed").await;
    }
}
