//! SSE JSON-RPC transport (§4.7): requests travel over HTTP POST, results
//! and heartbeats arrive over a long-lived `text/event-stream` GET that
//! reconnects with exponential backoff.
//!
//! Frame parsing follows the A2A client's streaming consumer
//! (`vtcode-core/src/a2a/client.rs`'s `parse_sse_event`/double-newline
//! framing), generalised to recognise an `event:` line and treat a
//! `heartbeat` event as liveness-only.

use super::jsonrpc::{JsonRpcRequest, JsonRpcResponse};
use super::pending::PendingTracker;
use super::Transport;
use crate::context::CancelToken;
use crate::error::AgentError;
use async_trait::async_trait;
use futures::StreamExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_millis(500);
const DEFAULT_MAX_RECONNECT_MULTIPLIER: u32 = 8;
const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);
const DEFAULT_HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(30);

struct SseFrame {
    event: Option<String>,
    data: String,
}

/// Splits a buffer on blank-line-delimited frames, returning any complete
/// frames found and leaving the remainder in `buf`.
fn drain_frames(buf: &mut String) -> Vec<SseFrame> {
    let mut frames = Vec::new();
    while let Some(pos) = buf.find("\n\n") {
        let raw: String = buf.drain(..pos + 2).collect();
        let mut event = None;
        let mut data_lines = Vec::new();
        for line in raw.lines() {
            if line.starts_with(':') || line.is_empty() {
                continue;
            }
            if let Some(rest) = line.strip_prefix("event:") {
                event = Some(rest.trim().to_string());
            } else if let Some(rest) = line.strip_prefix("data:") {
                data_lines.push(rest.trim().to_string());
            }
        }
        if !data_lines.is_empty() || event.is_some() {
            frames.push(SseFrame {
                event,
                data: data_lines.join("\n"),
            });
        }
    }
    frames
}

pub struct SseTransport {
    http: reqwest::Client,
    rpc_url: String,
    events_url: String,
    tracker: Arc<PendingTracker>,
    ready: Notify,
    connected: AtomicBool,
    shutdown: CancelToken,
    force_reconnect: Arc<Notify>,
    last_heartbeat: std::sync::Mutex<Instant>,
}

impl SseTransport {
    pub fn spawn(rpc_url: impl Into<String>, events_url: impl Into<String>) -> Arc<Self> {
        let transport = Arc::new(Self {
            http: reqwest::Client::new(),
            rpc_url: rpc_url.into(),
            events_url: events_url.into(),
            tracker: Arc::new(PendingTracker::new()),
            ready: Notify::new(),
            connected: AtomicBool::new(false),
            shutdown: CancelToken::new(),
            force_reconnect: Arc::new(Notify::new()),
            last_heartbeat: std::sync::Mutex::new(Instant::now()),
        });

        tokio::spawn(Self::consume_loop(transport.clone()));
        tokio::spawn(Self::heartbeat_ticker(transport.clone()));
        transport
    }

    async fn consume_loop(self_: Arc<Self>) {
        let mut backoff = DEFAULT_RECONNECT_INTERVAL;
        let max_backoff = DEFAULT_RECONNECT_INTERVAL * DEFAULT_MAX_RECONNECT_MULTIPLIER;

        while !self_.shutdown.is_cancelled() {
            let response = self_
                .http
                .get(&self_.events_url)
                .header("accept", "text/event-stream")
                .send()
                .await;

            let response = match response {
                Ok(r) if r.status().is_success() => r,
                _ => {
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(max_backoff);
                    continue;
                }
            };

            self_.connected.store(true, Ordering::SeqCst);
            self_.ready.notify_waiters();
            *self_.last_heartbeat.lock().unwrap() = Instant::now();
            backoff = DEFAULT_RECONNECT_INTERVAL;

            let mut stream = response.bytes_stream();
            let mut buffer = String::new();
            loop {
                tokio::select! {
                    _ = self_.force_reconnect.notified() => break,
                    chunk = stream.next() => {
                        match chunk {
                            Some(Ok(bytes)) => {
                                buffer.push_str(&String::from_utf8_lossy(&bytes));
                                for frame in drain_frames(&mut buffer) {
                                    self_.handle_frame(frame).await;
                                }
                            }
                            _ => break,
                        }
                    }
                }
            }

            self_.connected.store(false, Ordering::SeqCst);
            self_
                .tracker
                .fail_all("sse stream disconnected, reconnecting")
                .await;
            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(max_backoff);
        }
    }

    async fn handle_frame(&self, frame: SseFrame) {
        if frame.event.as_deref() == Some("heartbeat") {
            *self.last_heartbeat.lock().unwrap() = Instant::now();
            return;
        }
        if let Ok(response) = serde_json::from_str::<JsonRpcResponse>(&frame.data) {
            if let Some(id) = &response.id {
                self.tracker.deliver(&id.to_string(), Ok(response)).await;
            }
        }
    }

    async fn heartbeat_ticker(self_: Arc<Self>) {
        loop {
            tokio::time::sleep(DEFAULT_HEARTBEAT_INTERVAL).await;
            if self_.shutdown.is_cancelled() {
                break;
            }
            let elapsed = self_.last_heartbeat.lock().unwrap().elapsed();
            if elapsed > DEFAULT_HEARTBEAT_TIMEOUT {
                self_.force_reconnect.notify_waiters();
            }
        }
    }
}

#[async_trait]
impl Transport for SseTransport {
    async fn call(&self, ctx: &CancelToken, request: JsonRpcRequest) -> Result<JsonRpcResponse, AgentError> {
        if !self.connected.load(Ordering::SeqCst) {
            tokio::select! {
                _ = self.ready.notified() => {}
                _ = ctx.cancelled() => return Err(AgentError::Cancelled("cancelled while waiting for sse stream".to_string())),
            }
        }

        let id = request
            .id
            .clone()
            .ok_or_else(|| AgentError::Validation("sse call requires an id".to_string()))?;
        let rx = self.tracker.add(id.to_string()).await?;

        let response = self
            .http
            .post(&self.rpc_url)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| AgentError::Transport(format!("rpc post failed: {e}")))?;

        if response.status().as_u16() >= 300 {
            self.tracker.cancel(&id.to_string()).await;
            let body: String = response.text().await.unwrap_or_default();
            let truncated: String = body.chars().take(512).collect();
            return Err(AgentError::Transport(format!("rpc post failed with status: {truncated}")));
        }

        tokio::select! {
            result = rx => result.map_err(|_| AgentError::Transport("transport closed before a response arrived".to_string()))?,
            _ = ctx.cancelled() => {
                self.tracker.cancel(&id.to_string()).await;
                Err(AgentError::Cancelled("sse call cancelled".to_string()))
            }
        }
    }

    async fn close(&self) {
        self.shutdown.cancel();
        self.force_reconnect.notify_waiters();
        self.tracker.fail_all("transport closed").await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_frames_splits_on_blank_lines() {
        let mut buffer = "event: heartbeat\ndata: \n\ndata: {\"jsonrpc\":\"2.0\"}\n\n".to_string();
        let frames = drain_frames(&mut buffer);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].event.as_deref(), Some("heartbeat"));
        assert_eq!(frames[1].data, "{\"jsonrpc\":\"2.0\"}");
        assert!(buffer.is_empty());
    }

    #[test]
    fn comment_lines_are_ignored() {
        let mut buffer = ": this is a comment\ndata: payload\n\n".to_string();
        let frames = drain_frames(&mut buffer);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data, "payload");
    }

    #[test]
    fn incomplete_frame_is_left_in_the_buffer() {
        let mut buffer = "data: partial".to_string();
        let frames = drain_frames(&mut buffer);
        assert!(frames.is_empty());
        assert_eq!(buffer, "data: partial");
    }
}
