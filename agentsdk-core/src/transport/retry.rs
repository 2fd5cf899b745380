//! Retry wrapper (§4.7): re-attempts a transport call on retriable
//! errors with exponential backoff, checking the caller's cancellation
//! before every attempt.

use super::jsonrpc::{JsonRpcRequest, JsonRpcResponse};
use super::Transport;
use crate::context::CancelToken;
use crate::error::AgentError;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Default policy (§4.7): 3 attempts, `50ms * 2^(n-2)` backoff starting at
/// attempt 2, retries transport errors, never retries a cancelled context.
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Arc<dyn Fn(u32) -> Duration + Send + Sync>,
    pub retryable: Arc<dyn Fn(&AgentError) -> bool + Send + Sync>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Arc::new(|attempt| {
                let exponent = attempt.saturating_sub(2);
                Duration::from_millis(50 * 2u64.pow(exponent))
            }),
            retryable: Arc::new(|err| matches!(err, AgentError::Transport(_))),
        }
    }
}

pub struct RetryTransport {
    inner: Arc<dyn Transport>,
    policy: RetryPolicy,
}

impl RetryTransport {
    pub fn new(inner: Arc<dyn Transport>) -> Self {
        Self {
            inner,
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }
}

#[async_trait]
impl Transport for RetryTransport {
    async fn call(&self, ctx: &CancelToken, request: JsonRpcRequest) -> Result<JsonRpcResponse, AgentError> {
        let mut attempt = 1;
        loop {
            if ctx.is_cancelled() {
                return Err(AgentError::Cancelled("retry wrapper observed a cancelled context".to_string()));
            }

            match self.inner.call(ctx, request.clone()).await {
                Ok(response) => return Ok(response),
                Err(err) => {
                    if attempt >= self.policy.max_attempts || !(self.policy.retryable)(&err) {
                        return Err(err);
                    }
                    tokio::time::sleep((self.policy.backoff)(attempt + 1)).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn close(&self) {
        self.inner.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::jsonrpc::JsonRpcId;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyTransport {
        failures_remaining: AtomicU32,
    }

    #[async_trait]
    impl Transport for FlakyTransport {
        async fn call(&self, _ctx: &CancelToken, request: JsonRpcRequest) -> Result<JsonRpcResponse, AgentError> {
            if self.failures_remaining.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                if n > 0 { Some(n - 1) } else { None }
            }).is_ok() {
                return Err(AgentError::Transport("flaky".to_string()));
            }
            Ok(JsonRpcResponse {
                jsonrpc: "2.0".to_string(),
                result: Some(serde_json::Value::Null),
                error: None,
                id: request.id,
            })
        }

        async fn close(&self) {}
    }

    fn request() -> JsonRpcRequest {
        JsonRpcRequest::new("ping", None, JsonRpcId::string("1"))
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures_within_budget() {
        let retry = RetryTransport::new(Arc::new(FlakyTransport {
            failures_remaining: AtomicU32::new(2),
        }))
        .with_policy(RetryPolicy {
            backoff: Arc::new(|_| Duration::from_millis(1)),
            ..RetryPolicy::default()
        });
        let cancel = CancelToken::new();
        let response = retry.call(&cancel, request()).await.unwrap();
        assert!(response.is_success());
    }

    #[tokio::test]
    async fn exhausting_attempts_surfaces_the_last_error() {
        let retry = RetryTransport::new(Arc::new(FlakyTransport {
            failures_remaining: AtomicU32::new(10),
        }))
        .with_policy(RetryPolicy {
            backoff: Arc::new(|_| Duration::from_millis(1)),
            ..RetryPolicy::default()
        });
        let cancel = CancelToken::new();
        let err = retry.call(&cancel, request()).await.unwrap_err();
        assert!(matches!(err, AgentError::Transport(_)));
    }

    #[tokio::test]
    async fn cancelled_context_is_never_retried() {
        let retry = RetryTransport::new(Arc::new(FlakyTransport {
            failures_remaining: AtomicU32::new(10),
        }));
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = retry.call(&cancel, request()).await.unwrap_err();
        assert!(matches!(err, AgentError::Cancelled(_)));
    }
}
