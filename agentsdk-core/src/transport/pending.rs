//! The pending-call tracker (§4.7): maps a JSON-RPC id to a one-shot
//! delivery channel. The tracker exclusively owns the channel; callers
//! hold a receive-only view until a response or cancellation arrives.

use super::jsonrpc::JsonRpcResponse;
use crate::error::AgentError;
use std::collections::HashMap;
use tokio::sync::{oneshot, Mutex};

pub type PendingResult = Result<JsonRpcResponse, AgentError>;

pub struct PendingTracker {
    entries: Mutex<HashMap<String, oneshot::Sender<PendingResult>>>,
}

impl Default for PendingTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingTracker {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Registers a new pending call, returning its receiver. Fails if the
    /// id is already pending.
    pub async fn add(&self, id: String) -> Result<oneshot::Receiver<PendingResult>, AgentError> {
        let (tx, rx) = oneshot::channel();
        let mut entries = self.entries.lock().await;
        if entries.contains_key(&id) {
            return Err(AgentError::Transport(format!("duplicate pending call id '{id}'")));
        }
        entries.insert(id, tx);
        Ok(rx)
    }

    /// Delivers a result and removes the entry. Returns `false` if no
    /// entry (or an already-closed receiver) was found for the id.
    pub async fn deliver(&self, id: &str, result: PendingResult) -> bool {
        let sender = self.entries.lock().await.remove(id);
        match sender {
            Some(tx) => tx.send(result).is_ok(),
            None => false,
        }
    }

    /// Removes an entry without delivering a result (the receiver observes
    /// a closed channel).
    pub async fn cancel(&self, id: &str) {
        self.entries.lock().await.remove(id);
    }

    /// Closes every pending entry with the same transport error.
    pub async fn fail_all(&self, message: &str) {
        let mut entries = self.entries.lock().await;
        for (_, tx) in entries.drain() {
            let _ = tx.send(Err(AgentError::Transport(message.to_string())));
        }
    }
}
