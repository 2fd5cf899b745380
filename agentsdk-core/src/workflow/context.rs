//! Workflow execution context: the per-run cancellation token, shared
//! key/value data bag and tool registry handle middleware and node bodies
//! read and write.

use crate::context::CancelToken;
use crate::tool::ToolRegistry;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

pub struct ExecutionContext {
    pub cancel: CancelToken,
    pub tools: Arc<ToolRegistry>,
    data: Arc<RwLock<HashMap<String, Value>>>,
}

impl ExecutionContext {
    pub fn new(tools: Arc<ToolRegistry>) -> Self {
        Self {
            cancel: CancelToken::new(),
            tools,
            data: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn with_initial_data(tools: Arc<ToolRegistry>, data: HashMap<String, Value>) -> Self {
        Self {
            cancel: CancelToken::new(),
            tools,
            data: Arc::new(RwLock::new(data)),
        }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.data.read().get(key).cloned()
    }

    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.data.write().insert(key.into(), value);
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.data.write().remove(key)
    }

    /// Snapshot of every key/value pair currently in the context.
    pub fn snapshot(&self) -> HashMap<String, Value> {
        self.data.read().clone()
    }

    /// Derive a child context for a parallel branch: a new cancellation
    /// token tied to this context's (so canceling the parent cancels the
    /// branch) sharing the same underlying data map and tool registry, so
    /// sibling branches can communicate through `ctx.set(...)` (§3: "an
    /// execution context lives for one workflow run; middleware may store
    /// arbitrary values under agreed keys").
    pub fn with_context(&self) -> Arc<ExecutionContext> {
        Arc::new(ExecutionContext {
            cancel: self.cancel.child(),
            tools: self.tools.clone(),
            data: self.data.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn with_context_shares_data_with_the_parent() {
        let ctx = ExecutionContext::new(Arc::new(ToolRegistry::new()));
        let branch = ctx.with_context();
        branch.set("shared", Value::from("from branch"));
        assert_eq!(ctx.get("shared"), Some(Value::from("from branch")));
    }

    #[tokio::test]
    async fn with_context_children_observe_each_other() {
        let ctx = ExecutionContext::new(Arc::new(ToolRegistry::new()));
        let a = ctx.with_context();
        let b = ctx.with_context();
        a.set("k", Value::from(1));
        assert_eq!(b.get("k"), Some(Value::from(1)));
    }
}
