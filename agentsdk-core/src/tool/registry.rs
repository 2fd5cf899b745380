//! The tool registry (§4.1): a concurrent name→tool map plus the shared
//! parameter validator every executor invocation consults.
//!
//! Modeled on the `RwLock<HashMap<..>>` registries scattered across the
//! teacher's `tools/*` modules: reads (the common case, one per call) take
//! a shared lock, writes (registration, which happens at startup or when a
//! remote server connects) take an exclusive one.

use super::descriptor::ToolDescriptor;
use super::mcp::McpSession;
use super::remote::RemoteTool;
use super::validator::{SchemaValidator, Validator};
use super::Tool;
use crate::context::CancelToken;
use crate::error::AgentError;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

pub struct ToolRegistry {
    tools: RwLock<HashMap<String, Arc<dyn Tool>>>,
    validator: RwLock<Arc<dyn Validator>>,
    closed: RwLock<bool>,
    /// Remote server sessions opened by `register_remote_server`, tracked
    /// for best-effort cleanup in `close()`.
    sessions: RwLock<Vec<Arc<McpSession>>>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: RwLock::new(HashMap::new()),
            validator: RwLock::new(Arc::new(SchemaValidator)),
            closed: RwLock::new(false),
            sessions: RwLock::new(Vec::new()),
        }
    }

    fn ensure_open(&self) -> Result<(), AgentError> {
        if *self.closed.read() {
            return Err(AgentError::Tool("tool registry is closed".to_string()));
        }
        Ok(())
    }

    /// Fails if the tool's name is empty or already registered (§4.1).
    pub fn register(&self, tool: Arc<dyn Tool>) -> Result<(), AgentError> {
        self.ensure_open()?;
        let name = tool.descriptor().name.clone();
        if name.is_empty() {
            return Err(AgentError::Tool("tool name must not be empty".to_string()));
        }
        let mut tools = self.tools.write();
        if tools.contains_key(&name) {
            return Err(AgentError::Tool(format!("tool already registered: {name}")));
        }
        tools.insert(name, tool);
        Ok(())
    }

    /// Connects to an MCP-style JSON-RPC server per the §6 transport spec
    /// grammar, enumerates its tools, and registers each as a `RemoteTool`.
    /// When `namespace_prefix` is non-empty, registered names become
    /// `prefix__originalName`. Every name is checked against the local and
    /// already-registered-remote entries before anything is inserted;
    /// failure at any step closes the newly-opened session without
    /// registering a partial tool set.
    pub async fn register_remote_server(
        &self,
        ctx: &CancelToken,
        spec: &str,
        namespace_prefix: &str,
    ) -> Result<(), AgentError> {
        self.ensure_open()?;

        let session = McpSession::connect(spec).await?;
        let descriptors = match session.list_tools(ctx).await {
            Ok(descriptors) => descriptors,
            Err(err) => {
                session.close().await;
                return Err(err);
            }
        };

        let namespaced: Vec<ToolDescriptor> = descriptors
            .into_iter()
            .map(|descriptor| {
                if namespace_prefix.is_empty() {
                    descriptor
                } else {
                    let name = format!("{namespace_prefix}__{}", descriptor.name);
                    ToolDescriptor { name, ..descriptor }
                }
            })
            .collect();

        {
            let tools = self.tools.read();
            for descriptor in &namespaced {
                if tools.contains_key(&descriptor.name) {
                    drop(tools);
                    session.close().await;
                    return Err(AgentError::Tool(format!(
                        "remote tool name collides with an existing entry: {}",
                        descriptor.name
                    )));
                }
            }
        }

        let transport: Arc<dyn super::remote::RemoteToolTransport> = session.clone();
        let mut tools = self.tools.write();
        for descriptor in namespaced {
            let name = descriptor.name.clone();
            tools.insert(name, Arc::new(RemoteTool::new(descriptor, &transport)));
        }
        drop(tools);

        self.sessions.write().push(session);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.read().get(name).cloned()
    }

    /// Look up several names at once, preserving order and using `None`
    /// for names that aren't registered.
    pub fn get_many(&self, names: &[String]) -> Vec<Option<Arc<dyn Tool>>> {
        let tools = self.tools.read();
        names.iter().map(|n| tools.get(n).cloned()).collect()
    }

    pub fn list(&self) -> Vec<ToolDescriptor> {
        self.tools
            .read()
            .values()
            .map(|t| t.descriptor().clone())
            .collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.read().keys().cloned().collect()
    }

    pub fn set_validator(&self, validator: Arc<dyn Validator>) {
        *self.validator.write() = validator;
    }

    pub fn validator(&self) -> Arc<dyn Validator> {
        self.validator.read().clone()
    }

    /// Drop every registered tool and reject further registration or
    /// lookup, then best-effort close every tracked remote session (§4.1).
    pub async fn close(&self) {
        *self.closed.write() = true;
        self.tools.write().clear();
        let sessions = std::mem::take(&mut *self.sessions.write());
        for session in sessions {
            session.close().await;
            tracing::debug!("closed remote tool session");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::CancelToken;
    use crate::tool::descriptor::Params;
    use crate::tool::result::ToolResult;
    use async_trait::async_trait;

    struct Echo(ToolDescriptor);

    #[async_trait]
    impl Tool for Echo {
        fn descriptor(&self) -> &ToolDescriptor {
            &self.0
        }
        async fn execute(&self, _ctx: &CancelToken, _params: &Params) -> Result<ToolResult, AgentError> {
            Ok(ToolResult::success("ok"))
        }
    }

    #[test]
    fn register_and_get_round_trips() {
        let registry = ToolRegistry::new();
        registry
            .register(Arc::new(Echo(ToolDescriptor::new("echo", "echoes input"))))
            .unwrap();
        assert!(registry.get("echo").is_some());
        assert!(registry.get("missing").is_none());
        assert_eq!(registry.names(), vec!["echo".to_string()]);
    }

    #[tokio::test]
    async fn closed_registry_rejects_register() {
        let registry = ToolRegistry::new();
        registry.close().await;
        let err = registry
            .register(Arc::new(Echo(ToolDescriptor::new("echo", "echoes input"))))
            .unwrap_err();
        assert!(matches!(err, AgentError::Tool(_)));
    }

    #[test]
    fn get_many_preserves_order_and_misses() {
        let registry = ToolRegistry::new();
        registry
            .register(Arc::new(Echo(ToolDescriptor::new("a", "a"))))
            .unwrap();
        let results = registry.get_many(&["a".to_string(), "b".to_string()]);
        assert!(results[0].is_some());
        assert!(results[1].is_none());
    }

    #[test]
    fn register_rejects_an_empty_name() {
        let registry = ToolRegistry::new();
        let err = registry
            .register(Arc::new(Echo(ToolDescriptor::new("", "no name"))))
            .unwrap_err();
        assert!(matches!(err, AgentError::Tool(_)));
    }

    #[test]
    fn register_rejects_a_duplicate_name() {
        let registry = ToolRegistry::new();
        registry
            .register(Arc::new(Echo(ToolDescriptor::new("echo", "first"))))
            .unwrap();
        let err = registry
            .register(Arc::new(Echo(ToolDescriptor::new("echo", "second"))))
            .unwrap_err();
        assert!(matches!(err, AgentError::Tool(_)));
        assert_eq!(registry.get("echo").unwrap().descriptor().description, "first");
    }

    #[tokio::test]
    async fn register_remote_server_rejects_a_name_collision() {
        let registry = ToolRegistry::new();
        registry
            .register(Arc::new(Echo(ToolDescriptor::new("remote__search", "local"))))
            .unwrap();
        let ctx = CancelToken::new();
        let err = registry
            .register_remote_server(&ctx, "unsupported://host", "remote")
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Validation(_)));
    }
}
