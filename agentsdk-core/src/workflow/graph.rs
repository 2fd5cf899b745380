//! The workflow graph data model (§4.5): action/decision/parallel nodes
//! joined by predicated transitions.

use super::context::ExecutionContext;
use crate::error::AgentError;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::Arc;

pub type ActionFn =
    Arc<dyn Fn(Arc<ExecutionContext>) -> BoxFuture<'static, Result<(), AgentError>> + Send + Sync>;
pub type DecisionFn = Arc<
    dyn Fn(Arc<ExecutionContext>) -> BoxFuture<'static, Result<String, AgentError>> + Send + Sync,
>;
pub type PredicateFn =
    Arc<dyn Fn(Arc<ExecutionContext>) -> BoxFuture<'static, Result<bool, AgentError>> + Send + Sync>;

pub enum NodeKind {
    Action(ActionFn),
    Decision(DecisionFn),
    /// Fixed list of branch node names to run concurrently.
    Parallel(Vec<String>),
}

pub struct Node {
    pub name: String,
    pub kind: NodeKind,
}

/// An outgoing edge from an action node. `predicate` absent means
/// unconditionally true (§4.5: "A missing predicate is unconditionally
/// true").
pub struct Transition {
    pub to: String,
    pub predicate: Option<PredicateFn>,
}

#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("graph is closed; no further structural changes are allowed")]
    Closed,
    #[error("node '{0}' already exists")]
    DuplicateNode(String),
    #[error("start node '{0}' is not defined")]
    UnknownStart(String),
    #[error("transition from '{0}' targets unknown node '{1}'")]
    UnknownTransitionTarget(String, String),
    #[error("parallel node '{0}' references unknown branch '{1}'")]
    UnknownBranch(String, String),
    #[error("graph has no start node")]
    MissingStart,
}

impl From<GraphError> for AgentError {
    fn from(err: GraphError) -> Self {
        AgentError::Workflow(err.to_string())
    }
}

/// A graph is mutable while building, then `close()` freezes it; further
/// structural calls fail (§3 lifecycle note).
pub struct Graph {
    nodes: HashMap<String, Node>,
    transitions: HashMap<String, Vec<Transition>>,
    start: Option<String>,
    closed: bool,
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl Graph {
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            transitions: HashMap::new(),
            start: None,
            closed: false,
        }
    }

    fn ensure_open(&self) -> Result<(), GraphError> {
        if self.closed {
            return Err(GraphError::Closed);
        }
        Ok(())
    }

    pub fn add_node(&mut self, node: Node) -> Result<(), GraphError> {
        self.ensure_open()?;
        if self.nodes.contains_key(&node.name) {
            return Err(GraphError::DuplicateNode(node.name));
        }
        self.nodes.insert(node.name.clone(), node);
        Ok(())
    }

    pub fn add_transition(&mut self, from: impl Into<String>, transition: Transition) -> Result<(), GraphError> {
        self.ensure_open()?;
        self.transitions.entry(from.into()).or_default().push(transition);
        Ok(())
    }

    pub fn set_start(&mut self, name: impl Into<String>) -> Result<(), GraphError> {
        self.ensure_open()?;
        self.start = Some(name.into());
        Ok(())
    }

    pub fn start(&self) -> Option<&str> {
        self.start.as_deref()
    }

    pub fn node(&self, name: &str) -> Option<&Node> {
        self.nodes.get(name)
    }

    pub fn transitions_from(&self, name: &str) -> &[Transition] {
        self.transitions.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Check structural consistency: a start node is set and exists, every
    /// transition target exists, and every parallel branch name exists.
    pub fn validate(&self) -> Result<(), GraphError> {
        let start = self.start.as_ref().ok_or(GraphError::MissingStart)?;
        if !self.nodes.contains_key(start) {
            return Err(GraphError::UnknownStart(start.clone()));
        }
        for (from, edges) in &self.transitions {
            for edge in edges {
                if !self.nodes.contains_key(&edge.to) {
                    return Err(GraphError::UnknownTransitionTarget(from.clone(), edge.to.clone()));
                }
            }
        }
        for node in self.nodes.values() {
            if let NodeKind::Parallel(branches) = &node.kind {
                for branch in branches {
                    if !self.nodes.contains_key(branch) {
                        return Err(GraphError::UnknownBranch(node.name.clone(), branch.clone()));
                    }
                }
            }
        }
        Ok(())
    }

    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop_action() -> ActionFn {
        Arc::new(|_ctx| Box::pin(async { Ok(()) }))
    }

    #[test]
    fn validate_requires_start_node() {
        let mut graph = Graph::new();
        graph
            .add_node(Node {
                name: "a".to_string(),
                kind: NodeKind::Action(noop_action()),
            })
            .unwrap();
        assert!(matches!(graph.validate(), Err(GraphError::MissingStart)));
    }

    #[test]
    fn validate_rejects_unknown_transition_target() {
        let mut graph = Graph::new();
        graph
            .add_node(Node {
                name: "a".to_string(),
                kind: NodeKind::Action(noop_action()),
            })
            .unwrap();
        graph.set_start("a").unwrap();
        graph
            .add_transition(
                "a",
                Transition {
                    to: "missing".to_string(),
                    predicate: None,
                },
            )
            .unwrap();
        assert!(matches!(
            graph.validate(),
            Err(GraphError::UnknownTransitionTarget(_, _))
        ));
    }

    #[test]
    fn closed_graph_rejects_structural_changes() {
        let mut graph = Graph::new();
        graph.close();
        let err = graph
            .add_node(Node {
                name: "a".to_string(),
                kind: NodeKind::Action(noop_action()),
            })
            .unwrap_err();
        assert!(matches!(err, GraphError::Closed));
    }

    #[test]
    fn duplicate_node_name_is_rejected() {
        let mut graph = Graph::new();
        graph
            .add_node(Node {
                name: "a".to_string(),
                kind: NodeKind::Action(noop_action()),
            })
            .unwrap();
        let err = graph
            .add_node(Node {
                name: "a".to_string(),
                kind: NodeKind::Action(noop_action()),
            })
            .unwrap_err();
        assert!(matches!(err, GraphError::DuplicateNode(_)));
    }
}
