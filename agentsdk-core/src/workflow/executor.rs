//! The workflow graph executor (§4.5): walks a validated `Graph` from its
//! start node, wrapping each node execution with the registered middleware
//! chain and fanning parallel nodes out into concurrent sub-runs.

use super::context::ExecutionContext;
use super::graph::{Graph, GraphError, Node, NodeKind};
use super::middleware::{Middleware, Step};
use crate::error::AgentError;
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::VecDeque;
use std::sync::Arc;

const DEFAULT_STEP_LIMIT: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraversalStrategy {
    Dfs,
    Bfs,
}

enum NodeOutcome {
    Next(Vec<String>),
}

pub struct WorkflowExecutor {
    graph: Arc<Graph>,
    middlewares: Vec<Arc<dyn Middleware>>,
    strategy: TraversalStrategy,
    step_limit: usize,
    start_override: Option<String>,
}

impl WorkflowExecutor {
    pub fn new(graph: Graph) -> Self {
        Self {
            graph: Arc::new(graph),
            middlewares: Vec::new(),
            strategy: TraversalStrategy::Dfs,
            step_limit: DEFAULT_STEP_LIMIT,
            start_override: None,
        }
    }

    pub fn with_middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middlewares.push(middleware);
        self
    }

    pub fn with_strategy(mut self, strategy: TraversalStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_step_limit(mut self, limit: usize) -> Self {
        self.step_limit = limit;
        self
    }

    pub fn with_start(mut self, name: impl Into<String>) -> Self {
        self.start_override = Some(name.into());
        self
    }

    fn resolve_start(&self) -> Result<String, AgentError> {
        self.start_override
            .clone()
            .or_else(|| self.graph.start().map(String::from))
            .ok_or_else(|| GraphError::MissingStart.into())
    }

    pub async fn run(self: &Arc<Self>, ctx: Arc<ExecutionContext>) -> Result<(), AgentError> {
        self.graph.validate()?;
        let start = self.resolve_start()?;
        self.run_from(ctx, start).await
    }

    fn run_from(
        self: &Arc<Self>,
        ctx: Arc<ExecutionContext>,
        start: String,
    ) -> BoxFuture<'static, Result<(), AgentError>> {
        let this = self.clone();
        Box::pin(async move {
            let mut worklist: VecDeque<String> = VecDeque::new();
            worklist.push_back(start);
            let mut steps = 0usize;

            let pop = |list: &mut VecDeque<String>| match this.strategy {
                TraversalStrategy::Dfs => list.pop_back(),
                TraversalStrategy::Bfs => list.pop_front(),
            };

            while let Some(name) = pop(&mut worklist) {
                if ctx.cancel.is_cancelled() {
                    return Err(AgentError::Cancelled("workflow run cancelled".to_string()));
                }
                steps += 1;
                if steps > this.step_limit {
                    return Err(AgentError::Workflow("step limit exceeded".to_string()));
                }

                let node = this
                    .graph
                    .node(&name)
                    .ok_or_else(|| AgentError::Workflow(format!("unknown node '{name}'")))?;

                match this.run_node(&ctx, node).await? {
                    NodeOutcome::Next(next) => {
                        for successor in next {
                            worklist.push_back(successor);
                        }
                    }
                }
            }
            Ok(())
        })
    }

    /// Wraps one node's execution with the registered middleware chain:
    /// before-hooks run in order and short-circuit on the first error;
    /// after-hooks run in reverse, only for middlewares whose before-hook
    /// succeeded, and their errors join with any node error (§4.5).
    async fn run_node(
        self: &Arc<Self>,
        ctx: &Arc<ExecutionContext>,
        node: &Node,
    ) -> Result<NodeOutcome, AgentError> {
        let step = Step {
            node_name: node.name.clone(),
        };

        let mut succeeded: Vec<&Arc<dyn Middleware>> = Vec::new();
        let mut before_error = None;
        for middleware in &self.middlewares {
            match middleware.before_step(ctx, &step).await {
                Ok(()) => succeeded.push(middleware),
                Err(err) => {
                    before_error = Some(err);
                    break;
                }
            }
        }

        let mut outcome = match before_error {
            Some(err) => Err(err),
            None => self.run_node_body(ctx, node).await,
        };

        let mut after_errors = Vec::new();
        for middleware in succeeded.iter().rev() {
            if let Err(err) = middleware.after_step(ctx, &step, outcome.as_ref().err()).await {
                after_errors.push(err.to_string());
            }
        }

        if !after_errors.is_empty() {
            outcome = match outcome {
                Ok(_) => Err(AgentError::Workflow(after_errors.join("; "))),
                Err(node_err) => Err(AgentError::Workflow(format!(
                    "{node_err}; after-hook errors: {}",
                    after_errors.join("; ")
                ))),
            };
        }

        outcome
    }

    async fn run_node_body(
        self: &Arc<Self>,
        ctx: &Arc<ExecutionContext>,
        node: &Node,
    ) -> Result<NodeOutcome, AgentError> {
        match &node.kind {
            NodeKind::Action(action) => {
                action(ctx.clone()).await?;
                let next = self.resolve_transition(&node.name, ctx).await?;
                Ok(NodeOutcome::Next(next))
            }
            NodeKind::Decision(decision) => {
                let next = decision(ctx.clone()).await?;
                let next = if next.is_empty() { vec![] } else { vec![next] };
                Ok(NodeOutcome::Next(next))
            }
            NodeKind::Parallel(branches) => {
                self.run_parallel(ctx, branches.clone()).await?;
                Ok(NodeOutcome::Next(vec![]))
            }
        }
    }

    /// Evaluates every outgoing transition's predicate in declaration order
    /// and collects the targets of every one that fires. A missing
    /// predicate is unconditionally true (§4.5).
    async fn resolve_transition(
        &self,
        from: &str,
        ctx: &Arc<ExecutionContext>,
    ) -> Result<Vec<String>, AgentError> {
        let mut next = Vec::new();
        for transition in self.graph.transitions_from(from) {
            let fires = match &transition.predicate {
                Some(predicate) => predicate(ctx.clone()).await?,
                None => true,
            };
            if fires {
                next.push(transition.to.clone());
            }
        }
        Ok(next)
    }

    /// Runs each branch to completion on a shared derived context so a
    /// canceled peer cancels its siblings (§5).
    async fn run_parallel(
        self: &Arc<Self>,
        ctx: &Arc<ExecutionContext>,
        branches: Vec<String>,
    ) -> Result<(), AgentError> {
        let shared = ctx.with_context();
        let mut pending = FuturesUnordered::new();
        for branch in branches {
            let this = self.clone();
            let shared = shared.clone();
            pending.push(tokio::spawn(async move { this.run_from(shared, branch).await }));
        }

        let mut errors = Vec::new();
        while let Some(joined) = pending.next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    shared.cancel.cancel();
                    errors.push(err.to_string());
                }
                Err(join_err) => {
                    shared.cancel.cancel();
                    errors.push(join_err.to_string());
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(AgentError::Workflow(errors.join("; ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::ToolRegistry;
    use crate::workflow::graph::{ActionFn, DecisionFn, PredicateFn, Transition};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn ctx() -> Arc<ExecutionContext> {
        Arc::new(ExecutionContext::new(Arc::new(ToolRegistry::new())))
    }

    fn record_action(counter: Arc<AtomicUsize>) -> ActionFn {
        Arc::new(move |_ctx| {
            let counter = counter.clone();
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        })
    }

    #[tokio::test]
    async fn runs_a_linear_chain_of_action_nodes() {
        let mut graph = Graph::new();
        let counter = Arc::new(AtomicUsize::new(0));
        graph
            .add_node(Node {
                name: "a".to_string(),
                kind: NodeKind::Action(record_action(counter.clone())),
            })
            .unwrap();
        graph
            .add_node(Node {
                name: "b".to_string(),
                kind: NodeKind::Action(record_action(counter.clone())),
            })
            .unwrap();
        graph.set_start("a").unwrap();
        graph
            .add_transition(
                "a",
                Transition {
                    to: "b".to_string(),
                    predicate: None,
                },
            )
            .unwrap();

        let executor = Arc::new(WorkflowExecutor::new(graph));
        executor.run(ctx()).await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn multiple_firing_predicates_all_fan_out() {
        let mut graph = Graph::new();
        let counter = Arc::new(AtomicUsize::new(0));
        graph
            .add_node(Node {
                name: "a".to_string(),
                kind: NodeKind::Action(record_action(counter.clone())),
            })
            .unwrap();
        graph
            .add_node(Node {
                name: "b".to_string(),
                kind: NodeKind::Action(record_action(counter.clone())),
            })
            .unwrap();
        graph
            .add_node(Node {
                name: "c".to_string(),
                kind: NodeKind::Action(record_action(counter.clone())),
            })
            .unwrap();
        graph.set_start("a").unwrap();
        let always: PredicateFn = Arc::new(|_ctx| Box::pin(async { Ok(true) }));
        graph
            .add_transition(
                "a",
                Transition {
                    to: "b".to_string(),
                    predicate: Some(always.clone()),
                },
            )
            .unwrap();
        graph
            .add_transition(
                "a",
                Transition {
                    to: "c".to_string(),
                    predicate: Some(always),
                },
            )
            .unwrap();

        let executor = Arc::new(WorkflowExecutor::new(graph));
        executor.run(ctx()).await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn predicate_gates_transition() {
        let mut graph = Graph::new();
        let counter = Arc::new(AtomicUsize::new(0));
        graph
            .add_node(Node {
                name: "a".to_string(),
                kind: NodeKind::Action(record_action(counter.clone())),
            })
            .unwrap();
        graph
            .add_node(Node {
                name: "b".to_string(),
                kind: NodeKind::Action(record_action(counter.clone())),
            })
            .unwrap();
        graph.set_start("a").unwrap();
        let never: PredicateFn = Arc::new(|_ctx| Box::pin(async { Ok(false) }));
        graph
            .add_transition(
                "a",
                Transition {
                    to: "b".to_string(),
                    predicate: Some(never),
                },
            )
            .unwrap();

        let executor = Arc::new(WorkflowExecutor::new(graph));
        executor.run(ctx()).await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn decision_node_routes_explicitly() {
        let mut graph = Graph::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let decision: DecisionFn = Arc::new(|_ctx| Box::pin(async { Ok("b".to_string()) }));
        graph
            .add_node(Node {
                name: "a".to_string(),
                kind: NodeKind::Decision(decision),
            })
            .unwrap();
        graph
            .add_node(Node {
                name: "b".to_string(),
                kind: NodeKind::Action(record_action(counter.clone())),
            })
            .unwrap();
        graph.set_start("a").unwrap();

        let executor = Arc::new(WorkflowExecutor::new(graph));
        executor.run(ctx()).await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn parallel_node_runs_all_branches() {
        let mut graph = Graph::new();
        let counter = Arc::new(AtomicUsize::new(0));
        graph
            .add_node(Node {
                name: "start".to_string(),
                kind: NodeKind::Parallel(vec!["b1".to_string(), "b2".to_string()]),
            })
            .unwrap();
        graph
            .add_node(Node {
                name: "b1".to_string(),
                kind: NodeKind::Action(record_action(counter.clone())),
            })
            .unwrap();
        graph
            .add_node(Node {
                name: "b2".to_string(),
                kind: NodeKind::Action(record_action(counter.clone())),
            })
            .unwrap();
        graph.set_start("start").unwrap();

        let executor = Arc::new(WorkflowExecutor::new(graph));
        executor.run(ctx()).await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failing_branch_cancels_its_sibling() {
        let mut graph = Graph::new();
        graph
            .add_node(Node {
                name: "start".to_string(),
                kind: NodeKind::Parallel(vec!["fails".to_string(), "waits".to_string()]),
            })
            .unwrap();
        graph
            .add_node(Node {
                name: "fails".to_string(),
                kind: NodeKind::Action(Arc::new(|_ctx| {
                    Box::pin(async { Err(AgentError::Tool("boom".to_string())) })
                })),
            })
            .unwrap();
        graph
            .add_node(Node {
                name: "waits".to_string(),
                kind: NodeKind::Action(Arc::new(|ctx| {
                    Box::pin(async move {
                        ctx.cancel.cancelled().await;
                        Err(AgentError::Cancelled("cancelled by sibling".to_string()))
                    })
                })),
            })
            .unwrap();
        graph.set_start("start").unwrap();

        let executor = Arc::new(WorkflowExecutor::new(graph));
        let err = executor.run(ctx()).await.unwrap_err();
        assert!(matches!(err, AgentError::Workflow(_)));
    }

    #[tokio::test]
    async fn step_limit_aborts_an_infinite_loop() {
        let mut graph = Graph::new();
        let counter = Arc::new(AtomicUsize::new(0));
        graph
            .add_node(Node {
                name: "a".to_string(),
                kind: NodeKind::Action(record_action(counter.clone())),
            })
            .unwrap();
        graph.set_start("a").unwrap();
        graph
            .add_transition(
                "a",
                Transition {
                    to: "a".to_string(),
                    predicate: None,
                },
            )
            .unwrap();

        let executor = Arc::new(WorkflowExecutor::new(graph).with_step_limit(5));
        let err = executor.run(ctx()).await.unwrap_err();
        assert!(matches!(err, AgentError::Workflow(ref msg) if msg.contains("step limit")));
    }
}
