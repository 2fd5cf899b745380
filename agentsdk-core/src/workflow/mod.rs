//! The workflow engine (§4.5–§4.6): a graph of action/decision/parallel
//! nodes, a middleware-wrapping executor, and the four core middlewares.

pub mod context;
pub mod executor;
pub mod graph;
pub mod middleware;

pub use context::ExecutionContext;
pub use executor::{TraversalStrategy, WorkflowExecutor};
pub use graph::{ActionFn, DecisionFn, Graph, GraphError, Node, NodeKind, PredicateFn, Transition};
pub use middleware::{Middleware, Step};
