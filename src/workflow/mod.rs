pub mod executor;
pub mod graph;
pub mod nodes;
pub mod plan;

pub use executor::{
    execute, execute_nodes, resolve_execution_order, DagError, NodeEvent, NodeEventKind,
};
pub use graph::{GraphNode, NodeType, WorkflowEdge, WorkflowGraph};
pub use nodes::{classify_intent, NodeContext, NodeFailure, ToolCallSpec, WorkflowNode};
pub use plan::{compile_plan, Intent, PlanRequest};
