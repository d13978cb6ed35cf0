use super::graph::{NodeType, WorkflowGraph};
use super::nodes::{NodeContext, NodeFailure, WorkflowNode};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

#[derive(Debug, thiserror::Error)]
pub enum DagError {
    #[error("workflow graph must contain at least one node")]
    EmptyGraph,
    #[error("workflow entry node not found: {entry}")]
    UnknownEntry { entry: String },
    #[error("edge references unknown node: {node_id}")]
    UnknownEdgeNode { node_id: String },
    #[error("missing node implementation: {node_id}")]
    MissingNodeImpl { node_id: String },
    #[error("workflow graph contains a cycle")]
    CycleDetected,
}

impl DagError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::CycleDetected => "cycle_detected",
            _ => "invalid_graph",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeEventKind {
    Start,
    End,
    Error,
}

impl NodeEventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "node_start",
            Self::End => "node_end",
            Self::Error => "node_error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeEvent {
    pub node_id: String,
    pub node_type: NodeType,
    pub kind: NodeEventKind,
    pub success: bool,
    pub error_code: Option<String>,
    pub elapsed_ns: u64,
    pub start_offset_ns: u64,
}

/// Kahn topological order; duplicate edges are deduplicated and ties are
/// broken by ascending node id. A cycle is detected before any node
/// executes.
pub fn resolve_execution_order(graph: &WorkflowGraph) -> Result<Vec<String>, DagError> {
    if graph.nodes.is_empty() {
        return Err(DagError::EmptyGraph);
    }
    let node_ids = graph.node_ids();
    if !node_ids.contains(&graph.entry) {
        return Err(DagError::UnknownEntry {
            entry: graph.entry.clone(),
        });
    }

    let edges = graph
        .edges
        .iter()
        .map(|edge| (edge.from.clone(), edge.to.clone()))
        .collect::<BTreeSet<_>>();
    for (from, to) in &edges {
        for node_id in [from, to] {
            if !node_ids.contains(node_id) {
                return Err(DagError::UnknownEdgeNode {
                    node_id: node_id.clone(),
                });
            }
        }
    }

    let mut adjacency: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    let mut indegree: BTreeMap<&str, usize> = node_ids.iter().map(|id| (id.as_str(), 0)).collect();
    for (from, to) in &edges {
        adjacency.entry(from.as_str()).or_default().push(to.as_str());
        if let Some(count) = indegree.get_mut(to.as_str()) {
            *count += 1;
        }
    }

    let mut ready = indegree
        .iter()
        .filter(|(_, count)| **count == 0)
        .map(|(id, _)| *id)
        .collect::<BTreeSet<_>>();
    let mut ordered = Vec::new();

    while let Some(node_id) = ready.pop_first() {
        ordered.push(node_id.to_string());
        if let Some(downstream) = adjacency.get(node_id) {
            for next in downstream {
                if let Some(count) = indegree.get_mut(next) {
                    *count -= 1;
                    if *count == 0 {
                        ready.insert(next);
                    }
                }
            }
        }
    }

    if ordered.len() != node_ids.len() {
        return Err(DagError::CycleDetected);
    }
    Ok(ordered)
}

/// Execute a slice of the resolved order sequentially. Node entry and
/// exit each emit an event; a node error stops execution and the partial
/// trace is returned. The deadline is checked before each node.
pub fn execute_nodes(
    order: &[String],
    registry: &BTreeMap<String, &dyn WorkflowNode>,
    mut context: NodeContext,
    run_started: Instant,
    deadline: Option<Instant>,
) -> (NodeContext, Vec<NodeEvent>) {
    let mut events = Vec::new();

    for node_id in order {
        let Some(node) = registry.get(node_id) else {
            context.node_error = Some(NodeFailure::new(
                "invalid_graph",
                format!("missing node implementation: {node_id}"),
            ));
            break;
        };
        let node_type = node.node_type();

        if let Some(deadline) = deadline {
            if Instant::now() >= deadline {
                context.node_error = Some(NodeFailure::new(
                    "deadline_exceeded",
                    format!("deadline reached before node `{node_id}`"),
                ));
                events.push(NodeEvent {
                    node_id: node_id.clone(),
                    node_type,
                    kind: NodeEventKind::Error,
                    success: false,
                    error_code: Some("deadline_exceeded".to_string()),
                    elapsed_ns: 0,
                    start_offset_ns: elapsed_ns_since(run_started),
                });
                break;
            }
        }

        let start_offset_ns = elapsed_ns_since(run_started);
        events.push(NodeEvent {
            node_id: node_id.clone(),
            node_type,
            kind: NodeEventKind::Start,
            success: true,
            error_code: None,
            elapsed_ns: 0,
            start_offset_ns,
        });

        let node_started = Instant::now();
        context = node.execute(context);
        let elapsed_ns = elapsed_ns_since(node_started);

        match &context.node_error {
            Some(failure) => {
                events.push(NodeEvent {
                    node_id: node_id.clone(),
                    node_type,
                    kind: NodeEventKind::Error,
                    success: false,
                    error_code: Some(failure.code.clone()),
                    elapsed_ns,
                    start_offset_ns,
                });
                break;
            }
            None => {
                events.push(NodeEvent {
                    node_id: node_id.clone(),
                    node_type,
                    kind: NodeEventKind::End,
                    success: true,
                    error_code: None,
                    elapsed_ns,
                    start_offset_ns,
                });
            }
        }
    }

    (context, events)
}

/// Validate, order and run the whole graph in one call.
pub fn execute(
    graph: &WorkflowGraph,
    registry: &BTreeMap<String, &dyn WorkflowNode>,
    context: NodeContext,
    deadline: Option<Instant>,
) -> Result<(NodeContext, Vec<NodeEvent>), DagError> {
    let order = resolve_execution_order(graph)?;
    for node_id in &order {
        if !registry.contains_key(node_id) {
            return Err(DagError::MissingNodeImpl {
                node_id: node_id.clone(),
            });
        }
    }
    Ok(execute_nodes(&order, registry, context, Instant::now(), deadline))
}

fn elapsed_ns_since(instant: Instant) -> u64 {
    u64::try_from(instant.elapsed().as_nanos()).unwrap_or(u64::MAX)
}
