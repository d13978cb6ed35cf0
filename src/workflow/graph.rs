use serde_json::{json, Map, Value};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    Router,
    ContextBuilder,
    ToolCall,
    LlmWorker,
    Validator,
}

impl NodeType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Router => "router",
            Self::ContextBuilder => "context_builder",
            Self::ToolCall => "tool_call",
            Self::LlmWorker => "llm_worker",
            Self::Validator => "validator",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GraphNode {
    pub id: String,
    pub node_type: NodeType,
    pub inputs: BTreeSet<String>,
    pub params: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct WorkflowEdge {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowGraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<WorkflowEdge>,
    pub entry: String,
}

impl WorkflowGraph {
    /// Canonical form: nodes sorted by id, edges deduplicated and sorted
    /// lexicographically. Byte-stable across runs for identical inputs.
    pub fn canonical(&self) -> Value {
        let mut nodes = self.nodes.clone();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));

        let edges = self
            .edges
            .iter()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(|edge| json!({ "from": edge.from, "to": edge.to }))
            .collect::<Vec<_>>();

        json!({
            "nodes": nodes
                .iter()
                .map(|node| {
                    json!({
                        "id": node.id,
                        "type": node.node_type.as_str(),
                        "inputs": node.inputs.iter().cloned().collect::<Vec<_>>(),
                        "params": Value::Object(node.params.clone()),
                    })
                })
                .collect::<Vec<_>>(),
            "edges": edges,
            "entry": self.entry,
        })
    }

    pub fn node_ids(&self) -> BTreeSet<String> {
        self.nodes.iter().map(|node| node.id.clone()).collect()
    }
}
