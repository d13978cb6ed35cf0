use super::graph::{GraphNode, NodeType, WorkflowEdge, WorkflowGraph};
use serde_json::Map;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Chat,
    Code,
    FileOps,
    Research,
}

impl Intent {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Code => "code",
            Self::FileOps => "file_ops",
            Self::Research => "research",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanRequest {
    pub intent: Intent,
    pub has_tool_call: bool,
}

/// Fixed per-intent chain: router → context_builder → [tool_call →]
/// llm_worker → validator. Deterministic for identical inputs.
pub fn compile_plan(request: &PlanRequest) -> WorkflowGraph {
    let mut sequence = vec![
        ("router", NodeType::Router),
        ("context_builder", NodeType::ContextBuilder),
    ];
    if request.has_tool_call {
        sequence.push(("tool_call", NodeType::ToolCall));
    }
    sequence.push(("llm_worker", NodeType::LlmWorker));
    sequence.push(("validator", NodeType::Validator));

    let mut nodes = Vec::new();
    let mut edges = Vec::new();
    for (index, (id, node_type)) in sequence.iter().enumerate() {
        let mut inputs = BTreeSet::new();
        if index > 0 {
            let (previous, _) = sequence[index - 1];
            inputs.insert(previous.to_string());
            edges.push(WorkflowEdge {
                from: previous.to_string(),
                to: id.to_string(),
            });
        }
        let mut params = Map::new();
        if *node_type == NodeType::Router {
            params.insert(
                "intent".to_string(),
                serde_json::Value::String(request.intent.as_str().to_string()),
            );
        }
        nodes.push(GraphNode {
            id: id.to_string(),
            node_type: *node_type,
            inputs,
            params,
        });
    }

    WorkflowGraph {
        nodes,
        edges,
        entry: "router".to_string(),
    }
}
