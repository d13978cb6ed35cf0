pub mod context_builder;
pub mod llm_worker;
pub mod router;
pub mod tool_call;
pub mod validator;

pub use context_builder::ContextBuilderNode;
pub use llm_worker::{postprocess_output, LlmWorkerNode, DEFAULT_STOP_TOKENS};
pub use router::{classify_intent, RouterNode};
pub use tool_call::ToolCallNode;
pub use validator::ValidatorNode;

use super::graph::NodeType;
use super::plan::Intent;
use crate::memory::TranscriptMessage;
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeFailure {
    pub code: String,
    pub message: String,
}

impl NodeFailure {
    pub fn new(code: &str, message: String) -> Self {
        Self {
            code: code.to_string(),
            message,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallSpec {
    pub tool_name: String,
    pub payload: Map<String, Value>,
    pub allow_write_safe: bool,
    pub allow_external: bool,
}

/// Mutable state threaded through the DAG. Nodes own well-defined side
/// effects into memory, cache or the tool executor; everything else
/// flows through this struct.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeContext {
    pub task_id: String,
    pub turn: u64,
    pub user_input: String,
    pub intent: Intent,
    pub messages: Vec<TranscriptMessage>,
    pub llm_output: String,
    pub tool_ok: Option<bool>,
    pub tool_result: Option<Value>,
    pub tool_call: Option<ToolCallSpec>,
    pub node_error: Option<NodeFailure>,
}

impl NodeContext {
    pub fn new(task_id: &str, turn: u64, user_input: &str) -> Self {
        Self {
            task_id: task_id.to_string(),
            turn,
            user_input: user_input.to_string(),
            intent: Intent::Chat,
            messages: Vec::new(),
            llm_output: String::new(),
            tool_ok: None,
            tool_result: None,
            tool_call: None,
            node_error: None,
        }
    }
}

/// Nodes never raise; problems land in `context.node_error`.
pub trait WorkflowNode {
    fn node_type(&self) -> NodeType;

    fn execute(&self, context: NodeContext) -> NodeContext;
}
