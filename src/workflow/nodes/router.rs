use super::{NodeContext, WorkflowNode};
use crate::workflow::graph::NodeType;
use crate::workflow::plan::Intent;

const FILE_OPS_KEYWORDS: &[&str] = &[
    "file", "files", "directory", "folder", "read", "write", "list", "delete", "path", "glob",
];
const CODE_KEYWORDS: &[&str] = &[
    "code", "function", "compile", "bug", "debug", "refactor", "implement", "script", "error",
    "stack",
];
const RESEARCH_KEYWORDS: &[&str] = &[
    "research", "search", "find", "lookup", "investigate", "compare", "summarize", "sources",
];

/// Rule classifier over folded tokens; precedence file_ops, code,
/// research, then chat. Not LLM-driven at this tier.
pub fn classify_intent(user_input: &str) -> Intent {
    let tokens = user_input
        .to_lowercase()
        .split(|ch: char| !ch.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(|token| token.to_string())
        .collect::<Vec<_>>();

    let hits = |keywords: &[&str]| {
        tokens
            .iter()
            .filter(|token| keywords.contains(&token.as_str()))
            .count()
    };

    if hits(FILE_OPS_KEYWORDS) > 0 {
        return Intent::FileOps;
    }
    if hits(CODE_KEYWORDS) > 0 {
        return Intent::Code;
    }
    if hits(RESEARCH_KEYWORDS) > 0 {
        return Intent::Research;
    }
    Intent::Chat
}

pub struct RouterNode;

impl WorkflowNode for RouterNode {
    fn node_type(&self) -> NodeType {
        NodeType::Router
    }

    fn execute(&self, mut context: NodeContext) -> NodeContext {
        context.intent = classify_intent(&context.user_input);
        context
    }
}
