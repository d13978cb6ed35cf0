use super::{NodeContext, NodeFailure, WorkflowNode};
use crate::llm::LanguageModel;
use crate::memory::{MemoryManager, MessageRole};
use crate::workflow::graph::NodeType;
use regex::Regex;
use std::sync::LazyLock;

pub const DEFAULT_STOP_TOKENS: &[&str] = &["Instruction:", "User:", "<|im_end|>", "</s>"];
const DEFAULT_MAX_PROMPT_CHARS: usize = 6000;

static NAME_IS: LazyLock<Regex> = LazyLock::new(|| {
    match Regex::new(r"(?i)\bname\s+is\s+([A-Za-z][A-Za-z0-9'_-]*)") {
        Ok(regex) => regex,
        Err(err) => panic!("built-in name pattern failed to compile: {err}"),
    }
});

/// Calls the injected model with a bounded prompt and stop tokens, then
/// normalizes the completion and appends the assistant turn to working
/// state. Model failure is a node error; the controller fails the task.
pub struct LlmWorkerNode<'a> {
    model: &'a dyn LanguageModel,
    memory: &'a MemoryManager,
    max_tokens: usize,
    max_prompt_chars: usize,
    stop_tokens: Vec<String>,
}

impl<'a> LlmWorkerNode<'a> {
    pub fn new(model: &'a dyn LanguageModel, memory: &'a MemoryManager, max_tokens: usize) -> Self {
        Self {
            model,
            memory,
            max_tokens,
            max_prompt_chars: DEFAULT_MAX_PROMPT_CHARS,
            stop_tokens: DEFAULT_STOP_TOKENS
                .iter()
                .map(|token| token.to_string())
                .collect(),
        }
    }

    fn build_prompt(&self, context: &NodeContext) -> String {
        let mut lines = Vec::new();
        for message in &context.messages {
            let role = match message.role {
                MessageRole::User => "User",
                MessageRole::Assistant => "Assistant",
                MessageRole::System => "System",
            };
            lines.push(format!("{role}: {}", message.content));
        }
        lines.push("Assistant:".to_string());

        // Keep the newest lines when the prompt would run over the cap.
        let mut kept: Vec<&String> = Vec::new();
        let mut used = 0_usize;
        for line in lines.iter().rev() {
            let cost = line.chars().count() + 1;
            if used + cost > self.max_prompt_chars && !kept.is_empty() {
                break;
            }
            used += cost;
            kept.push(line);
        }
        kept.reverse();
        kept.iter()
            .map(|line| line.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl WorkflowNode for LlmWorkerNode<'_> {
    fn node_type(&self) -> NodeType {
        NodeType::LlmWorker
    }

    fn execute(&self, mut context: NodeContext) -> NodeContext {
        let prompt = self.build_prompt(&context);
        let raw = match self
            .model
            .generate(&prompt, &self.stop_tokens, self.max_tokens)
        {
            Ok(raw) => raw,
            Err(err) => {
                context.node_error = Some(NodeFailure::new(err.code(), err.to_string()));
                return context;
            }
        };

        let output = postprocess_output(&raw, &self.stop_tokens);
        context.llm_output = output.clone();

        if !output.is_empty() {
            if let Err(err) =
                self.memory
                    .append_message(&context.task_id, MessageRole::Assistant, &output)
            {
                context.node_error = Some(NodeFailure::new(err.code(), err.to_string()));
                return context;
            }
            context.messages.push(crate::memory::TranscriptMessage {
                role: MessageRole::Assistant,
                content: output,
            });
        }
        context
    }
}

/// Cut at the earliest stop token, trim, then apply the single general
/// normalization rule: a first line of the form "… name is <Token> …"
/// collapses to `<Token>`. Later lines are left untouched.
pub fn postprocess_output(raw: &str, stop_tokens: &[String]) -> String {
    let mut cut = raw;
    for token in stop_tokens {
        if let Some(index) = cut.find(token.as_str()) {
            cut = &cut[..index];
        }
    }
    let trimmed = cut.trim();

    let first_line = trimmed.lines().find(|line| !line.trim().is_empty());
    if let Some(line) = first_line {
        if let Some(captures) = NAME_IS.captures(line) {
            if let Some(token) = captures.get(1) {
                return token.as_str().to_string();
            }
        }
    }
    trimmed.to_string()
}
