use super::{NodeContext, NodeFailure, WorkflowNode};
use crate::config::ValidatorSettings;
use crate::memory::{ActionType, DecisionStatus, MemoryManager};
use crate::workflow::graph::NodeType;

/// Gate-keeper over the model output: empty text, oversize output and
/// surfaced stop-token artifacts fail the task.
pub struct ValidatorNode<'a> {
    memory: &'a MemoryManager,
    settings: &'a ValidatorSettings,
}

impl<'a> ValidatorNode<'a> {
    pub fn new(memory: &'a MemoryManager, settings: &'a ValidatorSettings) -> Self {
        Self { memory, settings }
    }

    fn violation(&self, output: &str) -> Option<String> {
        if output.trim().is_empty() {
            return Some("output is empty".to_string());
        }
        if output.chars().count() > self.settings.max_output_chars {
            return Some(format!(
                "output exceeds {} characters",
                self.settings.max_output_chars
            ));
        }
        for token in &self.settings.forbidden_tokens {
            if output.contains(token.as_str()) {
                return Some(format!("output contains forbidden token `{token}`"));
            }
        }
        None
    }

    fn record_validation(&self, context: &NodeContext, passed: bool, notes: &str) {
        let status = if passed {
            DecisionStatus::Ok
        } else {
            DecisionStatus::Err
        };
        let decision = self.memory.record_decision(
            &context.task_id,
            ActionType::Validate,
            "output validation",
            status,
        );
        if let Ok(decision_id) = decision {
            let _ = self.memory.episodic.append_validation(
                decision_id,
                "output_contract",
                if passed { "pass" } else { "fail" },
                notes,
            );
        }
    }
}

impl WorkflowNode for ValidatorNode<'_> {
    fn node_type(&self) -> NodeType {
        NodeType::Validator
    }

    fn execute(&self, mut context: NodeContext) -> NodeContext {
        match self.violation(&context.llm_output) {
            Some(reason) => {
                self.record_validation(&context, false, &reason);
                context.node_error = Some(NodeFailure::new("validation_failed", reason));
            }
            None => {
                self.record_validation(&context, true, "output within contract");
            }
        }
        context
    }
}
