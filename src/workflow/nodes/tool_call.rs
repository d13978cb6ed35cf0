use super::{NodeContext, NodeFailure, WorkflowNode};
use crate::cache::CacheClient;
use crate::memory::{ActionType, DecisionStatus, MemoryManager};
use crate::security::PrivacyWrapper;
use crate::shared::dumps_json;
use crate::tools::{execute_tool, ExecutionOptions, Sandbox, ToolRegistry, ToolRequest};
use crate::workflow::graph::NodeType;
use serde_json::{json, Value};

/// Runtime-only DAG augmentation: present in the graph iff the run
/// request carries a tool call. Dispatches through the executor (WRITE_SAFE
/// stays deny-by-default) and records the decision plus tool_call rows.
pub struct ToolCallNode<'a> {
    registry: &'a ToolRegistry,
    sandbox: &'a Sandbox,
    memory: &'a MemoryManager,
    cache: Option<&'a CacheClient>,
    privacy: Option<&'a PrivacyWrapper>,
    tool_cache_ttl_seconds: u64,
}

impl<'a> ToolCallNode<'a> {
    pub fn new(
        registry: &'a ToolRegistry,
        sandbox: &'a Sandbox,
        memory: &'a MemoryManager,
        tool_cache_ttl_seconds: u64,
    ) -> Self {
        Self {
            registry,
            sandbox,
            memory,
            cache: None,
            privacy: None,
            tool_cache_ttl_seconds,
        }
    }

    pub fn with_cache(mut self, cache: Option<&'a CacheClient>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_privacy(mut self, privacy: Option<&'a PrivacyWrapper>) -> Self {
        self.privacy = privacy;
        self
    }

    fn record_rows(&self, context: &NodeContext, tool_name: &str, params: &Value, result: &Value, ok: bool) {
        let status = if ok {
            DecisionStatus::Ok
        } else {
            DecisionStatus::Err
        };
        let decision = self.memory.record_decision(
            &context.task_id,
            ActionType::Tool,
            &format!("tool_call {tool_name}"),
            status,
        );
        if let Ok(decision_id) = decision {
            let _ = self.memory.record_tool_call(
                decision_id,
                tool_name,
                &dumps_json(params),
                &dumps_json(result),
            );
        }
    }
}

impl WorkflowNode for ToolCallNode<'_> {
    fn node_type(&self) -> NodeType {
        NodeType::ToolCall
    }

    fn execute(&self, mut context: NodeContext) -> NodeContext {
        let Some(spec) = context.tool_call.clone() else {
            context.node_error = Some(NodeFailure::new(
                "tool_call_missing",
                "tool_call payload is missing".to_string(),
            ));
            return context;
        };

        let request = ToolRequest {
            tool_name: spec.tool_name.clone(),
            payload: spec.payload.clone(),
        };
        let options = ExecutionOptions {
            allow_write_safe: spec.allow_write_safe,
            allow_external: spec.allow_external,
            cache: self.cache,
            privacy: self.privacy,
            task_id: Some(&context.task_id),
            tool_cache_ttl_seconds: Some(self.tool_cache_ttl_seconds),
        };

        let params = Value::Object(spec.payload.clone());
        match execute_tool(self.registry, self.sandbox, &request, options) {
            Ok(output) => {
                self.record_rows(&context, &spec.tool_name, &params, &output.value, true);
                context.tool_ok = Some(true);
                context.tool_result = Some(output.value);
            }
            Err(err) => {
                let failure = json!({ "code": err.code(), "message": err.to_string() });
                self.record_rows(&context, &spec.tool_name, &params, &failure, false);
                context.tool_ok = Some(false);
                context.tool_result = Some(failure);
                context.node_error = Some(NodeFailure::new(err.code(), err.to_string()));
            }
        }
        context
    }
}
