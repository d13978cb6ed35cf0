use super::fsm::{ControllerState, Fsm};
use super::trace::{canonical_event, canonical_trace, TraceEvent};
use crate::cache::CacheClient;
use crate::config::Settings;
use crate::llm::LanguageModel;
use crate::memory::{ActionType, DecisionStatus, MemoryManager, MessageRole, WorkingStateDoc};
use crate::retrieval::HybridRetriever;
use crate::security::PrivacyWrapper;
use crate::shared::{dumps_json, generate_task_id, validate_task_id};
use crate::tools::{Sandbox, ToolRegistry};
use crate::workflow::nodes::{
    ContextBuilderNode, LlmWorkerNode, RouterNode, ToolCallNode, ValidatorNode,
};
use crate::workflow::{
    classify_intent, compile_plan, execute_nodes, resolve_execution_order, NodeContext, NodeEvent,
    PlanRequest, ToolCallSpec, WorkflowNode,
};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

const DEFAULT_MAX_COMPLETION_TOKENS: usize = 256;

#[derive(Debug, Clone, PartialEq)]
pub struct RunRequest {
    pub user_input: String,
    pub task_id: Option<String>,
    pub tool_call: Option<ToolCallSpec>,
    pub deadline: Option<Instant>,
}

impl RunRequest {
    pub fn from_input(user_input: &str) -> Self {
        Self {
            user_input: user_input.to_string(),
            task_id: None,
            tool_call: None,
            deadline: None,
        }
    }

    pub fn with_task_id(mut self, task_id: &str) -> Self {
        self.task_id = Some(task_id.to_string());
        self
    }

    pub fn with_tool_call(mut self, tool_call: ToolCallSpec) -> Self {
        self.tool_call = Some(tool_call);
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub task_id: String,
    pub final_state: ControllerState,
    pub archived: bool,
    pub llm_output: String,
    pub error: Option<String>,
    pub trace: Vec<TraceEvent>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Ok,
    Degraded,
}

impl HealthStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Degraded => "degraded",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub components: BTreeMap<String, String>,
}

/// Per-request orchestrator: drives one task through the deterministic
/// lifecycle, appending one decision row per transition and one per node
/// event, and leaves a replayable trace whose canonical form is
/// bit-stable for identical inputs.
pub struct Controller {
    settings: Settings,
    memory: MemoryManager,
    model: Arc<dyn LanguageModel>,
    registry: Arc<ToolRegistry>,
    sandbox: Arc<Sandbox>,
    cache: Option<Arc<CacheClient>>,
    retriever: Option<Arc<HybridRetriever>>,
    privacy: Option<Arc<PrivacyWrapper>>,
    max_completion_tokens: usize,
}

impl Controller {
    pub fn new(
        settings: Settings,
        memory: MemoryManager,
        model: Arc<dyn LanguageModel>,
        registry: Arc<ToolRegistry>,
        sandbox: Arc<Sandbox>,
    ) -> Self {
        Self {
            settings,
            memory,
            model,
            registry,
            sandbox,
            cache: None,
            retriever: None,
            privacy: None,
            max_completion_tokens: DEFAULT_MAX_COMPLETION_TOKENS,
        }
    }

    pub fn with_cache(mut self, cache: Arc<CacheClient>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_retriever(mut self, retriever: Arc<HybridRetriever>) -> Self {
        self.retriever = Some(retriever);
        self
    }

    pub fn with_privacy(mut self, privacy: Arc<PrivacyWrapper>) -> Self {
        self.privacy = Some(privacy);
        self
    }

    pub fn with_max_completion_tokens(mut self, max_completion_tokens: usize) -> Self {
        self.max_completion_tokens = max_completion_tokens.max(1);
        self
    }

    pub fn run(&self, request: &RunRequest) -> RunOutcome {
        let run_started = Instant::now();
        let mut trace: Vec<TraceEvent> = Vec::new();

        let task_id = match &request.task_id {
            Some(supplied) => match validate_task_id(supplied) {
                Ok(()) => supplied.clone(),
                Err(reason) => {
                    return RunOutcome {
                        task_id: supplied.clone(),
                        final_state: ControllerState::Failed,
                        archived: false,
                        llm_output: String::new(),
                        error: Some(format!("invalid_argument: {reason}")),
                        trace,
                    };
                }
            },
            None => generate_task_id(),
        };

        let mut fsm = Fsm::new();
        let mut doc = match self.resolve_working_doc(&task_id, &request.user_input) {
            Ok(doc) => doc,
            Err(message) => {
                return self.fail(
                    &mut fsm,
                    None,
                    &task_id,
                    trace,
                    run_started,
                    "controller",
                    "io_error",
                    &message,
                    String::new(),
                );
            }
        };
        let turn = doc.turn;

        // INIT -> PLAN, then compile the graph.
        if let Err(message) = self.advance(&mut fsm, &mut doc, ControllerState::Plan) {
            return self.fail(
                &mut fsm,
                Some(&mut doc),
                &task_id,
                trace,
                run_started,
                "controller",
                "io_error",
                &message,
                String::new(),
            );
        }

        let intent = classify_intent(&request.user_input);
        let graph = compile_plan(&PlanRequest {
            intent,
            has_tool_call: request.tool_call.is_some(),
        });
        doc.workflow_graph = Some(graph.canonical());
        if let Err(err) = self.memory.working.save(&doc) {
            return self.fail(
                &mut fsm,
                Some(&mut doc),
                &task_id,
                trace,
                run_started,
                "controller",
                err.code(),
                &err.to_string(),
                String::new(),
            );
        }

        let order = match resolve_execution_order(&graph) {
            Ok(order) => order,
            Err(err) => {
                return self.fail(
                    &mut fsm,
                    Some(&mut doc),
                    &task_id,
                    trace,
                    run_started,
                    "plan_compiler",
                    err.code(),
                    &err.to_string(),
                    String::new(),
                );
            }
        };

        // PLAN -> EXECUTE and run everything up to the validator.
        if let Err(message) = self.advance(&mut fsm, &mut doc, ControllerState::Execute) {
            return self.fail(
                &mut fsm,
                Some(&mut doc),
                &task_id,
                trace,
                run_started,
                "controller",
                "io_error",
                &message,
                String::new(),
            );
        }

        let router = RouterNode;
        let context_builder =
            ContextBuilderNode::new(&self.memory, self.settings.max_transcript_messages, self.settings.context_cache_ttl_seconds)
                .with_cache(self.cache.as_deref())
                .with_retriever(self.retriever.as_deref());
        let llm_worker =
            LlmWorkerNode::new(self.model.as_ref(), &self.memory, self.max_completion_tokens);
        let tool_call_node = ToolCallNode::new(
            &self.registry,
            &self.sandbox,
            &self.memory,
            self.settings.tool_cache_ttl_seconds,
        )
        .with_cache(self.cache.as_deref())
        .with_privacy(self.privacy.as_deref());
        let validator = ValidatorNode::new(&self.memory, &self.settings.validator);

        let mut node_registry: BTreeMap<String, &dyn WorkflowNode> = BTreeMap::new();
        node_registry.insert("router".to_string(), &router);
        node_registry.insert("context_builder".to_string(), &context_builder);
        node_registry.insert("llm_worker".to_string(), &llm_worker);
        node_registry.insert("tool_call".to_string(), &tool_call_node);
        node_registry.insert("validator".to_string(), &validator);

        let validator_position = order
            .iter()
            .position(|node_id| node_id == "validator")
            .unwrap_or(order.len());
        let (execute_order, validate_order) = order.split_at(validator_position);

        let mut context = NodeContext::new(&task_id, turn, &request.user_input);
        context.intent = intent;
        context.tool_call = request.tool_call.clone();

        let (context, events) = execute_nodes(
            execute_order,
            &node_registry,
            context,
            run_started,
            request.deadline,
        );
        self.append_node_events(&task_id, ControllerState::Execute, &events, &mut trace);
        if let Some(failure) = context.node_error.clone() {
            let node_id = failed_node_id(&events).unwrap_or("execute");
            return self.fail(
                &mut fsm,
                Some(&mut doc),
                &task_id,
                trace,
                run_started,
                node_id,
                &failure.code,
                &failure.message,
                context.llm_output,
            );
        }

        // EXECUTE -> VALIDATE for the validator node.
        if let Err(message) = self.advance(&mut fsm, &mut doc, ControllerState::Validate) {
            return self.fail(
                &mut fsm,
                Some(&mut doc),
                &task_id,
                trace,
                run_started,
                "controller",
                "io_error",
                &message,
                context.llm_output,
            );
        }
        let (context, validate_events) = execute_nodes(
            validate_order,
            &node_registry,
            context,
            run_started,
            request.deadline,
        );
        self.append_node_events(&task_id, ControllerState::Validate, &validate_events, &mut trace);
        if let Some(failure) = context.node_error.clone() {
            let node_id = failed_node_id(&validate_events).unwrap_or("validator");
            return self.fail(
                &mut fsm,
                Some(&mut doc),
                &task_id,
                trace,
                run_started,
                node_id,
                &failure.code,
                &failure.message,
                context.llm_output,
            );
        }

        // VALIDATE -> COMMIT persists, COMMIT -> ARCHIVE snapshots.
        for target in [ControllerState::Commit, ControllerState::Archive] {
            if let Err(message) = self.advance(&mut fsm, &mut doc, target) {
                return self.fail(
                    &mut fsm,
                    Some(&mut doc),
                    &task_id,
                    trace,
                    run_started,
                    "controller",
                    "io_error",
                    &message,
                    context.llm_output.clone(),
                );
            }
        }

        let total_elapsed_ns = elapsed_ns_since(run_started);
        trace.push(TraceEvent::latency_baseline(
            total_elapsed_ns,
            ControllerState::Archive.as_str(),
        ));

        let snapshot = json!({
            "task_id": doc.task_id.clone(),
            "goal": doc.goal.clone(),
            "status": doc.status.clone(),
            "turn": doc.turn,
            "messages": doc.messages.clone(),
            "workflow_graph": doc.workflow_graph.clone(),
            "llm_output": context.llm_output.clone(),
            "trace": canonical_trace(&trace),
        });
        if let Err(err) = self.memory.working.write_archive(&task_id, &snapshot) {
            return self.fail(
                &mut fsm,
                Some(&mut doc),
                &task_id,
                trace,
                run_started,
                "controller",
                err.code(),
                &err.to_string(),
                context.llm_output,
            );
        }

        RunOutcome {
            task_id,
            final_state: fsm.current(),
            archived: true,
            llm_output: context.llm_output,
            error: None,
            trace,
        }
    }

    /// Side channel: component availability without running a task.
    pub fn health(&self) -> HealthReport {
        let mut components = BTreeMap::new();

        let llm_ok = self.model.available();
        components.insert(
            "llm".to_string(),
            if llm_ok { "ok" } else { "unavailable" }.to_string(),
        );

        let cache_state = match &self.cache {
            None => "absent".to_string(),
            Some(cache) => {
                let health = cache.health();
                if !health.enabled {
                    "disabled".to_string()
                } else if health.connected {
                    "ok".to_string()
                } else {
                    "degraded".to_string()
                }
            }
        };
        components.insert("cache".to_string(), cache_state);

        let semantic_ok = self.memory.semantic.search_text("health probe", 1).is_ok();
        components.insert(
            "semantic".to_string(),
            if semantic_ok { "ok" } else { "degraded" }.to_string(),
        );

        let episodic_ok = self.memory.episodic.list_decisions("health-probe").is_ok();
        components.insert(
            "episodic".to_string(),
            if episodic_ok { "ok" } else { "degraded" }.to_string(),
        );

        let status = if llm_ok && semantic_ok && episodic_ok {
            HealthStatus::Ok
        } else {
            HealthStatus::Degraded
        };
        HealthReport { status, components }
    }

    /// Load the task document or create it; archived tasks get a fresh
    /// turn on the retained transcript. The user message is appended
    /// before any transition happens.
    fn resolve_working_doc(
        &self,
        task_id: &str,
        user_input: &str,
    ) -> Result<WorkingStateDoc, String> {
        let lifecycle_steps = || {
            vec![
                ControllerState::Plan.as_str().to_string(),
                ControllerState::Execute.as_str().to_string(),
                ControllerState::Validate.as_str().to_string(),
                ControllerState::Commit.as_str().to_string(),
                ControllerState::Archive.as_str().to_string(),
            ]
        };

        let mut doc = match self.memory.working.load(task_id) {
            Ok(Some(mut existing)) => {
                existing.status = ControllerState::Init.as_str().to_string();
                existing.turn += 1;
                existing.current_step = 0;
                existing.completed_steps = Vec::new();
                existing.next_steps = lifecycle_steps();
                existing
            }
            Ok(None) => {
                let mut fresh = WorkingStateDoc::new(
                    task_id,
                    "Process user input through deterministic workflow",
                    lifecycle_steps(),
                );
                fresh.turn = 1;
                fresh
            }
            Err(err) => return Err(err.to_string()),
        };

        self.memory
            .working
            .save(&doc)
            .map_err(|err| err.to_string())?;
        doc = self
            .memory
            .append_message(task_id, MessageRole::User, user_input)
            .map_err(|err| err.to_string())?;
        Ok(doc)
    }

    /// One FSM transition: advance, persist status, append exactly one
    /// decision row.
    fn advance(
        &self,
        fsm: &mut Fsm,
        doc: &mut WorkingStateDoc,
        target: ControllerState,
    ) -> Result<(), String> {
        fsm.transition(target).map_err(|err| err.to_string())?;
        doc.status = target.as_str().to_string();
        doc.current_step += 1;
        doc.completed_steps.push(target.as_str().to_string());
        doc.next_steps.retain(|step| step != target.as_str());
        self.memory.working.save(doc).map_err(|err| err.to_string())?;
        self.memory
            .record_decision(
                &doc.task_id,
                action_for(target),
                target.as_str(),
                DecisionStatus::Ok,
            )
            .map_err(|err| err.to_string())?;
        Ok(())
    }

    /// Node events become trace entries and `node` decision rows whose
    /// content is the canonical event JSON.
    fn append_node_events(
        &self,
        task_id: &str,
        state: ControllerState,
        events: &[NodeEvent],
        trace: &mut Vec<TraceEvent>,
    ) {
        for event in events {
            let trace_event = TraceEvent {
                controller_state: state.as_str().to_string(),
                event_type: event.kind.as_str().to_string(),
                node_id: event.node_id.clone(),
                node_type: event.node_type.as_str().to_string(),
                success: event.success,
                error_code: event.error_code.clone(),
                elapsed_ns: event.elapsed_ns,
                start_offset_ns: event.start_offset_ns,
            };
            let status = if event.success {
                DecisionStatus::Ok
            } else {
                DecisionStatus::Err
            };
            let _ = self.memory.record_decision(
                task_id,
                ActionType::Node,
                &dumps_json(&canonical_event(&trace_event)),
                status,
            );
            trace.push(trace_event);
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn fail(
        &self,
        fsm: &mut Fsm,
        doc: Option<&mut WorkingStateDoc>,
        task_id: &str,
        mut trace: Vec<TraceEvent>,
        run_started: Instant,
        node_id: &str,
        code: &str,
        message: &str,
        llm_output: String,
    ) -> RunOutcome {
        if fsm.can_transition(ControllerState::Failed) {
            let _ = fsm.transition(ControllerState::Failed);
        }
        if let Some(doc) = doc {
            doc.status = ControllerState::Failed.as_str().to_string();
            let _ = self.memory.working.save(doc);
        }
        let _ = self.memory.record_decision(
            task_id,
            ActionType::Error,
            &format!("node={node_id} code={code}: {message}"),
            DecisionStatus::Err,
        );
        trace.push(TraceEvent::latency_baseline(
            elapsed_ns_since(run_started),
            ControllerState::Failed.as_str(),
        ));

        let llm_output = if llm_output.trim().is_empty() {
            format!("{code}: {message}")
        } else {
            llm_output
        };
        RunOutcome {
            task_id: task_id.to_string(),
            final_state: fsm.current(),
            archived: false,
            llm_output,
            error: Some(format!("{code}: {message}")),
            trace,
        }
    }
}

fn action_for(state: ControllerState) -> ActionType {
    match state {
        ControllerState::Init | ControllerState::Plan | ControllerState::Execute => {
            ActionType::Plan
        }
        ControllerState::Validate => ActionType::Validate,
        ControllerState::Commit | ControllerState::Archive => ActionType::Archive,
        ControllerState::Failed => ActionType::Error,
    }
}

fn failed_node_id(events: &[NodeEvent]) -> Option<&str> {
    events
        .iter()
        .rev()
        .find(|event| !event.success)
        .map(|event| event.node_id.as_str())
}

fn elapsed_ns_since(instant: Instant) -> u64 {
    u64::try_from(instant.elapsed().as_nanos()).unwrap_or(u64::MAX)
}
