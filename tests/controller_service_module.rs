use jarvis_core::config::Settings;
use jarvis_core::controller::{canonical_trace, Controller, HealthStatus, RunRequest};
use jarvis_core::llm::{LanguageModel, LlmError, ScriptedModel, UnavailableModel};
use jarvis_core::memory::{ActionType, DataPaths, HashingEmbedder, MemoryManager};
use jarvis_core::retrieval::{HybridRetriever, RetrievalConfig};
use jarvis_core::shared::dumps_json;
use jarvis_core::tools::{register_core_file_tools, Sandbox, SandboxConfig, ToolRegistry};
use jarvis_core::workflow::ToolCallSpec;
use jarvis_core::controller::ControllerState;
use serde_json::{json, Map, Value};
use std::fs;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tempfile::tempdir;

struct Harness {
    controller: Controller,
    memory: MemoryManager,
    data: DataPaths,
    _dir: tempfile::TempDir,
}

fn harness_with(model: Arc<dyn LanguageModel>) -> Harness {
    let dir = tempdir().expect("tempdir");
    let data = DataPaths::from_data_root(&dir.path().join("data"));
    let memory = MemoryManager::open_at(&data, Arc::new(HashingEmbedder::default()), 50)
        .expect("memory manager");

    let mut registry = ToolRegistry::new();
    register_core_file_tools(&mut registry).expect("register tools");
    let sandbox = Sandbox::new(SandboxConfig::read_only(vec![dir.path().to_path_buf()]))
        .expect("sandbox");

    let controller = Controller::new(
        Settings::default(),
        memory.clone(),
        model,
        Arc::new(registry),
        Arc::new(sandbox),
    );
    Harness {
        controller,
        memory,
        data,
        _dir: dir,
    }
}

struct RecordingModel {
    prompts: Mutex<Vec<String>>,
    response: String,
}

impl RecordingModel {
    fn new(response: &str) -> Self {
        Self {
            prompts: Mutex::new(Vec::new()),
            response: response.to_string(),
        }
    }
}

impl LanguageModel for RecordingModel {
    fn generate(
        &self,
        prompt: &str,
        _stop_tokens: &[String],
        _max_tokens: usize,
    ) -> Result<String, LlmError> {
        self.prompts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(prompt.to_string());
        Ok(self.response.clone())
    }
}

#[test]
fn round_trip_recall_across_two_turns() {
    let model = Arc::new(ScriptedModel::with_responses(
        vec!["Okay, noted.".to_string(), "Alice".to_string()],
        "fallback",
    ));
    let harness = harness_with(model);

    let first = harness
        .controller
        .run(&RunRequest::from_input("My name is Alice."));
    assert_eq!(first.final_state, ControllerState::Archive);
    assert!(first.archived);
    assert!(first.error.is_none());
    assert!(first.task_id.starts_with("task-"));

    let second = harness.controller.run(
        &RunRequest::from_input("What is my name? Reply with only the name.")
            .with_task_id(&first.task_id),
    );
    assert_eq!(second.final_state, ControllerState::Archive);
    assert_eq!(second.llm_output, "Alice");
    assert_eq!(second.task_id, first.task_id);

    let doc = harness
        .memory
        .working
        .load(&first.task_id)
        .expect("load doc")
        .expect("doc present");
    assert_eq!(doc.turn, 2);
    assert_eq!(doc.messages.len(), 4);
    assert_eq!(doc.messages[0].content, "My name is Alice.");
    assert_eq!(doc.messages[3].content, "Alice");
}

#[test]
fn every_transition_appends_exactly_one_decision_row() {
    let model = Arc::new(ScriptedModel::new("All good."));
    let harness = harness_with(model);

    let outcome = harness.controller.run(&RunRequest::from_input("hello there"));
    assert_eq!(outcome.final_state, ControllerState::Archive);

    let rows = harness
        .memory
        .episodic
        .list_decisions(&outcome.task_id)
        .expect("list decisions");
    for state in ["PLAN", "EXECUTE", "VALIDATE", "COMMIT", "ARCHIVE"] {
        let count = rows.iter().filter(|row| row.content == state).count();
        assert_eq!(count, 1, "expected one decision row for {state}");
    }
    assert!(!rows.iter().any(|row| row.action_type == ActionType::Error));

    // Node events land as `node` decision rows, one per trace event.
    let node_rows = rows
        .iter()
        .filter(|row| row.action_type == ActionType::Node)
        .count();
    let node_events = outcome
        .trace
        .iter()
        .filter(|event| event.event_type.starts_with("node_"))
        .count();
    assert_eq!(node_rows, node_events);

    // Ids are monotone in trace order.
    let ids = rows.iter().map(|row| row.id).collect::<Vec<_>>();
    let mut sorted = ids.clone();
    sorted.sort();
    assert_eq!(ids, sorted);
}

#[test]
fn identical_inputs_yield_identical_canonical_graphs_and_traces() {
    let model = Arc::new(ScriptedModel::with_responses(
        vec!["Two.".to_string(), "Two.".to_string()],
        "Two.",
    ));
    let harness = harness_with(model);

    let first = harness.controller.run(&RunRequest::from_input("one-plus-one"));
    let second = harness.controller.run(&RunRequest::from_input("one-plus-one"));
    assert_eq!(first.final_state, ControllerState::Archive);
    assert_eq!(second.final_state, ControllerState::Archive);
    assert_ne!(first.task_id, second.task_id);

    let graph_of = |task_id: &str| -> Value {
        harness
            .memory
            .working
            .load_archive(task_id)
            .expect("load archive")
            .expect("archive present")["workflow_graph"]
            .clone()
    };
    assert_eq!(
        dumps_json(&graph_of(&first.task_id)),
        dumps_json(&graph_of(&second.task_id))
    );

    let first_canonical = canonical_trace(&first.trace);
    let second_canonical = canonical_trace(&second.trace);
    assert_eq!(
        dumps_json(&Value::Array(first_canonical)),
        dumps_json(&Value::Array(second_canonical))
    );

    // Latency tolerance: drift bounded by max(2 ms, 10% of the larger run).
    let total = |trace: &[jarvis_core::controller::TraceEvent]| {
        trace
            .last()
            .expect("latency baseline present")
            .elapsed_ns
    };
    let (a, b) = (total(&first.trace), total(&second.trace));
    let drift = a.abs_diff(b);
    let bound = std::cmp::max(2_000_000, (std::cmp::max(a, b) as f64 * 0.1) as u64);
    assert!(drift <= bound, "latency drift {drift} over bound {bound}");
}

#[test]
fn rerun_of_archived_task_never_mutates_the_prior_archive_mid_run() {
    let model = Arc::new(ScriptedModel::with_responses(
        vec!["Done.".to_string(), String::new()],
        "",
    ));
    let harness = harness_with(model);

    let first = harness.controller.run(&RunRequest::from_input("write this down"));
    assert_eq!(first.final_state, ControllerState::Archive);
    let archive_path = harness.data.archives_dir.join(format!("{}.json", first.task_id));
    let before = fs::read(&archive_path).expect("archive bytes");

    // Second turn fails validation (empty model output): FAILED, no archive write.
    let second = harness
        .controller
        .run(&RunRequest::from_input("and again").with_task_id(&first.task_id));
    assert_eq!(second.final_state, ControllerState::Failed);
    assert!(!second.archived);
    let error = second.error.expect("failure error");
    assert!(error.contains("validation_failed"), "error was: {error}");

    let after = fs::read(&archive_path).expect("archive bytes");
    assert_eq!(before, after, "failed run must not touch the archive");

    // The transcript survives, and the failing decision row names node and code.
    let doc = harness
        .memory
        .working
        .load(&first.task_id)
        .expect("load")
        .expect("doc present");
    assert_eq!(doc.turn, 2);
    assert_eq!(doc.status, "FAILED");
    assert!(doc.messages.iter().any(|m| m.content == "write this down"));

    let rows = harness
        .memory
        .episodic
        .list_decisions(&first.task_id)
        .expect("list");
    let failure_row = rows
        .iter()
        .rev()
        .find(|row| row.action_type == ActionType::Error)
        .expect("error decision row");
    assert!(failure_row.content.contains("node=validator"));
    assert!(failure_row.content.contains("code=validation_failed"));
}

#[test]
fn unavailable_model_fails_the_task_like_a_node_error() {
    let harness = harness_with(Arc::new(UnavailableModel));

    let outcome = harness.controller.run(&RunRequest::from_input("hello"));
    assert_eq!(outcome.final_state, ControllerState::Failed);
    assert!(!outcome.archived);
    assert!(outcome.error.expect("error").contains("llm_unavailable"));

    let llm_error = outcome
        .trace
        .iter()
        .find(|event| event.event_type == "node_error")
        .expect("error event");
    assert_eq!(llm_error.node_id, "llm_worker");
    assert_eq!(llm_error.error_code.as_deref(), Some("llm_unavailable"));
}

#[test]
fn expired_deadline_fails_with_deadline_exceeded() {
    let harness = harness_with(Arc::new(ScriptedModel::new("hi")));

    let outcome = harness.controller.run(
        &RunRequest::from_input("slow request").with_deadline(Instant::now()),
    );
    assert_eq!(outcome.final_state, ControllerState::Failed);
    assert!(outcome.error.expect("error").contains("deadline_exceeded"));
}

#[test]
fn tool_call_requests_augment_the_graph_and_log_tool_rows() {
    let model = Arc::new(ScriptedModel::new("Here is the file."));
    let harness = harness_with(model);
    fs::write(harness._dir.path().join("notes.txt"), "sandboxed content").expect("seed");

    let mut payload = Map::new();
    payload.insert("path".to_string(), json!("notes.txt"));
    let outcome = harness.controller.run(
        &RunRequest::from_input("read the notes file").with_tool_call(ToolCallSpec {
            tool_name: "read_file".to_string(),
            payload,
            allow_write_safe: false,
            allow_external: false,
        }),
    );
    assert_eq!(outcome.final_state, ControllerState::Archive);
    assert!(outcome
        .trace
        .iter()
        .any(|event| event.node_id == "tool_call" && event.event_type == "node_end"));

    let rows = harness
        .memory
        .episodic
        .list_decisions(&outcome.task_id)
        .expect("list");
    let tool_decision = rows
        .iter()
        .find(|row| row.action_type == ActionType::Tool)
        .expect("tool decision row");
    let calls = harness
        .memory
        .episodic
        .list_tool_calls(tool_decision.id)
        .expect("tool calls");
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].tool_name, "read_file");
    assert!(calls[0].result.contains("sandboxed content"));
}

#[test]
fn denied_tool_call_fails_the_task_closed() {
    let model = Arc::new(ScriptedModel::new("irrelevant"));
    let harness = harness_with(model);

    let mut payload = Map::new();
    payload.insert("path".to_string(), json!("out.txt"));
    payload.insert("content".to_string(), json!("data"));
    let outcome = harness.controller.run(
        &RunRequest::from_input("write the file").with_tool_call(ToolCallSpec {
            tool_name: "write_file".to_string(),
            payload,
            allow_write_safe: false,
            allow_external: false,
        }),
    );
    assert_eq!(outcome.final_state, ControllerState::Failed);
    assert!(outcome
        .error
        .expect("error")
        .contains("permission_denied"));
    assert!(!harness._dir.path().join("out.txt").exists());
}

#[test]
fn retriever_inserts_retrieved_context_into_the_prompt() {
    let model = Arc::new(RecordingModel::new("The answer is 42."));
    let dir = tempdir().expect("tempdir");
    let data = DataPaths::from_data_root(&dir.path().join("data"));
    let memory = MemoryManager::open_at(&data, Arc::new(HashingEmbedder::default()), 50)
        .expect("memory manager");
    memory
        .semantic
        .add("The answer to everything is 42", &json!({}))
        .expect("seed semantic");

    let mut registry = ToolRegistry::new();
    register_core_file_tools(&mut registry).expect("register tools");
    let sandbox = Sandbox::new(SandboxConfig::read_only(vec![dir.path().to_path_buf()]))
        .expect("sandbox");
    let retriever = HybridRetriever::new(
        memory.working.clone(),
        memory.semantic.clone(),
        memory.episodic.clone(),
        RetrievalConfig::default(),
    )
    .expect("retriever");

    let controller = Controller::new(
        Settings::default(),
        memory.clone(),
        model.clone(),
        Arc::new(registry),
        Arc::new(sandbox),
    )
    .with_retriever(Arc::new(retriever));

    let outcome = controller.run(&RunRequest::from_input("what is the answer to everything"));
    assert_eq!(outcome.final_state, ControllerState::Archive);

    let prompts = model.prompts.lock().expect("prompts");
    let prompt = prompts.first().expect("one prompt");
    assert!(prompt.contains("Retrieved Context:"), "prompt: {prompt}");
    assert!(prompt.contains("[semantic] score="));
}

#[test]
fn invalid_supplied_task_ids_fail_before_any_state_is_created() {
    let harness = harness_with(Arc::new(ScriptedModel::new("hi")));
    let outcome = harness
        .controller
        .run(&RunRequest::from_input("hello").with_task_id("../../etc/passwd"));
    assert_eq!(outcome.final_state, ControllerState::Failed);
    assert!(outcome.error.expect("error").contains("invalid_argument"));
    assert!(outcome.trace.is_empty());
}

#[test]
fn health_reports_component_states() {
    let healthy = harness_with(Arc::new(ScriptedModel::new("hi")));
    let report = healthy.controller.health();
    assert_eq!(report.status, HealthStatus::Ok);
    assert_eq!(report.components.get("llm").map(String::as_str), Some("ok"));
    assert_eq!(
        report.components.get("cache").map(String::as_str),
        Some("absent")
    );
    assert_eq!(
        report.components.get("semantic").map(String::as_str),
        Some("ok")
    );
    assert_eq!(
        report.components.get("episodic").map(String::as_str),
        Some("ok")
    );

    let degraded = harness_with(Arc::new(UnavailableModel));
    let report = degraded.controller.health();
    assert_eq!(report.status, HealthStatus::Degraded);
    assert_eq!(
        report.components.get("llm").map(String::as_str),
        Some("unavailable")
    );
}
