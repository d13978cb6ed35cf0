use chrono::{SecondsFormat, Utc};
use serde_json::{json, Map, Value};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

const CONTEXT_SNIPPET_LIMIT: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditEventType {
    PiiDetected,
    PiiRedacted,
    ExternalCallInitiated,
    PermissionDenied,
}

impl AuditEventType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PiiDetected => "pii_detected",
            Self::PiiRedacted => "pii_redacted",
            Self::ExternalCallInitiated => "external_call_initiated",
            Self::PermissionDenied => "permission_denied",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AuditEvent {
    pub event_type: AuditEventType,
    pub severity: Severity,
    pub task_id: Option<String>,
    pub context: Map<String, Value>,
}

/// Append-only JSONL security log, one event per line, flushed after
/// each write. Auditing is an optimization: write failures are silent and
/// never block the primary computation. Context values carry only
/// summaries, never raw PII.
pub struct AuditLog {
    path: PathBuf,
    enabled: bool,
}

impl AuditLog {
    pub fn new(path: &Path, enabled: bool) -> Self {
        Self {
            path: path.to_path_buf(),
            enabled,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, event: &AuditEvent) {
        if !self.enabled {
            return;
        }
        let mut payload = Map::new();
        payload.insert(
            "event_type".to_string(),
            Value::String(event.event_type.as_str().to_string()),
        );
        payload.insert(
            "timestamp".to_string(),
            Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)),
        );
        payload.insert(
            "severity".to_string(),
            Value::String(event.severity.as_str().to_string()),
        );
        if let Some(task_id) = &event.task_id {
            payload.insert("task_id".to_string(), Value::String(task_id.clone()));
        }
        payload.insert("context".to_string(), Value::Object(event.context.clone()));

        let _ = self.write_line(&Value::Object(payload));
    }

    fn write_line(&self, payload: &Value) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{payload}")?;
        file.flush()
    }

    pub fn pii_detected(&self, pii_types: &[String], context_snippet: &str, task_id: Option<&str>) {
        self.append(&AuditEvent {
            event_type: AuditEventType::PiiDetected,
            severity: Severity::Warning,
            task_id: task_id.map(|v| v.to_string()),
            context: Map::from_iter([
                (
                    "pii_types".to_string(),
                    Value::Array(pii_types.iter().cloned().map(Value::String).collect()),
                ),
                (
                    "context_snippet".to_string(),
                    Value::String(truncate_snippet(context_snippet)),
                ),
            ]),
        });
    }

    pub fn pii_redacted(
        &self,
        pii_types: &[String],
        total: usize,
        mode: &str,
        task_id: Option<&str>,
    ) {
        self.append(&AuditEvent {
            event_type: AuditEventType::PiiRedacted,
            severity: Severity::Warning,
            task_id: task_id.map(|v| v.to_string()),
            context: Map::from_iter([
                (
                    "pii_types".to_string(),
                    Value::Array(pii_types.iter().cloned().map(Value::String).collect()),
                ),
                ("total".to_string(), json!(total)),
                ("mode".to_string(), Value::String(mode.to_string())),
            ]),
        });
    }

    pub fn external_call_initiated(
        &self,
        tool_name: &str,
        redacted_payload_snippet: &str,
        task_id: Option<&str>,
    ) {
        self.append(&AuditEvent {
            event_type: AuditEventType::ExternalCallInitiated,
            severity: Severity::Info,
            task_id: task_id.map(|v| v.to_string()),
            context: Map::from_iter([
                ("tool_name".to_string(), Value::String(tool_name.to_string())),
                (
                    "redacted_payload".to_string(),
                    Value::String(truncate_snippet(redacted_payload_snippet)),
                ),
            ]),
        });
    }

    pub fn permission_denied(&self, operation: &str, reason: &str, task_id: Option<&str>) {
        self.append(&AuditEvent {
            event_type: AuditEventType::PermissionDenied,
            severity: Severity::Warning,
            task_id: task_id.map(|v| v.to_string()),
            context: Map::from_iter([
                ("operation".to_string(), Value::String(operation.to_string())),
                ("reason".to_string(), Value::String(reason.to_string())),
            ]),
        });
    }

    /// Parse events back from the JSONL file; unreadable lines skipped.
    pub fn read_events(&self, event_type: Option<AuditEventType>) -> Vec<Value> {
        let Ok(raw) = fs::read_to_string(&self.path) else {
            return Vec::new();
        };
        raw.lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| serde_json::from_str::<Value>(line).ok())
            .filter(|event| match event_type {
                Some(wanted) => event
                    .get("event_type")
                    .and_then(Value::as_str)
                    .map(|found| found == wanted.as_str())
                    .unwrap_or(false),
                None => true,
            })
            .collect()
    }
}

fn truncate_snippet(snippet: &str) -> String {
    if snippet.chars().count() <= CONTEXT_SNIPPET_LIMIT {
        return snippet.to_string();
    }
    let truncated = snippet.chars().take(CONTEXT_SNIPPET_LIMIT).collect::<String>();
    format!("{truncated}...")
}
