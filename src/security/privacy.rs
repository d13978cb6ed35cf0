use super::audit::AuditLog;
use super::redactor::{PiiRedactor, RedactionMode};
use crate::shared::dumps_json;
use serde_json::{Map, Value};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
#[error("external call blocked by policy for tool `{tool_name}`")]
pub struct ExternalCallDenied {
    pub tool_name: String,
}

impl ExternalCallDenied {
    pub fn code(&self) -> &'static str {
        "permission_denied"
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedExternalCall {
    pub payload_text: String,
    pub pii_detected: bool,
    pub pii_types: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultScan {
    pub redacted_text: String,
    pub pii_detected: bool,
    pub pii_types: Vec<String>,
}

/// Policy gate in front of every external tool call: deny unless
/// explicitly allowed, scan payloads for PII, and leave an audit trail.
/// The wrapper never sees or stores raw PII beyond the scan itself.
pub struct PrivacyWrapper {
    redactor: PiiRedactor,
    audit: Arc<AuditLog>,
    redaction_mode: RedactionMode,
}

impl PrivacyWrapper {
    pub fn new(redactor: PiiRedactor, audit: Arc<AuditLog>, redaction_mode: RedactionMode) -> Self {
        Self {
            redactor,
            audit,
            redaction_mode,
        }
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    /// Fail-closed external gate. Denial is audited and returned as a
    /// structured error; on allow the payload is scanned and the
    /// redacted form prepared for the wire.
    pub fn evaluate_external_call(
        &self,
        tool_name: &str,
        payload: &Map<String, Value>,
        allow_external: bool,
        task_id: Option<&str>,
    ) -> Result<PreparedExternalCall, ExternalCallDenied> {
        if !allow_external {
            self.audit.permission_denied(
                &format!("external_call:{tool_name}"),
                "allow_external_false",
                task_id,
            );
            return Err(ExternalCallDenied {
                tool_name: tool_name.to_string(),
            });
        }

        let payload_text = dumps_json(&Value::Object(payload.clone()));
        let outcome = self.redactor.redact(&payload_text, self.redaction_mode);

        if outcome.pii_detected {
            self.audit
                .pii_detected(&outcome.summary.types, &outcome.redacted, task_id);
        }
        self.audit
            .external_call_initiated(tool_name, &outcome.redacted, task_id);

        Ok(PreparedExternalCall {
            payload_text: outcome.redacted,
            pii_detected: outcome.pii_detected,
            pii_types: outcome.summary.types,
        })
    }

    /// Scan a tool result. The caller keeps the raw value; the redacted
    /// representation travels alongside it.
    pub fn scan_result(&self, tool_name: &str, result: &Value, task_id: Option<&str>) -> ResultScan {
        let result_text = dumps_json(result);
        let outcome = self.redactor.redact(&result_text, self.redaction_mode);
        if outcome.pii_detected {
            self.audit.append(&super::audit::AuditEvent {
                event_type: super::audit::AuditEventType::PiiRedacted,
                severity: super::audit::Severity::Warning,
                task_id: task_id.map(|v| v.to_string()),
                context: Map::from_iter([
                    ("tool_name".to_string(), Value::String(tool_name.to_string())),
                    ("phase".to_string(), Value::String("output".to_string())),
                    (
                        "mode".to_string(),
                        Value::String(mode_label(self.redaction_mode).to_string()),
                    ),
                    (
                        "pii_types".to_string(),
                        Value::Array(
                            outcome
                                .summary
                                .types
                                .iter()
                                .cloned()
                                .map(Value::String)
                                .collect(),
                        ),
                    ),
                    (
                        "total".to_string(),
                        Value::Number(serde_json::Number::from(outcome.summary.total)),
                    ),
                ]),
            });
        }
        ResultScan {
            redacted_text: outcome.redacted,
            pii_detected: outcome.pii_detected,
            pii_types: outcome.summary.types,
        }
    }
}

fn mode_label(mode: RedactionMode) -> &'static str {
    match mode {
        RedactionMode::Partial => "partial",
        RedactionMode::Strict => "strict",
    }
}
