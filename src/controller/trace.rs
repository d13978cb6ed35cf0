use serde::Serialize;
use serde_json::{json, Value};

pub const LATENCY_BASELINE_EVENT: &str = "latency_baseline";
pub const LATENCY_BASELINE_NODE_ID: &str = "controller_latency_baseline_total_elapsed_ns";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceEvent {
    pub controller_state: String,
    pub event_type: String,
    pub node_id: String,
    pub node_type: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    pub elapsed_ns: u64,
    pub start_offset_ns: u64,
}

impl TraceEvent {
    pub fn latency_baseline(total_elapsed_ns: u64, final_state: &str) -> Self {
        Self {
            controller_state: final_state.to_string(),
            event_type: LATENCY_BASELINE_EVENT.to_string(),
            node_id: LATENCY_BASELINE_NODE_ID.to_string(),
            node_type: "controller".to_string(),
            success: true,
            error_code: None,
            elapsed_ns: total_elapsed_ns,
            start_offset_ns: 0,
        }
    }
}

/// Canonical form for determinism comparisons: volatile fields
/// (timings) dropped, stable fields kept, `error_present` derived.
pub fn canonical_event(event: &TraceEvent) -> Value {
    json!({
        "controller_state": event.controller_state,
        "event_type": event.event_type,
        "node_id": event.node_id,
        "node_type": event.node_type,
        "success": event.success,
        "error_present": event.error_code.is_some(),
        "error_code": event.error_code.clone(),
    })
}

pub fn canonical_trace(events: &[TraceEvent]) -> Vec<Value> {
    events.iter().map(canonical_event).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::dumps_json;

    #[test]
    fn canonicalization_drops_timings_and_keeps_identity() {
        let fast = TraceEvent {
            controller_state: "EXECUTE".to_string(),
            event_type: "node_end".to_string(),
            node_id: "router".to_string(),
            node_type: "router".to_string(),
            success: true,
            error_code: None,
            elapsed_ns: 1200,
            start_offset_ns: 40,
        };
        let slow = TraceEvent {
            elapsed_ns: 998_877,
            start_offset_ns: 665_544,
            ..fast.clone()
        };
        assert_eq!(
            dumps_json(&canonical_event(&fast)),
            dumps_json(&canonical_event(&slow))
        );
    }

    #[test]
    fn error_presence_is_explicit_in_canonical_form() {
        let event = TraceEvent {
            controller_state: "EXECUTE".to_string(),
            event_type: "node_error".to_string(),
            node_id: "llm_worker".to_string(),
            node_type: "llm_worker".to_string(),
            success: false,
            error_code: Some("llm_unavailable".to_string()),
            elapsed_ns: 5,
            start_offset_ns: 10,
        };
        let canonical = canonical_event(&event);
        assert_eq!(canonical["error_present"], true);
        assert_eq!(canonical["error_code"], "llm_unavailable");
    }
}
