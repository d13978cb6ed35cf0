use jarvis_core::cache::{CacheClient, MemoryCacheStore};
use jarvis_core::security::{AuditLog, AuditEventType, PiiRedactor, PrivacyWrapper, RedactionMode};
use jarvis_core::tools::{
    execute_tool, register_core_file_tools, ExecutionOptions, FieldSpec, PermissionTier, Sandbox,
    SandboxConfig, ToolRegistry, ToolRequest, ToolSchema,
};
use serde_json::{json, Map, Value};
use std::fs;
use std::sync::Arc;
use tempfile::tempdir;

fn payload(pairs: &[(&str, Value)]) -> Map<String, Value> {
    pairs
        .iter()
        .map(|(key, value)| (key.to_string(), value.clone()))
        .collect()
}

fn setup(dir: &tempfile::TempDir) -> (ToolRegistry, Sandbox) {
    let mut registry = ToolRegistry::new();
    register_core_file_tools(&mut registry).expect("register file tools");
    let sandbox = Sandbox::new(
        SandboxConfig::read_only(vec![dir.path().to_path_buf()])
            .with_write(true)
            .with_delete(true),
    )
    .expect("sandbox");
    (registry, sandbox)
}

fn register_web_search(registry: &mut ToolRegistry) {
    registry
        .register(
            ToolSchema {
                name: "web_search".to_string(),
                description: "Search the web through an external provider".to_string(),
                permission_tier: PermissionTier::ReadOnly,
                external: true,
                fields: vec![FieldSpec::string("query", true)],
            },
            Some(Box::new(|_sandbox, payload| {
                let query = payload
                    .get("query")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                Ok(json!({ "query": query, "results": ["stub result"] }))
            })),
        )
        .expect("register web_search");
}

#[test]
fn unknown_tool_and_bad_payload_use_stable_codes() {
    let dir = tempdir().expect("tempdir");
    let (registry, sandbox) = setup(&dir);

    let err = execute_tool(
        &registry,
        &sandbox,
        &ToolRequest {
            tool_name: "no_such_tool".to_string(),
            payload: Map::new(),
        },
        ExecutionOptions::default(),
    )
    .expect_err("unknown tool");
    assert_eq!(err.code(), "tool_not_found");

    let err = execute_tool(
        &registry,
        &sandbox,
        &ToolRequest {
            tool_name: "read_file".to_string(),
            payload: payload(&[("path", json!(42))]),
        },
        ExecutionOptions::default(),
    )
    .expect_err("bad payload");
    assert_eq!(err.code(), "validation_error");

    let err = execute_tool(
        &registry,
        &sandbox,
        &ToolRequest {
            tool_name: "read_file".to_string(),
            payload: payload(&[("path", json!("x")), ("extra", json!(true))]),
        },
        ExecutionOptions::default(),
    )
    .expect_err("unknown field");
    assert_eq!(err.code(), "validation_error");
}

#[test]
fn write_safe_is_deny_by_default_and_opt_in() {
    let dir = tempdir().expect("tempdir");
    let (registry, sandbox) = setup(&dir);
    let request = ToolRequest {
        tool_name: "write_file".to_string(),
        payload: payload(&[("path", json!("out.txt")), ("content", json!("data"))]),
    };

    let err = execute_tool(&registry, &sandbox, &request, ExecutionOptions::default())
        .expect_err("write denied by default");
    assert_eq!(err.code(), "permission_denied");
    assert!(!dir.path().join("out.txt").exists());

    let output = execute_tool(
        &registry,
        &sandbox,
        &request,
        ExecutionOptions {
            allow_write_safe: true,
            ..Default::default()
        },
    )
    .expect("write allowed when opted in");
    assert!(!output.cache_hit);
    assert!(dir.path().join("out.txt").exists());
}

#[test]
fn sandbox_guard_reaches_the_caller_as_path_not_allowed() {
    let dir = tempdir().expect("tempdir");
    let (registry, sandbox) = setup(&dir);

    let err = execute_tool(
        &registry,
        &sandbox,
        &ToolRequest {
            tool_name: "read_file".to_string(),
            payload: payload(&[("path", json!("/etc/passwd"))]),
        },
        ExecutionOptions::default(),
    )
    .expect_err("outside sandbox");
    assert_eq!(err.code(), "path_not_allowed");
}

#[test]
fn read_only_calls_cache_and_invalidate_resets() {
    let dir = tempdir().expect("tempdir");
    fs::write(dir.path().join("README.md"), "# readme").expect("seed");
    let (registry, sandbox) = setup(&dir);
    let cache = CacheClient::new(Arc::new(MemoryCacheStore::new()), true, 3600);

    let request = ToolRequest {
        tool_name: "read_file".to_string(),
        payload: payload(&[("path", json!("README.md"))]),
    };
    let options = ExecutionOptions {
        cache: Some(&cache),
        ..Default::default()
    };

    let first = execute_tool(&registry, &sandbox, &request, options).expect("first call");
    assert!(!first.cache_hit);

    let second = execute_tool(&registry, &sandbox, &request, options).expect("second call");
    assert!(second.cache_hit);
    assert_eq!(first.value, second.value);

    let invalidated = cache.invalidate_pattern("tool:v1:*");
    assert!(invalidated >= 1);

    let third = execute_tool(&registry, &sandbox, &request, options).expect("third call");
    assert!(!third.cache_hit);
    assert_eq!(third.value, first.value);
}

#[test]
fn write_safe_results_are_never_cached() {
    let dir = tempdir().expect("tempdir");
    let (registry, sandbox) = setup(&dir);
    let cache = CacheClient::new(Arc::new(MemoryCacheStore::new()), true, 3600);

    let request = ToolRequest {
        tool_name: "write_file".to_string(),
        payload: payload(&[("path", json!("w.txt")), ("content", json!("x"))]),
    };
    let options = ExecutionOptions {
        allow_write_safe: true,
        cache: Some(&cache),
        ..Default::default()
    };
    execute_tool(&registry, &sandbox, &request, options).expect("first write");
    let second = execute_tool(&registry, &sandbox, &request, options).expect("second write");
    assert!(!second.cache_hit);
}

#[test]
fn external_calls_are_gated_and_privacy_wrapped() {
    let dir = tempdir().expect("tempdir");
    let (mut registry, sandbox) = setup(&dir);
    register_web_search(&mut registry);

    let audit = Arc::new(AuditLog::new(&dir.path().join("logs/security_audit.jsonl"), true));
    let privacy = PrivacyWrapper::new(PiiRedactor::new(), audit.clone(), RedactionMode::Strict);

    let request = ToolRequest {
        tool_name: "web_search".to_string(),
        payload: payload(&[("query", json!("user@example.com"))]),
    };

    // No wrapper at all is a configuration error.
    let err = execute_tool(&registry, &sandbox, &request, ExecutionOptions::default())
        .expect_err("external without wrapper");
    assert_eq!(err.code(), "configuration_error");

    // Wrapper present but external not allowed: denied and audited.
    let err = execute_tool(
        &registry,
        &sandbox,
        &request,
        ExecutionOptions {
            privacy: Some(&privacy),
            ..Default::default()
        },
    )
    .expect_err("external denied");
    assert_eq!(err.code(), "permission_denied");
    let denials = audit.read_events(Some(AuditEventType::PermissionDenied));
    assert_eq!(denials.len(), 1);

    // Allowed: value is raw, the redacted representation is scrubbed.
    let output = execute_tool(
        &registry,
        &sandbox,
        &request,
        ExecutionOptions {
            allow_external: true,
            privacy: Some(&privacy),
            ..Default::default()
        },
    )
    .expect("external allowed");
    assert_eq!(output.value["query"], "user@example.com");
    let privacy_summary = output.privacy.expect("privacy summary");
    assert!(privacy_summary.pii_detected);
    assert_eq!(privacy_summary.types, vec!["email".to_string()]);
    let redacted = output.redacted_result_text.expect("redacted text");
    assert!(!redacted.contains("user@example.com"));
    assert!(redacted.contains("[REDACTED:EMAIL]"));

    let initiated = audit.read_events(Some(AuditEventType::ExternalCallInitiated));
    assert_eq!(initiated.len(), 1);
    let detected = audit.read_events(Some(AuditEventType::PiiDetected));
    assert_eq!(detected.len(), 1);
    assert_eq!(detected[0]["context"]["pii_types"], json!(["email"]));
}

#[test]
fn unimplemented_tools_report_tool_not_implemented() {
    let dir = tempdir().expect("tempdir");
    let (mut registry, sandbox) = setup(&dir);
    registry
        .register(
            ToolSchema {
                name: "future_tool".to_string(),
                description: "Registered without a handler".to_string(),
                permission_tier: PermissionTier::ReadOnly,
                external: false,
                fields: Vec::new(),
            },
            None,
        )
        .expect("register");

    let err = execute_tool(
        &registry,
        &sandbox,
        &ToolRequest {
            tool_name: "future_tool".to_string(),
            payload: Map::new(),
        },
        ExecutionOptions::default(),
    )
    .expect_err("no handler");
    assert_eq!(err.code(), "tool_not_implemented");
}

#[test]
fn schema_export_is_deterministic_and_sorted() {
    let dir = tempdir().expect("tempdir");
    let (registry, _sandbox) = setup(&dir);

    let schemas = registry.export_all_schemas();
    let names = schemas
        .iter()
        .map(|schema| schema["name"].as_str().unwrap_or_default().to_string())
        .collect::<Vec<_>>();
    let mut sorted = names.clone();
    sorted.sort();
    assert_eq!(names, sorted);

    let search = schemas
        .iter()
        .find(|schema| schema["name"] == "search_files")
        .expect("search_files schema");
    let fields = search["fields"].as_array().expect("fields");
    let field_names = fields
        .iter()
        .map(|field| field["name"].as_str().unwrap_or_default().to_string())
        .collect::<Vec<_>>();
    assert_eq!(field_names, vec!["max_results", "pattern", "root"]);
}
