use super::registry::{PermissionTier, ToolFailure, ToolRegistry};
use super::sandbox::Sandbox;
use crate::cache::{make_cache_key, CacheClient, DEFAULT_MAX_KEY_LENGTH};
use crate::security::PrivacyWrapper;
use serde_json::{json, Map, Value};

pub const DEFAULT_TOOL_CACHE_TTL_SECONDS: u64 = 1800;

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("tool not found: {tool_name}")]
    NotFound { tool_name: String },
    #[error("input validation failed for `{tool_name}`: {errors:?}")]
    Validation {
        tool_name: String,
        errors: Vec<String>,
    },
    #[error("permission denied for `{tool_name}`: requires {required}")]
    PermissionDenied {
        tool_name: String,
        required: &'static str,
    },
    #[error("external tool `{tool_name}` requires a privacy wrapper")]
    Configuration { tool_name: String },
    #[error("tool handler not implemented: {tool_name}")]
    NotImplemented { tool_name: String },
    #[error("tool execution failed for `{tool_name}`: {message}")]
    Execution { tool_name: String, message: String },
    #[error("tool `{tool_name}` failed: {failure:?}")]
    Failure {
        tool_name: String,
        failure: ToolFailure,
    },
}

impl ToolError {
    pub fn code(&self) -> &str {
        match self {
            Self::NotFound { .. } => "tool_not_found",
            Self::Validation { .. } => "validation_error",
            Self::PermissionDenied { .. } => "permission_denied",
            Self::Configuration { .. } => "configuration_error",
            Self::NotImplemented { .. } => "tool_not_implemented",
            Self::Execution { .. } => "execution_error",
            Self::Failure { failure, .. } => &failure.code,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolRequest {
    pub tool_name: String,
    pub payload: Map<String, Value>,
}

#[derive(Clone, Copy, Default)]
pub struct ExecutionOptions<'a> {
    pub allow_write_safe: bool,
    pub allow_external: bool,
    pub cache: Option<&'a CacheClient>,
    pub privacy: Option<&'a PrivacyWrapper>,
    pub task_id: Option<&'a str>,
    pub tool_cache_ttl_seconds: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PrivacySummary {
    pub pii_detected: bool,
    pub types: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolExecutionOutput {
    pub value: Value,
    pub cache_hit: bool,
    pub privacy: Option<PrivacySummary>,
    pub redacted_result_text: Option<String>,
}

/// Schema-validated, permission-gated dispatch. READ_ONLY is allowed by
/// default, WRITE_SAFE is deny-by-default, SYSTEM is denied at this
/// tier. External tools route through the privacy wrapper; cacheable
/// calls go through the deterministic key policy and degrade to direct
/// execution on any cache problem.
pub fn execute_tool(
    registry: &ToolRegistry,
    sandbox: &Sandbox,
    request: &ToolRequest,
    options: ExecutionOptions<'_>,
) -> Result<ToolExecutionOutput, ToolError> {
    let Some(tool) = registry.get(&request.tool_name) else {
        return Err(ToolError::NotFound {
            tool_name: request.tool_name.clone(),
        });
    };

    let payload = tool
        .schema
        .validate_payload(&request.payload)
        .map_err(|errors| ToolError::Validation {
            tool_name: request.tool_name.clone(),
            errors,
        })?;

    match tool.schema.permission_tier {
        PermissionTier::ReadOnly => {}
        PermissionTier::WriteSafe => {
            if !options.allow_write_safe {
                audit_tier_denial(&options, &request.tool_name, "write_safe");
                return Err(ToolError::PermissionDenied {
                    tool_name: request.tool_name.clone(),
                    required: "write_safe",
                });
            }
        }
        PermissionTier::System => {
            audit_tier_denial(&options, &request.tool_name, "system");
            return Err(ToolError::PermissionDenied {
                tool_name: request.tool_name.clone(),
                required: "system",
            });
        }
    }

    let prepared_external = if tool.schema.external {
        let Some(privacy) = options.privacy else {
            return Err(ToolError::Configuration {
                tool_name: request.tool_name.clone(),
            });
        };
        let prepared = privacy
            .evaluate_external_call(
                &request.tool_name,
                &payload,
                options.allow_external,
                options.task_id,
            )
            .map_err(|_| ToolError::PermissionDenied {
                tool_name: request.tool_name.clone(),
                required: "allow_external",
            })?;
        Some(prepared)
    } else {
        None
    };

    let cacheable = options.cache.map(|c| c.is_enabled()).unwrap_or(false)
        && tool.schema.permission_tier == PermissionTier::ReadOnly
        && !tool.schema.external
        && options.privacy.is_none();

    let cache_key = if cacheable {
        let parts = Map::from_iter([
            (
                "tool_name".to_string(),
                Value::String(request.tool_name.clone()),
            ),
            ("payload".to_string(), Value::Object(payload.clone())),
        ]);
        make_cache_key("tool", &parts, "v1", DEFAULT_MAX_KEY_LENGTH).ok()
    } else {
        None
    };

    if let (Some(cache), Some(key)) = (options.cache, cache_key.as_deref()) {
        if let Some(entry) = cache.get_json_categorized(key, "tool") {
            if let Some(value) = entry.get("value") {
                return Ok(ToolExecutionOutput {
                    value: value.clone(),
                    cache_hit: true,
                    privacy: None,
                    redacted_result_text: None,
                });
            }
        }
    }

    let Some(handler) = tool.handler.as_ref() else {
        return Err(ToolError::NotImplemented {
            tool_name: request.tool_name.clone(),
        });
    };

    let value = handler(sandbox, &payload).map_err(|failure| {
        if failure.code == "execution_error" {
            ToolError::Execution {
                tool_name: request.tool_name.clone(),
                message: failure.message.clone(),
            }
        } else {
            ToolError::Failure {
                tool_name: request.tool_name.clone(),
                failure,
            }
        }
    })?;

    if let (Some(cache), Some(key)) = (options.cache, cache_key.as_deref()) {
        let ttl = options
            .tool_cache_ttl_seconds
            .unwrap_or(DEFAULT_TOOL_CACHE_TTL_SECONDS);
        let _ = cache.set_json(key, &json!({ "value": value.clone() }), Some(ttl));
    }

    let (privacy_summary, redacted_result_text) = match (options.privacy, prepared_external) {
        (Some(privacy), Some(prepared)) => {
            let scan = privacy.scan_result(&request.tool_name, &value, options.task_id);
            (
                Some(PrivacySummary {
                    pii_detected: prepared.pii_detected || scan.pii_detected,
                    types: merge_types(prepared.pii_types, scan.pii_types),
                }),
                Some(scan.redacted_text),
            )
        }
        _ => (None, None),
    };

    Ok(ToolExecutionOutput {
        value,
        cache_hit: false,
        privacy: privacy_summary,
        redacted_result_text,
    })
}

fn audit_tier_denial(options: &ExecutionOptions<'_>, tool_name: &str, required: &str) {
    if let Some(privacy) = options.privacy {
        privacy.audit().permission_denied(
            &format!("tool:{tool_name}"),
            &format!("requires_{required}"),
            options.task_id,
        );
    }
}

fn merge_types(mut left: Vec<String>, right: Vec<String>) -> Vec<String> {
    left.extend(right);
    left.sort();
    left.dedup();
    left
}
