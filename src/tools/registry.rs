use super::sandbox::Sandbox;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionTier {
    ReadOnly,
    WriteSafe,
    System,
}

impl PermissionTier {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ReadOnly => "read_only",
            Self::WriteSafe => "write_safe",
            Self::System => "system",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    Integer,
    Boolean,
}

impl FieldType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
        }
    }
}

/// Declared tool argument: name, type, required flag, default and
/// constraints. Validation produces a concrete typed payload before
/// dispatch; no dynamic keyword passing reaches handlers.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub name: String,
    pub field_type: FieldType,
    pub required: bool,
    pub default: Option<Value>,
    pub min_length: Option<usize>,
    pub min: Option<i64>,
    pub max: Option<i64>,
}

impl FieldSpec {
    pub fn string(name: &str, required: bool) -> Self {
        Self {
            name: name.to_string(),
            field_type: FieldType::String,
            required,
            default: None,
            min_length: if required { Some(1) } else { None },
            min: None,
            max: None,
        }
    }

    pub fn integer(name: &str, default: i64, min: i64, max: i64) -> Self {
        Self {
            name: name.to_string(),
            field_type: FieldType::Integer,
            required: false,
            default: Some(json!(default)),
            min_length: None,
            min: Some(min),
            max: Some(max),
        }
    }

    pub fn boolean(name: &str, default: bool) -> Self {
        Self {
            name: name.to_string(),
            field_type: FieldType::Boolean,
            required: false,
            default: Some(Value::Bool(default)),
            min_length: None,
            min: None,
            max: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub permission_tier: PermissionTier,
    pub external: bool,
    pub fields: Vec<FieldSpec>,
}

impl ToolSchema {
    pub fn validate_payload(&self, payload: &Map<String, Value>) -> Result<Map<String, Value>, Vec<String>> {
        let mut errors = Vec::new();
        let mut validated = Map::new();

        for field in &self.fields {
            let provided = payload.get(&field.name);
            let value = match provided {
                Some(value) => value.clone(),
                None => match (&field.default, field.required) {
                    (Some(default), _) => default.clone(),
                    (None, true) => {
                        errors.push(format!("field `{}` is required", field.name));
                        continue;
                    }
                    (None, false) => continue,
                },
            };

            match field.field_type {
                FieldType::String => match value.as_str() {
                    Some(text) => {
                        if let Some(min_length) = field.min_length {
                            if text.chars().count() < min_length {
                                errors.push(format!(
                                    "field `{}` must be at least {min_length} characters",
                                    field.name
                                ));
                                continue;
                            }
                        }
                        validated.insert(field.name.clone(), Value::String(text.to_string()));
                    }
                    None => errors.push(format!("field `{}` must be a string", field.name)),
                },
                FieldType::Integer => match value.as_i64() {
                    Some(number) => {
                        if let Some(min) = field.min {
                            if number < min {
                                errors.push(format!("field `{}` must be >= {min}", field.name));
                                continue;
                            }
                        }
                        if let Some(max) = field.max {
                            if number > max {
                                errors.push(format!("field `{}` must be <= {max}", field.name));
                                continue;
                            }
                        }
                        validated.insert(field.name.clone(), json!(number));
                    }
                    None => errors.push(format!("field `{}` must be an integer", field.name)),
                },
                FieldType::Boolean => match value.as_bool() {
                    Some(flag) => {
                        validated.insert(field.name.clone(), Value::Bool(flag));
                    }
                    None => errors.push(format!("field `{}` must be a boolean", field.name)),
                },
            }
        }

        let known = self
            .fields
            .iter()
            .map(|field| field.name.as_str())
            .collect::<Vec<_>>();
        for key in payload.keys() {
            if !known.contains(&key.as_str()) {
                errors.push(format!("unknown field `{key}`"));
            }
        }

        if errors.is_empty() {
            Ok(validated)
        } else {
            Err(errors)
        }
    }

    /// Deterministic export: fields listed in sorted order.
    pub fn export(&self) -> Value {
        let mut fields = self.fields.clone();
        fields.sort_by(|a, b| a.name.cmp(&b.name));
        json!({
            "name": self.name,
            "description": self.description,
            "permission_tier": self.permission_tier.as_str(),
            "external": self.external,
            "fields": fields
                .iter()
                .map(|field| {
                    json!({
                        "name": field.name,
                        "type": field.field_type.as_str(),
                        "required": field.required,
                        "default": field.default.clone().unwrap_or(Value::Null),
                        "min_length": field.min_length,
                        "min": field.min,
                        "max": field.max,
                    })
                })
                .collect::<Vec<_>>(),
        })
    }
}

/// Structured handler failure carrying a stable code (sandbox codes pass
/// through unchanged).
#[derive(Debug, Clone, PartialEq)]
pub struct ToolFailure {
    pub code: String,
    pub message: String,
    pub details: Map<String, Value>,
}

impl ToolFailure {
    pub fn new(code: &str, message: String) -> Self {
        Self {
            code: code.to_string(),
            message,
            details: Map::new(),
        }
    }

    pub fn execution(message: String) -> Self {
        Self::new("execution_error", message)
    }
}

impl From<super::sandbox::SandboxError> for ToolFailure {
    fn from(err: super::sandbox::SandboxError) -> Self {
        Self::new(err.code(), err.to_string())
    }
}

pub type ToolHandler = Box<dyn Fn(&Sandbox, &Map<String, Value>) -> Result<Value, ToolFailure> + Send + Sync>;

pub struct ToolDefinition {
    pub schema: ToolSchema,
    pub handler: Option<ToolHandler>,
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("tool already registered: {tool_name}")]
    DuplicateTool { tool_name: String },
}

/// Registrations happen once at startup; lookups afterwards are
/// read-only.
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, ToolDefinition>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        schema: ToolSchema,
        handler: Option<ToolHandler>,
    ) -> Result<(), RegistryError> {
        if self.tools.contains_key(&schema.name) {
            return Err(RegistryError::DuplicateTool {
                tool_name: schema.name,
            });
        }
        self.tools
            .insert(schema.name.clone(), ToolDefinition { schema, handler });
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ToolDefinition> {
        self.tools.get(name)
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    pub fn export_all_schemas(&self) -> Vec<Value> {
        self.tools
            .values()
            .map(|tool| tool.schema.export())
            .collect()
    }
}
