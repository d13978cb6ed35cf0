use super::registry::{FieldSpec, PermissionTier, RegistryError, ToolRegistry, ToolSchema};
use std::path::Path;

/// Register the core file tools against the shared sandbox. READ_ONLY
/// tools are always dispatchable; the WRITE_SAFE pair stays behind the
/// executor's deny-by-default gate.
pub fn register_core_file_tools(registry: &mut ToolRegistry) -> Result<(), RegistryError> {
    registry.register(
        ToolSchema {
            name: "read_file".to_string(),
            description: "Read text file contents within sandbox roots".to_string(),
            permission_tier: PermissionTier::ReadOnly,
            external: false,
            fields: vec![FieldSpec::string("path", true)],
        },
        Some(Box::new(|sandbox, payload| {
            let path = string_field(payload, "path");
            sandbox.read_text(Path::new(&path)).map_err(Into::into)
        })),
    )?;

    registry.register(
        ToolSchema {
            name: "list_directory".to_string(),
            description: "List directory entries within sandbox roots".to_string(),
            permission_tier: PermissionTier::ReadOnly,
            external: false,
            fields: vec![FieldSpec::string("path", true)],
        },
        Some(Box::new(|sandbox, payload| {
            let path = string_field(payload, "path");
            sandbox.list_dir(Path::new(&path)).map_err(Into::into)
        })),
    )?;

    registry.register(
        ToolSchema {
            name: "file_info".to_string(),
            description: "Return file metadata within sandbox roots".to_string(),
            permission_tier: PermissionTier::ReadOnly,
            external: false,
            fields: vec![FieldSpec::string("path", true)],
        },
        Some(Box::new(|sandbox, payload| {
            let path = string_field(payload, "path");
            sandbox.file_info(Path::new(&path)).map_err(Into::into)
        })),
    )?;

    registry.register(
        ToolSchema {
            name: "write_file".to_string(),
            description: "Write text file contents within sandbox roots".to_string(),
            permission_tier: PermissionTier::WriteSafe,
            external: false,
            fields: vec![
                FieldSpec::string("path", true),
                FieldSpec {
                    min_length: None,
                    ..FieldSpec::string("content", true)
                },
            ],
        },
        Some(Box::new(|sandbox, payload| {
            let path = string_field(payload, "path");
            let content = string_field(payload, "content");
            sandbox
                .write_text(Path::new(&path), &content)
                .map_err(Into::into)
        })),
    )?;

    registry.register(
        ToolSchema {
            name: "delete_file".to_string(),
            description: "Delete a file within sandbox roots".to_string(),
            permission_tier: PermissionTier::WriteSafe,
            external: false,
            fields: vec![FieldSpec::string("path", true)],
        },
        Some(Box::new(|sandbox, payload| {
            let path = string_field(payload, "path");
            sandbox.delete_path(Path::new(&path)).map_err(Into::into)
        })),
    )?;

    registry.register(
        ToolSchema {
            name: "search_files".to_string(),
            description: "Search file paths by glob pattern within sandbox roots".to_string(),
            permission_tier: PermissionTier::ReadOnly,
            external: false,
            fields: vec![
                FieldSpec::string("root", true),
                FieldSpec::string("pattern", true),
                FieldSpec::integer("max_results", 100, 1, 1000),
            ],
        },
        Some(Box::new(|sandbox, payload| {
            let root = string_field(payload, "root");
            let pattern = string_field(payload, "pattern");
            let max_results = payload
                .get("max_results")
                .and_then(|v| v.as_i64())
                .unwrap_or(100)
                .max(1) as usize;
            sandbox
                .search(Path::new(&root), &pattern, max_results)
                .map_err(Into::into)
        })),
    )?;

    Ok(())
}

fn string_field(payload: &serde_json::Map<String, serde_json::Value>, name: &str) -> String {
    payload
        .get(name)
        .and_then(|value| value.as_str())
        .unwrap_or_default()
        .to_string()
}
