pub mod executor;
pub mod file_tools;
pub mod registry;
pub mod sandbox;

pub use executor::{
    execute_tool, ExecutionOptions, PrivacySummary, ToolError, ToolExecutionOutput, ToolRequest,
    DEFAULT_TOOL_CACHE_TTL_SECONDS,
};
pub use file_tools::register_core_file_tools;
pub use registry::{
    FieldSpec, FieldType, PermissionTier, RegistryError, ToolDefinition, ToolFailure, ToolHandler,
    ToolRegistry, ToolSchema,
};
pub use sandbox::{Sandbox, SandboxConfig, SandboxError};
