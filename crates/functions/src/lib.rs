//! Tool definitions and dispatch-facing execution for the agent's function
//! catalogue: in-context always-visible tools plus out-of-context tools
//! discoverable by embedding search over their descriptions.

pub mod builtin;
pub mod registry;
pub mod web;

pub use builtin::{tool_specs as builtin_tool_specs, execute, ToolExecCtx, ToolError};
pub use registry::{FunctionRegistry, ParamSpec, ParamType, RegistryError, ToolSpec};
pub use web::{tool_specs as web_tool_specs, CodeExecutor, NoCodeExecutor, NoWebSearchClient, ToolBackendError, WebSearchClient};

/// Assembles the full registry: the in-context base set plus the
/// out-of-context web/interpreter contracts.
pub fn default_registry() -> Result<FunctionRegistry, RegistryError> {
    let mut specs = builtin::tool_specs();
    specs.extend(web::tool_specs());
    FunctionRegistry::load(specs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_loads_without_name_collisions() {
        let registry = default_registry().unwrap();
        assert!(registry.contains("send_message"));
        assert!(registry.contains("web_search"));
        assert_eq!(registry.in_context_schemas().len(), 7);
    }
}
