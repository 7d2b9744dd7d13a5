//! Built-in tool implementations for AgentRelay.
//!
//! Besides a couple of offline demo capabilities (arithmetic, weather),
//! this crate provides the tools agents use to hand off control:
//! `switch_agent` and per-agent `transfer_to_<agent>` tools.

pub mod calculator;
pub mod switch_agent;
pub mod transfer;
pub mod weather_lookup;
pub mod web_search;

use agentrelay_core::error::ToolError;
use agentrelay_core::tool::ToolRegistry;

pub use switch_agent::{SWITCH_AGENT_TOOL, SwitchAgentTool};
pub use transfer::{TransferTool, transfer_tool_name};

/// Create a tool registry with all built-in tools.
pub fn default_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    for tool in builtin_tools() {
        // Built-in names are distinct.
        let _ = registry.register(tool);
    }
    registry
}

/// Create a registry with the built-ins plus one transfer tool per agent.
pub fn registry_with_transfers<'a>(
    agents: impl IntoIterator<Item = (&'a str, &'a str)>,
) -> Result<ToolRegistry, ToolError> {
    let mut registry = default_registry();
    for (name, description) in agents {
        registry.register(Box::new(TransferTool::new(name, description)))?;
    }
    Ok(registry)
}

fn builtin_tools() -> Vec<Box<dyn agentrelay_core::Tool>> {
    vec![
        Box::new(calculator::CalculatorTool),
        Box::new(weather_lookup::WeatherLookupTool),
        Box::new(switch_agent::SwitchAgentTool),
        Box::new(web_search::WebSearchTool),
    ]
}
