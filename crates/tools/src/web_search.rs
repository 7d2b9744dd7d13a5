//! Web search: a remote tool executed by the completion service.
//!
//! The schema is advertised so agents can be granted it, but it is never
//! run locally.

use async_trait::async_trait;
use agentrelay_core::error::ToolError;
use agentrelay_core::tool::{Tool, ToolContext, ToolOutcome};

pub struct WebSearchTool;

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web. Executed by the completion service."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "The search query"}
            },
            "required": ["query"]
        })
    }

    fn is_remote(&self) -> bool {
        true
    }

    async fn execute(
        &self,
        _arguments: serde_json::Value,
        _context: &ToolContext,
    ) -> Result<ToolOutcome, ToolError> {
        Err(ToolError::Remote(self.name().into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advertised_as_remote() {
        let def = WebSearchTool.to_definition();
        assert!(def.remote);
        assert_eq!(def.name, "web_search");
    }
}
