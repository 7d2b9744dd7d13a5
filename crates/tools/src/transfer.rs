//! Per-agent transfer tools: `transfer_to_<agent>`.
//!
//! Each tool hands control to one fixed agent through a structured
//! result, so the model picks a handoff the same way it picks any tool.

use async_trait::async_trait;
use agentrelay_core::agent::HandoffTarget;
use agentrelay_core::error::ToolError;
use agentrelay_core::tool::{Tool, ToolContext, ToolOutcome};

/// Name of the transfer tool for `agent`.
pub fn transfer_tool_name(agent: &str) -> String {
    format!("transfer_to_{agent}")
}

/// Hands the conversation to a fixed agent.
#[derive(Debug, Clone)]
pub struct TransferTool {
    name: String,
    description: String,
    target: String,
}

impl TransferTool {
    pub fn new(target: impl Into<String>, description: impl AsRef<str>) -> Self {
        let target = target.into();
        let description = match description.as_ref() {
            "" => format!("Transfer the conversation to {target}."),
            d => format!("Transfer the conversation to {target}: {d}"),
        };
        Self {
            name: transfer_tool_name(&target),
            description,
            target,
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }
}

#[async_trait]
impl Tool for TransferTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "reason": {"type": "string", "description": "Why the transfer is needed"}
            }
        })
    }

    async fn execute(
        &self,
        _arguments: serde_json::Value,
        _context: &ToolContext,
    ) -> Result<ToolOutcome, ToolError> {
        Ok(ToolOutcome::handoff(HandoffTarget::Named(self.target.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn transfer_hands_off_by_name() {
        let tool = TransferTool::new("billing", "Handles refunds");
        assert_eq!(tool.name(), "transfer_to_billing");
        assert!(tool.description().contains("refunds"));

        let outcome = tool
            .execute(serde_json::json!({}), &ToolContext::default())
            .await
            .unwrap();
        match outcome {
            ToolOutcome::Structured {
                value: None,
                agent: Some(target),
                ..
            } => assert_eq!(target.name(), "billing"),
            other => panic!("expected handoff, got {other:?}"),
        }
    }
}
