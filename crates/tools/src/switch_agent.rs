//! `switch_agent`: the built-in tool an agent calls to hand the
//! conversation to another agent by name.
//!
//! The target agent sees a note telling it which step of the script to
//! resume from and what the previous agent produced.

use async_trait::async_trait;
use agentrelay_core::error::ToolError;
use agentrelay_core::tool::{Tool, ToolContext, ToolOutcome};

pub const SWITCH_AGENT_TOOL: &str = "switch_agent";

pub struct SwitchAgentTool;

#[async_trait]
impl Tool for SwitchAgentTool {
    fn name(&self) -> &str {
        SWITCH_AGENT_TOOL
    }

    fn description(&self) -> &str {
        "Hand the conversation to another agent. Use when the next step needs tools you do not have."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "agent_name": {
                    "type": "string",
                    "description": "Name of the agent to switch to"
                },
                "step": {
                    "type": "string",
                    "description": "Script step the new agent should resume at, e.g. '$3'"
                },
                "previous_output": {
                    "type": "string",
                    "description": "Result the new agent needs from the work done so far"
                }
            },
            "required": ["agent_name"]
        })
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        context: &ToolContext,
    ) -> Result<ToolOutcome, ToolError> {
        let to_agent = arguments["agent_name"]
            .as_str()
            .filter(|name| !name.trim().is_empty())
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'agent_name' argument".into()))?;

        let mut note = format!("Agent {} handed this conversation to you.", context.agent);
        if let Some(step) = arguments["step"].as_str() {
            note.push_str(&format!(" Continue from step {step}."));
        }
        if let Some(previous) = arguments["previous_output"].as_str() {
            note.push_str(&format!(" Previous output: {previous}"));
        }

        Ok(ToolOutcome::AgentSwitch {
            to_agent: to_agent.to_string(),
            visible_message: note,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ToolContext {
        ToolContext {
            agent: "triage".into(),
            ..ToolContext::default()
        }
    }

    #[tokio::test]
    async fn switch_carries_resume_note() {
        let outcome = SwitchAgentTool
            .execute(
                serde_json::json!({
                    "agent_name": "math",
                    "step": "$2",
                    "previous_output": "42"
                }),
                &ctx(),
            )
            .await
            .unwrap();

        match outcome {
            ToolOutcome::AgentSwitch {
                to_agent,
                visible_message,
            } => {
                assert_eq!(to_agent, "math");
                assert!(visible_message.contains("triage"));
                assert!(visible_message.contains("$2"));
                assert!(visible_message.ends_with("42"));
            }
            other => panic!("expected AgentSwitch, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_agent_name_is_invalid() {
        let err = SwitchAgentTool
            .execute(serde_json::json!({"agent_name": "  "}), &ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
