//! Agent-level streaming events.
//!
//! `AgentStreamEvent` wraps raw gateway deltas into higher-level events a
//! caller can render live. A run ends with exactly one `Done` carrying the
//! same outcome the non-streaming loop returns.

use agentrelay_core::gateway::StreamDelta;
use agentrelay_core::message::Message;
use serde::{Deserialize, Serialize};

use crate::dispatcher::ToolCallRecord;
use crate::loop_runner::RunOutcome;

/// Events emitted by the agent loop during streaming execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentStreamEvent {
    /// A completion request is about to be sent.
    TurnStarted { agent: String, turn: u32 },

    /// A raw delta from the gateway, in arrival order.
    Delta { agent: String, delta: StreamDelta },

    /// The assistant message of a turn, fully assembled.
    TurnEnded {
        agent: String,
        turn: u32,
        message: Message,
    },

    /// One tool call finished.
    ToolResult(ToolCallRecord),

    /// Control moved to another agent.
    Handoff {
        from: String,
        to: String,
        manual: bool,
    },

    /// The run completed.
    Done(RunOutcome),
}

impl AgentStreamEvent {
    /// Short event name for this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::TurnStarted { .. } => "turn_started",
            Self::Delta { .. } => "delta",
            Self::TurnEnded { .. } => "turn_ended",
            Self::ToolResult(_) => "tool_result",
            Self::Handoff { .. } => "handoff",
            Self::Done(_) => "done",
        }
    }

    /// Text carried by a content delta, if this is one.
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Delta {
                delta: StreamDelta::Content { text },
                ..
            } => Some(text),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_event_serialization() {
        let event = AgentStreamEvent::Delta {
            agent: "triage".into(),
            delta: StreamDelta::content("Hel"),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"delta""#));
        assert!(json.contains(r#""text":"Hel""#));
        assert_eq!(event.text(), Some("Hel"));
    }

    #[test]
    fn handoff_event_roundtrip() {
        let event = AgentStreamEvent::Handoff {
            from: "triage".into(),
            to: "math".into(),
            manual: true,
        };
        let json = serde_json::to_string(&event).unwrap();
        let back: AgentStreamEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.event_type(), "handoff");
        assert!(back.text().is_none());
    }

    #[test]
    fn tool_result_event_flattens_record() {
        let event = AgentStreamEvent::ToolResult(ToolCallRecord {
            call_id: "c1".into(),
            tool_name: "calculator".into(),
            output: "4".into(),
            success: true,
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "tool_result");
        assert_eq!(json["tool_name"], "calculator");
    }
}
