//! Message and conversation state domain types.
//!
//! These are the value objects that flow through the agent loop:
//! caller supplies a goal → loop appends assistant turns and tool results →
//! the new slice is handed back to the caller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Variables threaded through tool calls and dynamic instructions.
pub type ContextVariables = serde_json::Map<String, serde_json::Value>;

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user (or the caller acting on their behalf)
    User,
    /// An agent response
    Assistant,
    /// Agent instructions
    System,
    /// Tool execution result
    Tool,
}

/// A single message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: String,

    /// Who sent this message
    pub role: Role,

    /// The text content
    pub content: String,

    /// Tool calls requested by the assistant (if any)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<MessageToolCall>,

    /// If this is a tool result, which tool call it responds to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    /// Timestamp
    pub timestamp: DateTime<Utc>,

    /// Optional metadata (sending agent, tool name, etc.)
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Message {
    fn with_role(role: Role, content: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content,
            tool_calls: Vec::new(),
            tool_call_id: None,
            timestamp: Utc::now(),
            metadata: serde_json::Map::new(),
        }
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, content.into())
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, content.into())
    }

    /// Create an assistant message that requests tool calls.
    pub fn assistant_with_tool_calls(
        content: impl Into<String>,
        tool_calls: Vec<MessageToolCall>,
    ) -> Self {
        let mut msg = Self::assistant(content);
        msg.tool_calls = tool_calls;
        msg
    }

    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(Role::System, content.into())
    }

    /// Create a tool result message.
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        let mut msg = Self::with_role(Role::Tool, content.into());
        msg.tool_call_id = Some(tool_call_id.into());
        msg
    }

    /// Attach a metadata entry.
    pub fn with_metadata(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// The agent that produced this message, when recorded.
    pub fn sender(&self) -> Option<&str> {
        self.metadata.get("agent").and_then(|v| v.as_str())
    }
}

/// A tool call embedded in an assistant message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageToolCall {
    /// Unique ID for this tool call
    pub id: String,

    /// Name of the tool to invoke
    pub name: String,

    /// Arguments as a raw JSON string
    pub arguments: String,
}

/// The working state of one conversation: an append-only log plus the
/// variables tools and instructions can see.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationState {
    /// Ordered messages
    pub messages: Vec<Message>,

    /// Shared variables
    #[serde(default)]
    pub context_variables: ContextVariables,

    /// When this conversation was created
    pub created_at: DateTime<Utc>,

    /// When the last message was added
    pub updated_at: DateTime<Utc>,
}

impl ConversationState {
    /// Create a new empty conversation.
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            messages: Vec::new(),
            context_variables: ContextVariables::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Create a conversation seeded with context variables.
    pub fn with_context(context_variables: ContextVariables) -> Self {
        Self {
            context_variables,
            ..Self::new()
        }
    }

    /// Append a message.
    pub fn push(&mut self, message: Message) {
        self.updated_at = Utc::now();
        self.messages.push(message);
    }

    /// Append several messages in order.
    pub fn extend(&mut self, messages: impl IntoIterator<Item = Message>) {
        self.updated_at = Utc::now();
        self.messages.extend(messages);
    }

    /// Merge context updates; later keys overwrite earlier ones.
    pub fn merge_context(&mut self, updates: ContextVariables) {
        for (key, value) in updates {
            self.context_variables.insert(key, value);
        }
    }
}

impl Default for ConversationState {
    fn default() -> Self {
        Self::new()
    }
}

/// Check that every tool message answers a call from the assistant message
/// directly before its result group, exactly once, and that no call is left
/// unanswered when another kind of message follows.
pub fn verify_tool_pairing(messages: &[Message]) -> Result<(), String> {
    let mut pending: Vec<&str> = Vec::new();

    for (idx, msg) in messages.iter().enumerate() {
        match msg.role {
            Role::Tool => {
                let Some(call_id) = msg.tool_call_id.as_deref() else {
                    return Err(format!("tool message #{idx} has no tool_call_id"));
                };
                match pending.iter().position(|id| *id == call_id) {
                    Some(pos) => {
                        pending.remove(pos);
                    }
                    None => {
                        return Err(format!(
                            "tool message #{idx} answers unknown or already answered call '{call_id}'"
                        ));
                    }
                }
            }
            _ => {
                if let Some(open) = pending.first() {
                    return Err(format!(
                        "call '{open}' is unanswered before message #{idx}"
                    ));
                }
                if msg.role == Role::Assistant {
                    pending = msg.tool_calls.iter().map(|tc| tc.id.as_str()).collect();
                }
            }
        }
    }

    match pending.first() {
        Some(open) => Err(format!("call '{open}' is unanswered at end of history")),
        None => Ok(()),
    }
}
