//! Completion gateway trait: the abstraction over LLM backends.
//!
//! A gateway knows how to send one agent turn (system instructions, history,
//! tool schemas) to a completion service and normalize what comes back,
//! either as a complete assistant message or as a stream of raw deltas.
//!
//! Implementations: OpenAI-compatible chat completions (see the
//! `agentrelay-providers` crate) and scripted gateways in tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::agent::ToolChoice;
use crate::error::ProviderError;
use crate::message::Message;

/// One request to the completion service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// The model to use (e.g., "gpt-4o-mini")
    pub model: String,

    /// The conversation, system instructions first
    pub messages: Vec<Message>,

    /// Temperature (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Tools the active agent may call
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,

    /// How the model should pick tools
    #[serde(default)]
    pub tool_choice: ToolChoice,

    /// Whether to stream the response
    #[serde(default)]
    pub stream: bool,
}

fn default_temperature() -> f32 {
    0.7
}

impl CompletionRequest {
    /// The system prompt of this request, if the first message carries one.
    pub fn system_prompt(&self) -> Option<&str> {
        self.messages
            .first()
            .filter(|m| m.role == crate::message::Role::System)
            .map(|m| m.content.as_str())
    }

    /// Names of the advertised tools, in order.
    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name.as_str()).collect()
    }
}

/// A tool definition sent to the LLM so it knows what tools it can call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,

    /// Executed by the completion service rather than locally
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub remote: bool,
}

/// A complete (non-streaming) response from a gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    /// The generated assistant message
    pub message: Message,

    /// Token usage statistics
    pub usage: Option<Usage>,

    /// Which model actually responded (may differ from requested)
    pub model: String,

    /// Transport-specific metadata
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// Token usage information.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    /// Add another usage report to this one.
    pub fn add(&mut self, other: &Usage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
    }
}

/// One incremental piece of a streamed assistant turn.
///
/// Deltas must be applied in arrival order; tool-call fragments are keyed
/// by the transport's stream index, not by call id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamDelta {
    /// A fragment of assistant text.
    Content { text: String },

    /// A fragment of one tool call.
    ToolCall {
        index: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        arguments: Option<String>,
    },

    /// Token usage for the turn.
    Usage { usage: Usage },

    /// The turn is complete.
    EndOfTurn,
}

impl StreamDelta {
    /// Shorthand for a text fragment.
    pub fn content(text: impl Into<String>) -> Self {
        Self::Content { text: text.into() }
    }

    /// Split a complete response into the deltas a streaming transport
    /// would have produced for it.
    pub fn from_response(response: &CompletionResponse) -> Vec<StreamDelta> {
        let mut deltas = Vec::new();
        if !response.message.content.is_empty() {
            deltas.push(Self::content(response.message.content.clone()));
        }
        for (index, tc) in response.message.tool_calls.iter().enumerate() {
            deltas.push(Self::ToolCall {
                index: index as u32,
                id: Some(tc.id.clone()),
                name: Some(tc.name.clone()),
                arguments: Some(tc.arguments.clone()),
            });
        }
        if let Some(usage) = response.usage {
            deltas.push(Self::Usage { usage });
        }
        deltas.push(Self::EndOfTurn);
        deltas
    }
}

/// Receiver side of a streamed completion.
pub type DeltaReceiver = mpsc::Receiver<std::result::Result<StreamDelta, ProviderError>>;

/// The core gateway trait.
///
/// The agent loop calls `complete()` or `stream()` without knowing which
/// backend is in use.
#[async_trait]
pub trait CompletionGateway: Send + Sync {
    /// A human-readable name for this gateway (e.g., "openai", "openrouter").
    fn name(&self) -> &str;

    /// Send a request and get a complete response.
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> std::result::Result<CompletionResponse, ProviderError>;

    /// Send a request and get a stream of deltas, ending with
    /// [`StreamDelta::EndOfTurn`].
    ///
    /// Default implementation calls `complete()` and replays the result.
    async fn stream(
        &self,
        request: CompletionRequest,
    ) -> std::result::Result<DeltaReceiver, ProviderError> {
        let response = self.complete(request).await?;
        let deltas = StreamDelta::from_response(&response);
        let (tx, rx) = mpsc::channel(deltas.len());
        for delta in deltas {
            let _ = tx.send(Ok(delta)).await;
        }
        Ok(rx)
    }

    /// Open a transport-side conversation thread, for stateful services.
    ///
    /// Stateless gateways return `None`.
    async fn open_thread(&self) -> std::result::Result<Option<String>, ProviderError> {
        Ok(None)
    }

    /// Release a thread previously returned by `open_thread`.
    async fn close_thread(&self, _thread_id: &str) -> std::result::Result<(), ProviderError> {
        Ok(())
    }

    /// Health check: can we reach the service?
    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageToolCall;

    struct FixedGateway;

    #[async_trait]
    impl CompletionGateway for FixedGateway {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn complete(
            &self,
            _request: CompletionRequest,
        ) -> std::result::Result<CompletionResponse, ProviderError> {
            Ok(CompletionResponse {
                message: Message::assistant_with_tool_calls(
                    "checking",
                    vec![MessageToolCall {
                        id: "call_1".into(),
                        name: "lookup".into(),
                        arguments: r#"{"id":7}"#.into(),
                    }],
                ),
                usage: Some(Usage {
                    prompt_tokens: 3,
                    completion_tokens: 2,
                    total_tokens: 5,
                }),
                model: "fixed-model".into(),
                metadata: serde_json::Map::new(),
            })
        }
    }

    fn request() -> CompletionRequest {
        CompletionRequest {
            model: "fixed-model".into(),
            messages: vec![Message::system("be brief"), Message::user("hi")],
            temperature: default_temperature(),
            max_tokens: None,
            tools: vec![],
            tool_choice: ToolChoice::Auto,
            stream: false,
        }
    }

    #[test]
    fn request_exposes_system_prompt() {
        assert_eq!(request().system_prompt(), Some("be brief"));
        let mut req = request();
        req.messages.remove(0);
        assert_eq!(req.system_prompt(), None);
    }

    #[test]
    fn remote_flag_is_omitted_when_false() {
        let def = ToolDefinition {
            name: "echo".into(),
            description: "Echo".into(),
            parameters: serde_json::json!({"type": "object"}),
            remote: false,
        };
        let json = serde_json::to_string(&def).unwrap();
        assert!(!json.contains("remote"));
    }

    #[tokio::test]
    async fn default_stream_replays_complete_response() {
        let mut rx = FixedGateway.stream(request()).await.unwrap();
        let mut deltas = Vec::new();
        while let Some(delta) = rx.recv().await {
            deltas.push(delta.unwrap());
        }
        assert_eq!(deltas.first(), Some(&StreamDelta::content("checking")));
        assert!(matches!(deltas[1], StreamDelta::ToolCall { index: 0, .. }));
        assert_eq!(deltas.last(), Some(&StreamDelta::EndOfTurn));
    }

    #[tokio::test]
    async fn stateless_gateway_has_no_thread() {
        assert_eq!(FixedGateway.open_thread().await.unwrap(), None);
        assert!(FixedGateway.close_thread("t").await.is_ok());
    }

    #[test]
    fn usage_accumulates() {
        let mut total = Usage::default();
        total.add(&Usage {
            prompt_tokens: 1,
            completion_tokens: 2,
            total_tokens: 3,
        });
        total.add(&Usage {
            prompt_tokens: 1,
            completion_tokens: 1,
            total_tokens: 2,
        });
        assert_eq!(total.total_tokens, 5);
    }
}
