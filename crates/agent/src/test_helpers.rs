//! Shared test helpers: a scripted gateway and small tool fixtures.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use agentrelay_core::error::ProviderError;
use agentrelay_core::gateway::{
    CompletionGateway, CompletionRequest, CompletionResponse, DeltaReceiver, StreamDelta, Usage,
};
use agentrelay_core::message::{Message, MessageToolCall};
use agentrelay_core::tool::{FunctionTool, Tool, ToolOutcome, ToolRegistry};
use async_trait::async_trait;

/// A gateway that returns a queue of scripted responses and records every
/// request it receives.
///
/// Fails with `MalformedResponse` when the script runs out.
pub struct ScriptedGateway {
    responses: Mutex<VecDeque<CompletionResponse>>,
    requests: Mutex<Vec<CompletionRequest>>,
    fragment: bool,
}

impl ScriptedGateway {
    pub fn new(responses: Vec<CompletionResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
            fragment: false,
        }
    }

    /// Stream text and tool arguments in small fragments instead of whole.
    pub fn fragmented(mut self) -> Self {
        self.fragment = true;
        self
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn next(&self, request: CompletionRequest) -> Result<CompletionResponse, ProviderError> {
        self.requests.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ProviderError::MalformedResponse("script exhausted".into()))
    }
}

#[async_trait]
impl CompletionGateway for ScriptedGateway {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, ProviderError> {
        self.next(request)
    }

    async fn stream(&self, request: CompletionRequest) -> Result<DeltaReceiver, ProviderError> {
        let response = self.next(request)?;
        let deltas = if self.fragment {
            fragment_deltas(&response)
        } else {
            StreamDelta::from_response(&response)
        };
        let (tx, rx) = tokio::sync::mpsc::channel(deltas.len().max(1));
        for delta in deltas {
            tx.send(Ok(delta)).await.unwrap();
        }
        Ok(rx)
    }
}

/// A gateway that asks for `echo` on every turn and never answers.
#[derive(Default)]
pub struct EndlessEchoGateway {
    calls: AtomicUsize,
}

impl EndlessEchoGateway {
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next(&self) -> CompletionResponse {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        tool_calls(vec![call(&format!("c{n}"), "echo", r#"{"text":"again"}"#)])
    }
}

#[async_trait]
impl CompletionGateway for EndlessEchoGateway {
    fn name(&self) -> &str {
        "endless-echo"
    }

    async fn complete(
        &self,
        _request: CompletionRequest,
    ) -> Result<CompletionResponse, ProviderError> {
        Ok(self.next())
    }

    async fn stream(&self, _request: CompletionRequest) -> Result<DeltaReceiver, ProviderError> {
        let deltas = StreamDelta::from_response(&self.next());
        let (tx, rx) = tokio::sync::mpsc::channel(deltas.len().max(1));
        for delta in deltas {
            tx.send(Ok(delta)).await.unwrap();
        }
        Ok(rx)
    }
}

/// Split a response into three-character text fragments and tool calls
/// whose id, name and arguments arrive in separate deltas.
fn fragment_deltas(response: &CompletionResponse) -> Vec<StreamDelta> {
    let mut deltas = Vec::new();
    let chars: Vec<char> = response.message.content.chars().collect();
    for chunk in chars.chunks(3) {
        deltas.push(StreamDelta::content(chunk.iter().collect::<String>()));
    }
    for (index, tc) in response.message.tool_calls.iter().enumerate() {
        let index = index as u32;
        deltas.push(StreamDelta::ToolCall {
            index,
            id: Some(tc.id.clone()),
            name: Some(tc.name.clone()),
            arguments: None,
        });
        let split = tc.arguments.len() / 2;
        let split = (split..=tc.arguments.len())
            .find(|i| tc.arguments.is_char_boundary(*i))
            .unwrap_or(tc.arguments.len());
        for part in [&tc.arguments[..split], &tc.arguments[split..]] {
            deltas.push(StreamDelta::ToolCall {
                index,
                id: None,
                name: None,
                arguments: Some(part.to_string()),
            });
        }
    }
    if let Some(usage) = response.usage {
        deltas.push(StreamDelta::Usage { usage });
    }
    deltas.push(StreamDelta::EndOfTurn);
    deltas
}

fn usage() -> Option<Usage> {
    Some(Usage {
        prompt_tokens: 10,
        completion_tokens: 5,
        total_tokens: 15,
    })
}

/// A final text response (no tool calls).
pub fn text(content: &str) -> CompletionResponse {
    CompletionResponse {
        message: Message::assistant(content),
        usage: usage(),
        model: "mock-model".into(),
        metadata: serde_json::Map::new(),
    }
}

/// A response that requests tool calls.
pub fn tool_calls(calls: Vec<MessageToolCall>) -> CompletionResponse {
    CompletionResponse {
        message: Message::assistant_with_tool_calls("", calls),
        usage: usage(),
        model: "mock-model".into(),
        metadata: serde_json::Map::new(),
    }
}

pub fn call(id: &str, name: &str, arguments: &str) -> MessageToolCall {
    MessageToolCall {
        id: id.into(),
        name: name.into(),
        arguments: arguments.into(),
    }
}

/// `echo({text})` returns `text`.
pub fn echo_tool() -> Box<dyn Tool> {
    Box::new(FunctionTool::new(
        "echo",
        "Echo the text back",
        serde_json::json!({
            "type": "object",
            "properties": {"text": {"type": "string"}},
            "required": ["text"]
        }),
        |args, _ctx| async move {
            Ok(ToolOutcome::value(args["text"].as_str().unwrap_or_default()))
        },
    ))
}

pub fn registry_with(tools: Vec<Box<dyn Tool>>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    for tool in tools {
        registry.register(tool).unwrap();
    }
    registry
}
