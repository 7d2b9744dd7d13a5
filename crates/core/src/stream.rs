//! Streaming delta accumulation.
//!
//! A streamed assistant turn arrives as an ordered sequence of
//! [`StreamDelta`]s. Text fragments are concatenated; tool-call fragments
//! are merged per stream index, since one call's id, name and JSON
//! arguments may each be split across many chunks. The merge is not
//! idempotent: deltas must be applied exactly once, in arrival order.

use std::collections::BTreeMap;

use crate::error::ProviderError;
use crate::gateway::{CompletionResponse, StreamDelta, Usage};
use crate::message::{Message, MessageToolCall};

#[derive(Debug, Default, Clone)]
struct PartialToolCall {
    id: String,
    name: String,
    arguments: String,
}

/// Folds stream deltas into a complete [`CompletionResponse`].
#[derive(Debug, Clone)]
pub struct CompletionAccumulator {
    model: String,
    content: String,
    tool_calls: BTreeMap<u32, PartialToolCall>,
    usage: Option<Usage>,
    finished: bool,
}

impl CompletionAccumulator {
    /// Start accumulating a turn produced by `model`.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            content: String::new(),
            tool_calls: BTreeMap::new(),
            usage: None,
            finished: false,
        }
    }

    /// Merge one delta. Returns `true` once the end-of-turn marker has been
    /// seen; deltas arriving after it are ignored.
    pub fn apply(&mut self, delta: &StreamDelta) -> bool {
        if self.finished {
            return true;
        }

        match delta {
            StreamDelta::Content { text } => self.content.push_str(text),
            StreamDelta::ToolCall {
                index,
                id,
                name,
                arguments,
            } => {
                let entry = self.tool_calls.entry(*index).or_default();
                if let Some(id) = id {
                    entry.id.push_str(id);
                }
                if let Some(name) = name {
                    entry.name.push_str(name);
                }
                if let Some(arguments) = arguments {
                    entry.arguments.push_str(arguments);
                }
            }
            StreamDelta::Usage { usage } => self.usage = Some(*usage),
            StreamDelta::EndOfTurn => self.finished = true,
        }

        self.finished
    }

    /// Whether the end-of-turn marker has been applied.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Text accumulated so far.
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Close the turn: indexed tool calls become an ordered list.
    ///
    /// A call that never received a name is a malformed response. A call
    /// without an id gets a synthetic one so it can still be paired with
    /// its result.
    pub fn finalize(self) -> Result<CompletionResponse, ProviderError> {
        let mut tool_calls = Vec::with_capacity(self.tool_calls.len());
        for (index, partial) in self.tool_calls {
            if partial.name.is_empty() {
                return Err(ProviderError::MalformedResponse(format!(
                    "tool call at stream index {index} has no name"
                )));
            }
            let id = if partial.id.is_empty() {
                format!("call_{index}")
            } else {
                partial.id
            };
            tool_calls.push(MessageToolCall {
                id,
                name: partial.name,
                arguments: partial.arguments,
            });
        }

        Ok(CompletionResponse {
            message: Message::assistant_with_tool_calls(self.content, tool_calls),
            usage: self.usage,
            model: self.model,
            metadata: serde_json::Map::new(),
        })
    }
}
