//! # AgentRelay Core
//!
//! Domain types, traits, and error definitions for the AgentRelay
//! multi-agent runtime. Every other crate in the workspace depends inward
//! on this one.
//!
//! ## Design Philosophy
//!
//! Each collaborator of the agent loop is a trait defined here:
//! - [`CompletionGateway`] abstracts the language-model service
//! - [`Tool`] abstracts an executable capability
//! - [`TransferPolicy`] abstracts agent-declared (non-tool) handoffs
//!
//! Implementations live in their respective crates, which keeps the loop
//! testable against scripted gateways and in-process tools.

pub mod agent;
pub mod error;
pub mod event;
pub mod gateway;
pub mod message;
pub mod stream;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use agent::{
    AgentDefinition, AgentRegistry, HandoffTarget, Instructions, SuccessorTransfer, ToolChoice,
    TransferPolicy, find_successor_cycle,
};
pub use error::{AgentError, Error, ErrorKind, ProviderError, Result, ToolError};
pub use event::{DomainEvent, EventBus};
pub use gateway::{CompletionGateway, CompletionRequest, CompletionResponse, StreamDelta, Usage};
pub use message::{ContextVariables, ConversationState, Message, MessageToolCall, Role};
pub use stream::CompletionAccumulator;
pub use tool::{FunctionTool, Tool, ToolContext, ToolDefinition, ToolOutcome, ToolRegistry};
