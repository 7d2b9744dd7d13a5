//! The agent runtime: loop, tool dispatch and sessions.
//!
//! A run follows a **Request → Dispatch → Hand off** cycle:
//!
//! 1. **Build the request** from the active agent's instructions, its
//!    allowed tools and the conversation so far
//! 2. **Send it** through the configured [`CompletionGateway`]
//! 3. **If tool calls**: execute them, append the results and switch agent
//!    when a tool hands off, then loop back to step 1
//! 4. **If text only**: consult the agent's transfer policy, then stop
//!
//! The [`Swarm`] wraps the loop with per-session history and batch runs.
//!
//! [`CompletionGateway`]: agentrelay_core::CompletionGateway

pub mod dispatcher;
pub mod loop_runner;
pub mod script;
pub mod session;
pub mod stream_event;

#[cfg(test)]
mod test_helpers;

pub use dispatcher::{DispatchOutcome, ToolCallRecord, ToolDispatcher};
pub use loop_runner::{AgentLoop, RunOutcome};
pub use script::{Script, ScriptStep, compose_goal};
pub use session::{
    BatchError, BatchOptions, BatchRequest, BatchResult, RunOptions, SessionHandle,
    SessionSnapshot, SessionStatus, Swarm, SwarmOptions,
};
pub use stream_event::AgentStreamEvent;
