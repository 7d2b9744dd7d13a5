//! Tool dispatch for one assistant turn.
//!
//! Given the tool calls of an assistant message, the dispatcher checks them
//! against the active agent's permissions, runs the handlers and folds the
//! results into tool messages, context updates and an optional handoff.

use std::sync::Arc;
use std::time::{Duration, Instant};

use agentrelay_core::agent::{AgentDefinition, HandoffTarget};
use agentrelay_core::error::ToolError;
use agentrelay_core::event::{DomainEvent, EventBus};
use agentrelay_core::message::{ContextVariables, Message, MessageToolCall};
use agentrelay_core::tool::{ToolContext, ToolOutcome, ToolRegistry};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Executes tool calls against a shared registry.
#[derive(Clone)]
pub struct ToolDispatcher {
    tools: Arc<ToolRegistry>,
    timeout: Option<Duration>,
    parallel: bool,
    event_bus: Arc<EventBus>,
}

/// What happened to one tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub call_id: String,
    pub tool_name: String,
    /// Content of the tool message
    pub output: String,
    pub success: bool,
}

/// The folded result of a batch of tool calls.
#[derive(Debug, Clone, Default)]
pub struct DispatchOutcome {
    /// One record per call, in request order
    pub records: Vec<ToolCallRecord>,

    /// Agent to hand control to; the last handoff in the batch wins
    pub next_agent: Option<HandoffTarget>,

    /// Context updates merged in request order
    pub context_updates: ContextVariables,

    /// Note addressed to the next agent by `switch_agent`
    pub handoff_note: Option<String>,
}

impl DispatchOutcome {
    /// Tool messages in request order, followed by the handoff note.
    pub fn to_messages(&self) -> Vec<Message> {
        let mut messages: Vec<Message> = self
            .records
            .iter()
            .map(|r| {
                Message::tool_result(&r.call_id, &r.output).with_metadata("tool", r.tool_name.as_str())
            })
            .collect();

        if let Some(note) = &self.handoff_note {
            let mut msg = Message::user(note);
            if let Some(target) = &self.next_agent {
                msg = msg.with_metadata("handoff_to", target.name());
            }
            messages.push(msg);
        }

        messages
    }
}

/// Result of invoking a single call, before folding.
struct Invocation {
    call_id: String,
    tool_name: String,
    result: Result<ToolOutcome, String>,
}

impl ToolDispatcher {
    pub fn new(tools: Arc<ToolRegistry>) -> Self {
        Self {
            tools,
            timeout: None,
            parallel: true,
            event_bus: Arc::new(EventBus::default()),
        }
    }

    /// Fail any single handler that runs longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run sibling calls concurrently (default) or one after another.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = event_bus;
        self
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    /// Dispatch every call of one assistant turn.
    ///
    /// A call to a registered tool the agent may not use aborts the whole
    /// batch before any handler runs. Every other failure becomes an error
    /// message the model can react to.
    pub async fn dispatch(
        &self,
        agent: &AgentDefinition,
        calls: &[MessageToolCall],
        context_variables: &ContextVariables,
    ) -> Result<DispatchOutcome, ToolError> {
        for call in calls {
            if self.tools.contains(&call.name) && !agent.allows(&call.name) {
                warn!(agent = %agent.name, tool = %call.name, "Unauthorized tool call");
                return Err(ToolError::Unauthorized {
                    agent: agent.name.clone(),
                    tool_name: call.name.clone(),
                });
            }
        }

        let context = ToolContext {
            agent: agent.name.clone(),
            context_variables: context_variables.clone(),
        };

        debug!(agent = %agent.name, calls = calls.len(), parallel = self.parallel, "Dispatching tool calls");

        let invocations = if self.parallel {
            join_all(calls.iter().map(|call| self.invoke(call, &context))).await
        } else {
            let mut invocations = Vec::with_capacity(calls.len());
            for call in calls {
                invocations.push(self.invoke(call, &context).await);
            }
            invocations
        };

        Ok(fold(invocations))
    }

    async fn invoke(&self, call: &MessageToolCall, context: &ToolContext) -> Invocation {
        let start = Instant::now();
        let result = self.run_handler(call, context).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        if let Err(error) = &result {
            warn!(tool = %call.name, error = %error, "Tool call failed");
        }
        self.event_bus.publish(DomainEvent::ToolExecuted {
            tool_name: call.name.clone(),
            success: result.is_ok(),
            duration_ms,
            timestamp: chrono::Utc::now(),
        });

        Invocation {
            call_id: call.id.clone(),
            tool_name: call.name.clone(),
            result,
        }
    }

    async fn run_handler(
        &self,
        call: &MessageToolCall,
        context: &ToolContext,
    ) -> Result<ToolOutcome, String> {
        if !self.tools.contains(&call.name) {
            return Err(format!("Error: Tool {} not found.", call.name));
        }

        let arguments = parse_arguments(&call.arguments)
            .map_err(|e| format!("Error: Invalid arguments for {}: {e}", call.name))?;

        let execution = self.tools.execute(&call.name, arguments, context);
        let result = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, execution).await {
                Ok(result) => result,
                Err(_) => Err(ToolError::Timeout {
                    tool_name: call.name.clone(),
                    timeout_ms: limit.as_millis() as u64,
                }),
            },
            None => execution.await,
        };

        result.map_err(|e| format!("Error: {e}"))
    }
}

/// Empty arguments mean "no arguments".
fn parse_arguments(raw: &str) -> Result<serde_json::Value, serde_json::Error> {
    if raw.trim().is_empty() {
        return Ok(serde_json::json!({}));
    }
    serde_json::from_str(raw)
}

fn fold(invocations: Vec<Invocation>) -> DispatchOutcome {
    let mut outcome = DispatchOutcome::default();

    for invocation in invocations {
        let (output, success) = match invocation.result {
            Err(message) => (message, false),
            Ok(ToolOutcome::Value(value)) => (value, true),
            Ok(ToolOutcome::Structured {
                value,
                context_variables,
                agent,
            }) => {
                outcome.context_updates.extend(context_variables);
                let output = match (value, &agent) {
                    (Some(value), _) => value,
                    (None, Some(target)) => {
                        serde_json::json!({ "assistant": target.name() }).to_string()
                    }
                    (None, None) => String::new(),
                };
                if agent.is_some() {
                    outcome.next_agent = agent;
                }
                (output, true)
            }
            Ok(ToolOutcome::AgentSwitch {
                to_agent,
                visible_message,
            }) => {
                let output = format!("Switched to agent {to_agent}.");
                outcome.next_agent = Some(HandoffTarget::Named(to_agent));
                outcome.handoff_note = Some(visible_message);
                (output, true)
            }
        };

        outcome.records.push(ToolCallRecord {
            call_id: invocation.call_id,
            tool_name: invocation.tool_name,
            output,
            success,
        });
    }

    outcome
}
