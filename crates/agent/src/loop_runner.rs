//! The agent execution loop.
//!
//! Each turn resolves the active agent's instructions, sends the history to
//! the completion gateway with the agent's tools, dispatches any tool calls
//! and follows handoffs, until a turn ends without tool calls and without a
//! manual transfer.

use std::sync::Arc;
use std::time::Duration;

use agentrelay_core::agent::{AgentDefinition, AgentRegistry};
use agentrelay_core::error::{Error, Result};
use agentrelay_core::event::{DomainEvent, EventBus};
use agentrelay_core::gateway::{CompletionGateway, CompletionRequest, CompletionResponse, Usage};
use agentrelay_core::message::{ContextVariables, ConversationState, Message, Role};
use agentrelay_core::stream::CompletionAccumulator;
use agentrelay_core::tool::ToolRegistry;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use crate::dispatcher::ToolDispatcher;
use crate::stream_event::AgentStreamEvent;

/// The result of one run of the loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutcome {
    /// Messages produced by this run, excluding the caller's history
    pub messages: Vec<Message>,

    /// The agent active when the run ended
    pub agent: String,

    /// Definition of `agent`. May be an inline agent that is not registered.
    #[serde(skip)]
    pub active_agent: Option<Arc<AgentDefinition>>,

    /// Context variables after the run
    pub context_variables: ContextVariables,

    /// Assistant turns consumed
    pub turns: u32,

    /// Token usage summed over all turns
    pub usage: Usage,
}

impl RunOutcome {
    /// Content of the last assistant message of the run.
    pub fn final_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .map(|m| m.content.as_str())
    }
}

pub type EventSender = mpsc::Sender<Result<AgentStreamEvent>>;

/// The core loop. Cheap to clone; all collaborators are shared.
#[derive(Clone)]
pub struct AgentLoop {
    gateway: Arc<dyn CompletionGateway>,
    agents: Arc<AgentRegistry>,
    dispatcher: ToolDispatcher,
    default_model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    max_turns: Option<u32>,
    event_bus: Arc<EventBus>,
}

impl AgentLoop {
    pub fn new(
        gateway: Arc<dyn CompletionGateway>,
        agents: Arc<AgentRegistry>,
        tools: Arc<ToolRegistry>,
        default_model: impl Into<String>,
    ) -> Self {
        let event_bus = Arc::new(EventBus::default());
        Self {
            gateway,
            agents,
            dispatcher: ToolDispatcher::new(tools).with_event_bus(event_bus.clone()),
            default_model: default_model.into(),
            temperature: 0.7,
            max_tokens: None,
            max_turns: None,
            event_bus,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set the default max tokens per response.
    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    /// Bound the number of assistant turns per run. `None` is unbounded.
    pub fn with_max_turns(mut self, max: Option<u32>) -> Self {
        self.max_turns = max;
        self
    }

    pub fn with_tool_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.dispatcher = self.dispatcher.with_timeout(timeout);
        self
    }

    pub fn with_parallel_tool_calls(mut self, parallel: bool) -> Self {
        self.dispatcher = self.dispatcher.with_parallel(parallel);
        self
    }

    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.dispatcher = self.dispatcher.with_event_bus(event_bus.clone());
        self.event_bus = event_bus;
        self
    }

    pub fn agents(&self) -> &Arc<AgentRegistry> {
        &self.agents
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        self.dispatcher.tools()
    }

    pub fn gateway(&self) -> &Arc<dyn CompletionGateway> {
        &self.gateway
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    /// Run to completion and return the new messages.
    pub async fn run(
        &self,
        agent: Arc<AgentDefinition>,
        history: Vec<Message>,
        context_variables: ContextVariables,
    ) -> Result<RunOutcome> {
        self.drive(agent, history, context_variables, None).await
    }

    /// Run with streaming. Events arrive as the gateway produces them; a
    /// fatal error is yielded as the last item.
    pub fn run_stream(
        &self,
        agent: Arc<AgentDefinition>,
        history: Vec<Message>,
        context_variables: ContextVariables,
    ) -> ReceiverStream<Result<AgentStreamEvent>> {
        let (tx, rx) = mpsc::channel(64);
        let runner = self.clone();

        tokio::spawn(async move {
            let result = runner
                .run_with_events(agent, history, context_variables, &tx)
                .await;
            let _ = tx.send(result.map(AgentStreamEvent::Done)).await;
        });

        ReceiverStream::new(rx)
    }

    /// Run with streaming into `events`, returning the outcome instead of
    /// sending `Done`. Stops with an error once the receiver is dropped.
    pub async fn run_with_events(
        &self,
        agent: Arc<AgentDefinition>,
        history: Vec<Message>,
        context_variables: ContextVariables,
        events: &EventSender,
    ) -> Result<RunOutcome> {
        self.drive(agent, history, context_variables, Some(events))
            .await
    }

    async fn drive(
        &self,
        agent: Arc<AgentDefinition>,
        history: Vec<Message>,
        context_variables: ContextVariables,
        events: Option<&EventSender>,
    ) -> Result<RunOutcome> {
        let mut state = ConversationState::with_context(context_variables);
        state.extend(history);
        let prefix = state.messages.len();

        let mut active = agent;
        let mut turns: u32 = 0;
        let mut usage = Usage::default();
        // Agents visited through manual transfers since the last tool call
        let mut transfer_chain: Vec<String> = Vec::new();

        info!(agent = %active.name, history = prefix, "Starting agent run");

        loop {
            if let Some(max) = self.max_turns
                && turns >= max
            {
                warn!(agent = %active.name, turns, "Max turns reached");
                return Err(Error::MaxTurnsExceeded { max_turns: max });
            }
            turns += 1;

            emit(events, AgentStreamEvent::TurnStarted {
                agent: active.name.clone(),
                turn: turns,
            })
            .await?;

            let request = self.build_request(&active, &state, events.is_some());
            let response = match events {
                Some(tx) => self.stream_turn(&active.name, request, tx).await?,
                None => self.gateway.complete(request).await?,
            };

            let turn_tokens = response.usage.map(|u| u.total_tokens).unwrap_or(0);
            if let Some(turn_usage) = &response.usage {
                usage.add(turn_usage);
            }

            let mut message = response.message.with_metadata("agent", active.name.as_str());
            message.role = Role::Assistant;
            let tool_calls = message.tool_calls.clone();

            debug!(agent = %active.name, turn = turns, tool_calls = tool_calls.len(), "Turn completed");
            self.event_bus.publish(DomainEvent::TurnCompleted {
                agent: active.name.clone(),
                turn: turns,
                tool_calls: tool_calls.len(),
                tokens_used: turn_tokens,
                timestamp: Utc::now(),
            });

            state.push(message.clone());
            emit(events, AgentStreamEvent::TurnEnded {
                agent: active.name.clone(),
                turn: turns,
                message,
            })
            .await?;

            if tool_calls.is_empty() {
                let successor = active
                    .transfer
                    .as_ref()
                    .filter(|policy| policy.should_transfer_manually(&state))
                    .and_then(|policy| policy.next_agent(&state));

                match successor {
                    Some(next) => {
                        let next = self.agents.require(&next)?;
                        transfer_chain.push(active.name.clone());
                        if transfer_chain.contains(&next.name) {
                            transfer_chain.push(next.name.clone());
                            return Err(Error::InvalidFlow(format!(
                                "manual transfer cycle: {}",
                                transfer_chain.join(" -> ")
                            )));
                        }
                        self.handoff(&active, &next, true, events).await?;
                        active = next;
                        continue;
                    }
                    None => break,
                }
            }
            transfer_chain.clear();

            let outcome = self
                .dispatcher
                .dispatch(&active, &tool_calls, &state.context_variables)
                .await?;

            for record in &outcome.records {
                emit(events, AgentStreamEvent::ToolResult(record.clone())).await?;
            }

            state.merge_context(outcome.context_updates.clone());
            state.extend(outcome.to_messages());

            if let Some(target) = &outcome.next_agent {
                let next = self.agents.resolve(target)?;
                self.handoff(&active, &next, false, events).await?;
                active = next;
            }
        }

        info!(agent = %active.name, turns, tokens = usage.total_tokens, "Agent run finished");

        Ok(RunOutcome {
            messages: state.messages.split_off(prefix),
            agent: active.name.clone(),
            active_agent: Some(active),
            context_variables: state.context_variables,
            turns,
            usage,
        })
    }

    /// System instructions first, resolved against the current context.
    fn build_request(
        &self,
        agent: &AgentDefinition,
        state: &ConversationState,
        stream: bool,
    ) -> CompletionRequest {
        let mut messages = Vec::with_capacity(state.messages.len() + 1);
        messages.push(Message::system(agent.instructions.resolve(&state.context_variables)));
        messages.extend(state.messages.iter().cloned());

        CompletionRequest {
            model: agent
                .model
                .clone()
                .unwrap_or_else(|| self.default_model.clone()),
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            tools: self.dispatcher.tools().definitions_for(&agent.allowed_tools),
            tool_choice: agent.tool_choice.clone(),
            stream,
        }
    }

    async fn stream_turn(
        &self,
        agent: &str,
        request: CompletionRequest,
        events: &EventSender,
    ) -> Result<CompletionResponse> {
        let mut accumulator = CompletionAccumulator::new(request.model.clone());
        let mut deltas = self.gateway.stream(request).await?;

        while let Some(delta) = deltas.recv().await {
            let delta = delta?;
            accumulator.apply(&delta);
            emit(Some(events), AgentStreamEvent::Delta {
                agent: agent.to_string(),
                delta,
            })
            .await?;
            if accumulator.is_finished() {
                break;
            }
        }

        Ok(accumulator.finalize()?)
    }

    async fn handoff(
        &self,
        from: &AgentDefinition,
        to: &AgentDefinition,
        manual: bool,
        events: Option<&EventSender>,
    ) -> Result<()> {
        info!(from = %from.name, to = %to.name, manual, "Agent handoff");
        self.event_bus.publish(DomainEvent::AgentHandoff {
            from: from.name.clone(),
            to: to.name.clone(),
            manual,
            timestamp: Utc::now(),
        });
        emit(events, AgentStreamEvent::Handoff {
            from: from.name.clone(),
            to: to.name.clone(),
            manual,
        })
        .await
    }
}

/// Forward an event to a streaming caller. A dropped receiver ends the run.
async fn emit(events: Option<&EventSender>, event: AgentStreamEvent) -> Result<()> {
    if let Some(tx) = events
        && tx.send(Ok(event)).await.is_err()
    {
        debug!("Stream receiver dropped; stopping run");
        return Err(Error::Execution("stream receiver dropped".into()));
    }
    Ok(())
}
