//! Session management: the `Swarm`.
//!
//! A swarm owns the agent registry, the tool registry and the completion
//! gateway, and keeps one conversation per session. Callers create a
//! session, run goals against it, inspect it and end it. Batch runs fan
//! many independent sessions out over a bounded window.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use agentrelay_config::AppConfig;
use agentrelay_core::agent::{AgentDefinition, AgentRegistry};
use agentrelay_core::error::{Error, ErrorKind, Result};
use agentrelay_core::event::{DomainEvent, EventBus};
use agentrelay_core::gateway::CompletionGateway;
use agentrelay_core::message::{ContextVariables, Message, Role};
use agentrelay_core::tool::ToolRegistry;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, mpsc};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::loop_runner::{AgentLoop, RunOutcome};
use crate::script::{Script, compose_goal};
use crate::stream_event::AgentStreamEvent;

/// Swarm-wide settings.
#[derive(Debug, Clone)]
pub struct SwarmOptions {
    pub default_model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub max_turns: Option<u32>,
    pub tool_timeout: Option<Duration>,
    pub parallel_tool_calls: bool,
    /// Agent sessions start with when none is named
    pub entry_agent: Option<String>,
    pub batch: BatchOptions,
}

impl Default for SwarmOptions {
    fn default() -> Self {
        Self {
            default_model: "gpt-4o-mini".into(),
            temperature: 0.7,
            max_tokens: None,
            max_turns: None,
            tool_timeout: None,
            parallel_tool_calls: true,
            entry_agent: None,
            batch: BatchOptions::default(),
        }
    }
}

impl SwarmOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            default_model: config.default_model.clone(),
            temperature: config.default_temperature,
            max_tokens: Some(config.default_max_tokens),
            max_turns: config.runtime.max_turns,
            tool_timeout: config.runtime.tool_timeout_secs.map(Duration::from_secs),
            parallel_tool_calls: config.runtime.parallel_tool_calls,
            entry_agent: config.entry_agent().map(String::from),
            batch: BatchOptions {
                concurrency: config.batch.concurrency,
                batch_size: config.batch.batch_size,
            },
        }
    }
}

/// Per-run options.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Plan appended to the goal
    pub script: Option<String>,
}

/// Batch fan-out limits.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BatchOptions {
    pub concurrency: usize,
    pub batch_size: usize,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            concurrency: 3,
            batch_size: 10,
        }
    }
}

impl BatchOptions {
    /// Sessions in flight at once.
    pub fn window(&self) -> usize {
        self.concurrency.min(self.batch_size).max(1)
    }
}

/// One entry of a batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRequest {
    pub id: String,
    pub goal: String,
    #[serde(default)]
    pub agent: Option<String>,
    #[serde(default)]
    pub script: Option<String>,
}

/// Outcome of one batch entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResult {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<BatchError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchError {
    pub kind: ErrorKind,
    pub message: String,
}

impl BatchResult {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Idle,
    Running,
    Failed,
}

/// Returned by `create_session`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionHandle {
    pub id: String,
    pub agent: String,
    pub thread_id: Option<String>,
}

/// A read-only view of a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub id: String,
    pub agent: String,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub turns: u32,
    pub messages: usize,
    /// Tool outputs keyed `$1`, `$2`, ... in arrival order
    pub node_results: Vec<(String, String)>,
    pub context_variables: ContextVariables,
    pub thread_id: Option<String>,
    pub last_error: Option<String>,
}

#[derive(Debug)]
struct Session {
    id: String,
    /// Active agent; may be an inline handoff target outside the registry
    agent: Arc<AgentDefinition>,
    created_at: DateTime<Utc>,
    history: Vec<Message>,
    context_variables: ContextVariables,
    node_results: Vec<String>,
    turns: u32,
    status: SessionStatus,
    thread_id: Option<String>,
    last_error: Option<String>,
}

impl Session {
    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id.clone(),
            agent: self.agent.name.clone(),
            status: self.status,
            created_at: self.created_at,
            turns: self.turns,
            messages: self.history.len(),
            node_results: self
                .node_results
                .iter()
                .enumerate()
                .map(|(i, output)| (format!("${}", i + 1), output.clone()))
                .collect(),
            context_variables: self.context_variables.clone(),
            thread_id: self.thread_id.clone(),
            last_error: self.last_error.clone(),
        }
    }
}

/// What a run needs from its session, taken under the lock.
struct RunStart {
    agent: Arc<AgentDefinition>,
    history: Vec<Message>,
    context_variables: ContextVariables,
}

/// Shared session table.
#[derive(Clone, Default)]
struct SessionStore {
    sessions: Arc<RwLock<HashMap<String, Session>>>,
}

impl SessionStore {
    /// Mark a session running and hand back its state plus the new goal.
    async fn begin(&self, id: &str, goal: Message) -> Result<RunStart> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(id)
            .ok_or_else(|| Error::InvalidFlow(format!("session {id} not found")))?;

        if session.status == SessionStatus::Running {
            return Err(Error::InvalidFlow(format!("session {id} is already running")));
        }

        session.status = SessionStatus::Running;

        let mut history = session.history.clone();
        history.push(goal);
        Ok(RunStart {
            agent: session.agent.clone(),
            history,
            context_variables: session.context_variables.clone(),
        })
    }

    /// Fold a run's result back into its session.
    async fn finish(
        &self,
        id: &str,
        goal: Message,
        result: std::result::Result<&RunOutcome, &Error>,
    ) {
        let mut sessions = self.sessions.write().await;
        let Some(session) = sessions.get_mut(id) else {
            debug!(session_id = %id, "Session ended while running; discarding result");
            return;
        };

        match result {
            Ok(outcome) => {
                session.history.push(goal);
                session.history.extend(outcome.messages.iter().cloned());
                session.node_results.extend(
                    outcome
                        .messages
                        .iter()
                        .filter(|m| m.role == Role::Tool)
                        .map(|m| m.content.clone()),
                );
                if let Some(agent) = &outcome.active_agent {
                    session.agent = agent.clone();
                }
                session.context_variables = outcome.context_variables.clone();
                session.turns += outcome.turns;
                session.status = SessionStatus::Idle;
                session.last_error = None;
            }
            Err(e) => {
                session.status = SessionStatus::Failed;
                session.last_error = Some(format!("[{}] {e}", e.kind()));
            }
        }
    }
}

/// The multi-agent session manager.
pub struct Swarm {
    runner: AgentLoop,
    store: SessionStore,
    options: SwarmOptions,
}

impl Swarm {
    /// Build a swarm from configuration: agents come from `[[agents]]`,
    /// handlers from `tools`.
    pub fn init(
        config: &AppConfig,
        gateway: Arc<dyn CompletionGateway>,
        tools: ToolRegistry,
    ) -> Result<Self> {
        config.validate()?;

        let mut agents = AgentRegistry::new();
        for agent in &config.agents {
            agents.register(agent.to_definition())?;
        }

        Self::new(agents, tools, gateway, SwarmOptions::from_config(config))
    }

    /// Build a swarm from already constructed agents.
    pub fn new(
        agents: AgentRegistry,
        tools: ToolRegistry,
        gateway: Arc<dyn CompletionGateway>,
        options: SwarmOptions,
    ) -> Result<Self> {
        if agents.is_empty() {
            return Err(Error::Initialization("no agents defined".into()));
        }

        for agent in agents.iter() {
            if let Some(tool) = agent.allowed_tools.iter().find(|t| !tools.contains(t)) {
                return Err(Error::Initialization(format!(
                    "agent '{}' allows unregistered tool '{tool}'",
                    agent.name
                )));
            }
        }

        if let Some(cycle) = agents.successor_cycle() {
            return Err(Error::Initialization(format!(
                "successor cycle: {}",
                cycle.join(" -> ")
            )));
        }

        if let Some(entry) = &options.entry_agent
            && agents.get(entry).is_none()
        {
            return Err(Error::Initialization(format!(
                "entry agent '{entry}' is not defined"
            )));
        }

        info!(
            agents = agents.len(),
            tools = tools.len(),
            gateway = gateway.name(),
            "Swarm initialized"
        );

        let mut runner = AgentLoop::new(
            gateway,
            Arc::new(agents),
            Arc::new(tools),
            options.default_model.clone(),
        )
        .with_temperature(options.temperature)
        .with_max_turns(options.max_turns)
        .with_tool_timeout(options.tool_timeout)
        .with_parallel_tool_calls(options.parallel_tool_calls);
        if let Some(max_tokens) = options.max_tokens {
            runner = runner.with_max_tokens(max_tokens);
        }

        Ok(Self {
            runner,
            store: SessionStore::default(),
            options,
        })
    }

    pub fn agents(&self) -> &Arc<AgentRegistry> {
        self.runner.agents()
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        self.runner.tools()
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        self.runner.event_bus()
    }

    pub fn options(&self) -> &SwarmOptions {
        &self.options
    }

    /// Entry agent: configured, else the first registered agent.
    fn entry_agent(&self) -> Option<Arc<AgentDefinition>> {
        match &self.options.entry_agent {
            Some(name) => self.agents().get(name),
            None => self.agents().first(),
        }
    }

    /// Start a session with `agent`, or the entry agent when `None`.
    pub async fn create_session(&self, agent: Option<&str>) -> Result<SessionHandle> {
        let agent = match agent {
            Some(name) => self.agents().require(name)?,
            None => self
                .entry_agent()
                .ok_or_else(|| Error::Initialization("no entry agent".into()))?,
        };
        let name = agent.name.clone();

        let thread_id = self.runner.gateway().open_thread().await?;
        let id = Uuid::new_v4().to_string();

        let session = Session {
            id: id.clone(),
            agent,
            created_at: Utc::now(),
            history: Vec::new(),
            context_variables: ContextVariables::new(),
            node_results: Vec::new(),
            turns: 0,
            status: SessionStatus::Idle,
            thread_id: thread_id.clone(),
            last_error: None,
        };
        self.store.sessions.write().await.insert(id.clone(), session);

        info!(session_id = %id, agent = %name, "Session created");
        self.event_bus().publish(DomainEvent::SessionStarted {
            session_id: id.clone(),
            agent: name.clone(),
            timestamp: Utc::now(),
        });

        Ok(SessionHandle {
            id,
            agent: name,
            thread_id,
        })
    }

    fn goal_message(&self, goal: &str, options: &RunOptions) -> Message {
        if let Some(script) = options.script.as_deref() {
            let tools = self.tools().names();
            for finding in Script::parse(script).lint(&tools) {
                warn!(finding = %finding, "Script lint");
            }
        }
        Message::user(compose_goal(goal, options.script.as_deref()))
    }

    /// Run a goal in a session and return the final assistant text.
    pub async fn run_session(&self, id: &str, goal: &str, options: RunOptions) -> Result<String> {
        let goal = self.goal_message(goal, &options);
        let start = self.store.begin(id, goal.clone()).await?;

        debug!(session_id = %id, agent = %start.agent.name, "Running session");
        let result = self
            .runner
            .run(start.agent, start.history, start.context_variables)
            .await;

        self.store.finish(id, goal, result.as_ref()).await;
        if let Err(e) = &result {
            publish_failure(self.event_bus(), id, e);
        }

        result.map(|outcome| outcome.final_text().unwrap_or_default().to_string())
    }

    /// Run a goal with streaming.
    ///
    /// The session is updated before the final `Done` or error is sent.
    /// Dropping the stream stops the run at its next event and leaves the
    /// session failed; it stays running until then.
    pub async fn run_session_stream(
        &self,
        id: &str,
        goal: &str,
        options: RunOptions,
    ) -> Result<ReceiverStream<Result<AgentStreamEvent>>> {
        let goal = self.goal_message(goal, &options);
        let start = self.store.begin(id, goal.clone()).await?;

        let (tx, rx) = mpsc::channel(64);
        let runner = self.runner.clone();
        let store = self.store.clone();
        let id = id.to_string();

        tokio::spawn(async move {
            let result = runner
                .run_with_events(start.agent, start.history, start.context_variables, &tx)
                .await;
            store.finish(&id, goal, result.as_ref()).await;
            if let Err(e) = &result {
                publish_failure(runner.event_bus(), &id, e);
            }
            let _ = tx.send(result.map(AgentStreamEvent::Done)).await;
        });

        Ok(ReceiverStream::new(rx))
    }

    /// Remove a session and release its transport thread.
    pub async fn end_session(&self, id: &str) -> Result<()> {
        let session = self
            .store
            .sessions
            .write()
            .await
            .remove(id)
            .ok_or_else(|| Error::InvalidFlow(format!("session {id} not found")))?;

        if let Some(thread_id) = &session.thread_id
            && let Err(e) = self.runner.gateway().close_thread(thread_id).await
        {
            warn!(session_id = %id, thread_id = %thread_id, error = %e, "Failed to close thread");
        }

        info!(session_id = %id, turns = session.turns, "Session ended");
        self.event_bus().publish(DomainEvent::SessionEnded {
            session_id: id.to_string(),
            timestamp: Utc::now(),
        });
        Ok(())
    }

    pub async fn get_status(&self, id: &str) -> Result<SessionSnapshot> {
        self.store
            .sessions
            .read()
            .await
            .get(id)
            .map(Session::snapshot)
            .ok_or_else(|| Error::InvalidFlow(format!("session {id} not found")))
    }

    /// Ids of live sessions.
    pub async fn session_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.store.sessions.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Run independent goals, each in its own session.
    ///
    /// Requests are processed in windows of `min(concurrency, batch_size)`;
    /// a window drains before the next starts. One failing entry never
    /// affects the others. Results come back in request order.
    pub async fn run_batch(
        &self,
        requests: Vec<BatchRequest>,
        options: Option<BatchOptions>,
    ) -> Vec<BatchResult> {
        let options = options.unwrap_or(self.options.batch);
        let window = options.window();
        info!(requests = requests.len(), window, "Starting batch run");

        let mut results = Vec::with_capacity(requests.len());
        for chunk in requests.chunks(window) {
            let runs = chunk.iter().map(|request| self.run_batch_entry(request));
            results.extend(join_all(runs).await);
        }

        let failed = results.iter().filter(|r| !r.is_ok()).count();
        info!(total = results.len(), failed, "Batch run finished");
        results
    }

    async fn run_batch_entry(&self, request: &BatchRequest) -> BatchResult {
        let run = async {
            let handle = self.create_session(request.agent.as_deref()).await?;
            let options = RunOptions {
                script: request.script.clone(),
            };
            let result = self.run_session(&handle.id, &request.goal, options).await;
            if let Err(e) = self.end_session(&handle.id).await {
                warn!(session_id = %handle.id, error = %e, "Failed to end batch session");
            }
            result
        };

        match run.await {
            Ok(output) => BatchResult {
                id: request.id.clone(),
                result: Some(output),
                error: None,
            },
            Err(e) => {
                warn!(request_id = %request.id, error = %e, "Batch entry failed");
                BatchResult {
                    id: request.id.clone(),
                    result: None,
                    error: Some(BatchError {
                        kind: e.kind(),
                        message: e.to_string(),
                    }),
                }
            }
        }
    }

    /// End every live session.
    pub async fn shutdown(&self) {
        for id in self.session_ids().await {
            if let Err(e) = self.end_session(&id).await {
                warn!(session_id = %id, error = %e, "Failed to end session during shutdown");
            }
        }
        info!("Swarm shut down");
    }
}

fn publish_failure(event_bus: &EventBus, id: &str, error: &Error) {
    event_bus.publish(DomainEvent::ErrorOccurred {
        context: format!("session {id}"),
        error_message: error.to_string(),
        timestamp: Utc::now(),
    });
}
