//! Agent definitions and the registry the loop resolves handoffs against.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::AgentError;
use crate::message::{ContextVariables, ConversationState};

/// System instructions for an agent.
#[derive(Clone)]
pub enum Instructions {
    /// A fixed prompt.
    Static(String),
    /// A prompt computed from the context variables on every request.
    Dynamic(Arc<dyn Fn(&ContextVariables) -> String + Send + Sync>),
}

impl Instructions {
    /// Build dynamic instructions from a closure.
    pub fn dynamic<F>(f: F) -> Self
    where
        F: Fn(&ContextVariables) -> String + Send + Sync + 'static,
    {
        Self::Dynamic(Arc::new(f))
    }

    /// Resolve against the current context. Never cached.
    pub fn resolve(&self, context: &ContextVariables) -> String {
        match self {
            Self::Static(text) => text.clone(),
            Self::Dynamic(f) => f(context),
        }
    }
}

impl From<&str> for Instructions {
    fn from(s: &str) -> Self {
        Self::Static(s.to_string())
    }
}

impl From<String> for Instructions {
    fn from(s: String) -> Self {
        Self::Static(s)
    }
}

impl std::fmt::Debug for Instructions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Static(text) => f.debug_tuple("Static").field(text).finish(),
            Self::Dynamic(_) => f.write_str("Dynamic(<fn>)"),
        }
    }
}

/// How the model should choose among the agent's tools.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolChoice {
    /// The model decides.
    #[default]
    Auto,
    /// The model must not call tools.
    None,
    /// The model must call this tool.
    #[serde(rename = "tool")]
    Forced(String),
}

/// Agent-declared handoff that happens without a tool call.
///
/// Consulted by the loop only when a turn ends with no tool calls.
pub trait TransferPolicy: Send + Sync {
    /// Whether the agent's turn is done and control should pass on.
    fn should_transfer_manually(&self, state: &ConversationState) -> bool;

    /// The agent to hand control to; `None` ends the run instead.
    fn next_agent(&self, state: &ConversationState) -> Option<String>;

    /// The agent this policy always transfers to, when that is fixed.
    ///
    /// Used to reject successor cycles before any run starts.
    fn fixed_successor(&self) -> Option<&str> {
        None
    }
}

/// Always defers to a fixed successor once the agent stops calling tools.
#[derive(Debug, Clone)]
pub struct SuccessorTransfer {
    successor: String,
}

impl SuccessorTransfer {
    pub fn new(successor: impl Into<String>) -> Self {
        Self {
            successor: successor.into(),
        }
    }
}

impl TransferPolicy for SuccessorTransfer {
    fn should_transfer_manually(&self, _state: &ConversationState) -> bool {
        true
    }

    fn next_agent(&self, _state: &ConversationState) -> Option<String> {
        Some(self.successor.clone())
    }

    fn fixed_successor(&self) -> Option<&str> {
        Some(&self.successor)
    }
}

/// Find a cycle in a successor graph given as `(agent, successor)` pairs.
///
/// Returns the agents on the first cycle found, starting and ending with
/// the same name (`["a", "b", "a"]`).
pub fn find_successor_cycle<'a>(
    edges: impl IntoIterator<Item = (&'a str, Option<&'a str>)>,
) -> Option<Vec<String>> {
    let edges: Vec<(&str, Option<&str>)> = edges.into_iter().collect();
    let next: HashMap<&str, &str> = edges
        .iter()
        .filter_map(|(agent, successor)| successor.map(|s| (*agent, s)))
        .collect();

    let mut settled: HashSet<&str> = HashSet::new();
    for (start, _) in &edges {
        let mut path: Vec<&str> = Vec::new();
        let mut current = *start;
        loop {
            if settled.contains(current) {
                break;
            }
            if let Some(pos) = path.iter().position(|a| *a == current) {
                let mut cycle: Vec<String> = path[pos..].iter().map(|a| a.to_string()).collect();
                cycle.push(current.to_string());
                return Some(cycle);
            }
            path.push(current);
            match next.get(current) {
                Some(&successor) => current = successor,
                None => break,
            }
        }
        settled.extend(path);
    }
    None
}

/// An immutable agent descriptor.
#[derive(Clone)]
pub struct AgentDefinition {
    /// Unique name within a registry
    pub name: String,

    /// What this agent is for
    pub description: String,

    /// Model override; the loop's default model is used when absent
    pub model: Option<String>,

    /// System instructions
    pub instructions: Instructions,

    /// Tools this agent may call, in advertisement order
    pub allowed_tools: Vec<String>,

    /// Tool choice policy
    pub tool_choice: ToolChoice,

    /// Manual transfer behavior
    pub transfer: Option<Arc<dyn TransferPolicy>>,
}

impl AgentDefinition {
    /// Create an agent with no tools.
    pub fn new(name: impl Into<String>, instructions: impl Into<Instructions>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            model: None,
            instructions: instructions.into(),
            allowed_tools: Vec::new(),
            tool_choice: ToolChoice::Auto,
            transfer: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the permitted tools. Duplicates are dropped, order is kept.
    pub fn with_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_tools.clear();
        for tool in tools {
            let tool = tool.into();
            if !self.allowed_tools.contains(&tool) {
                self.allowed_tools.push(tool);
            }
        }
        self
    }

    pub fn with_tool_choice(mut self, choice: ToolChoice) -> Self {
        self.tool_choice = choice;
        self
    }

    pub fn with_transfer(mut self, policy: Arc<dyn TransferPolicy>) -> Self {
        self.transfer = Some(policy);
        self
    }

    /// Whether this agent may call `tool_name`.
    pub fn allows(&self, tool_name: &str) -> bool {
        self.allowed_tools.iter().any(|t| t == tool_name)
    }
}

impl std::fmt::Debug for AgentDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentDefinition")
            .field("name", &self.name)
            .field("model", &self.model)
            .field("instructions", &self.instructions)
            .field("allowed_tools", &self.allowed_tools)
            .field("tool_choice", &self.tool_choice)
            .field("transfer", &self.transfer.is_some())
            .finish()
    }
}

/// Where a handoff points.
#[derive(Debug, Clone)]
pub enum HandoffTarget {
    /// A registered agent, by name.
    Named(String),
    /// An agent definition carried by the tool result itself.
    Agent(Arc<AgentDefinition>),
}

impl HandoffTarget {
    pub fn name(&self) -> &str {
        match self {
            Self::Named(name) => name,
            Self::Agent(agent) => &agent.name,
        }
    }
}

/// Agents known to a swarm, by name. Remembers registration order.
#[derive(Debug, Default)]
pub struct AgentRegistry {
    agents: HashMap<String, Arc<AgentDefinition>>,
    order: Vec<String>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an agent. Names must be unique.
    pub fn register(&mut self, agent: AgentDefinition) -> Result<Arc<AgentDefinition>, AgentError> {
        if self.agents.contains_key(&agent.name) {
            return Err(AgentError::DuplicateAgent(agent.name));
        }
        let agent = Arc::new(agent);
        self.order.push(agent.name.clone());
        self.agents.insert(agent.name.clone(), agent.clone());
        Ok(agent)
    }

    pub fn get(&self, name: &str) -> Option<Arc<AgentDefinition>> {
        self.agents.get(name).cloned()
    }

    /// Look up an agent by name, failing with `UnknownAgent`.
    pub fn require(&self, name: &str) -> Result<Arc<AgentDefinition>, AgentError> {
        self.get(name)
            .ok_or_else(|| AgentError::UnknownAgent(name.to_string()))
    }

    /// Turn a handoff target into the agent that becomes active.
    pub fn resolve(&self, target: &HandoffTarget) -> Result<Arc<AgentDefinition>, AgentError> {
        match target {
            HandoffTarget::Named(name) => self.require(name),
            HandoffTarget::Agent(agent) => Ok(agent.clone()),
        }
    }

    /// Registered agent names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.agents.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// The first agent registered.
    pub fn first(&self) -> Option<Arc<AgentDefinition>> {
        self.order.first().and_then(|name| self.get(name))
    }

    /// Agents in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<AgentDefinition>> {
        self.order.iter().filter_map(|name| self.agents.get(name))
    }

    /// A successor cycle among registered agents, if any.
    pub fn successor_cycle(&self) -> Option<Vec<String>> {
        find_successor_cycle(self.iter().map(|agent| {
            let successor = agent
                .transfer
                .as_ref()
                .and_then(|policy| policy.fixed_successor());
            (agent.name.as_str(), successor)
        }))
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}
