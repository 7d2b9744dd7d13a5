//! Tool trait: the abstraction over agent capabilities.
//!
//! Tools are what let an agent act: look up a customer, check the weather,
//! or hand the conversation to another agent. The loop treats them as
//! opaque async capabilities it must authorize and invoke.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::agent::HandoffTarget;
use crate::error::ToolError;
use crate::message::ContextVariables;

pub use crate::gateway::ToolDefinition;

/// What a tool can see about the run that invoked it.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    /// Name of the agent that requested the call
    pub agent: String,

    /// Context variables as of the start of the batch
    pub context_variables: ContextVariables,
}

/// The result of a tool execution, decided by variant rather than by shape.
#[derive(Debug, Clone)]
pub enum ToolOutcome {
    /// Plain output; the same agent continues.
    Value(String),

    /// Output with optional context updates and an optional handoff.
    Structured {
        value: Option<String>,
        context_variables: ContextVariables,
        agent: Option<HandoffTarget>,
    },

    /// Emitted by the built-in `switch_agent` tool: switch agents and tell
    /// the new agent where to resume.
    AgentSwitch {
        to_agent: String,
        visible_message: String,
    },
}

impl ToolOutcome {
    pub fn value(value: impl Into<String>) -> Self {
        Self::Value(value.into())
    }

    /// Hand control to `target` with no other output.
    pub fn handoff(target: HandoffTarget) -> Self {
        Self::Structured {
            value: None,
            context_variables: ContextVariables::new(),
            agent: Some(target),
        }
    }

    /// Output plus context updates.
    pub fn with_context(value: impl Into<String>, context_variables: ContextVariables) -> Self {
        Self::Structured {
            value: Some(value.into()),
            context_variables,
            agent: None,
        }
    }
}

/// The core Tool trait.
///
/// Each tool implements this trait and is registered in a [`ToolRegistry`];
/// agents name the tools they may call.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "calculator").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the LLM).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Whether the completion service executes this tool itself.
    fn is_remote(&self) -> bool {
        false
    }

    /// Execute the tool with the given arguments.
    async fn execute(
        &self,
        arguments: serde_json::Value,
        context: &ToolContext,
    ) -> std::result::Result<ToolOutcome, ToolError>;

    /// Convert this tool into a ToolDefinition for sending to the LLM.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
            remote: self.is_remote(),
        }
    }
}

type Handler = Arc<
    dyn Fn(serde_json::Value, ToolContext) -> BoxFuture<'static, std::result::Result<ToolOutcome, ToolError>>
        + Send
        + Sync,
>;

/// A tool backed by an async closure.
pub struct FunctionTool {
    name: String,
    description: String,
    parameters: serde_json::Value,
    handler: Handler,
}

impl FunctionTool {
    pub fn new<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
        handler: F,
    ) -> Self
    where
        F: Fn(serde_json::Value, ToolContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<ToolOutcome, ToolError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            handler: Arc::new(move |args, ctx| Box::pin(handler(args, ctx))),
        }
    }
}

#[async_trait]
impl Tool for FunctionTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> serde_json::Value {
        self.parameters.clone()
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        context: &ToolContext,
    ) -> std::result::Result<ToolOutcome, ToolError> {
        (self.handler)(arguments, context.clone()).await
    }
}

/// A registry of available tools.
///
/// The agent loop uses this to:
/// 1. Get the definitions of an agent's permitted tools for the LLM
/// 2. Look up and execute tools when the LLM requests them
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. Names must be unique.
    pub fn register(&mut self, tool: Box<dyn Tool>) -> std::result::Result<(), ToolError> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(ToolError::Duplicate(name));
        }
        self.tools.insert(name, tool);
        Ok(())
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Get all tool definitions, sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self.tools.values().map(|t| t.to_definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Definitions for the named tools, in the given order. Names that are
    /// not registered are skipped.
    pub fn definitions_for(&self, names: &[String]) -> Vec<ToolDefinition> {
        names
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|t| t.to_definition())
            .collect()
    }

    /// Execute a tool by name.
    pub async fn execute(
        &self,
        name: &str,
        arguments: serde_json::Value,
        context: &ToolContext,
    ) -> std::result::Result<ToolOutcome, ToolError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;
        if tool.is_remote() {
            return Err(ToolError::Remote(name.to_string()));
        }
        tool.execute(arguments, context).await
    }

    /// List all registered tool names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A simple test tool for unit tests.
    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echoes back the input"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({
                "type": "object",
                "properties": {
                    "text": { "type": "string" }
                },
                "required": ["text"]
            })
        }
        async fn execute(
            &self,
            arguments: serde_json::Value,
            _context: &ToolContext,
        ) -> std::result::Result<ToolOutcome, ToolError> {
            Ok(ToolOutcome::value(arguments["text"].as_str().unwrap_or("")))
        }
    }

    struct HostedSearch;

    #[async_trait]
    impl Tool for HostedSearch {
        fn name(&self) -> &str {
            "web_search"
        }
        fn description(&self) -> &str {
            "Hosted search"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }
        fn is_remote(&self) -> bool {
            true
        }
        async fn execute(
            &self,
            _arguments: serde_json::Value,
            _context: &ToolContext,
        ) -> std::result::Result<ToolOutcome, ToolError> {
            Err(ToolError::Remote(self.name().into()))
        }
    }

    #[test]
    fn registry_register_and_lookup() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool)).unwrap();
        assert!(registry.get("echo").is_some());
        assert!(registry.get("nonexistent").is_none());
    }

    #[test]
    fn registry_rejects_duplicate_names() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool)).unwrap();
        let err = registry.register(Box::new(EchoTool)).unwrap_err();
        assert!(matches!(err, ToolError::Duplicate(_)));
    }

    #[test]
    fn definitions_for_keeps_requested_order() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool)).unwrap();
        registry.register(Box::new(HostedSearch)).unwrap();
        let defs = registry.definitions_for(&[
            "web_search".to_string(),
            "missing".to_string(),
            "echo".to_string(),
        ]);
        assert_eq!(defs.len(), 2);
        assert_eq!(defs[0].name, "web_search");
        assert!(defs[0].remote);
        assert_eq!(defs[1].name, "echo");
    }

    #[tokio::test]
    async fn registry_execute_tool() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool)).unwrap();
        let outcome = registry
            .execute("echo", serde_json::json!({"text": "hello world"}), &ToolContext::default())
            .await
            .unwrap();
        assert!(matches!(outcome, ToolOutcome::Value(v) if v == "hello world"));
    }

    #[tokio::test]
    async fn registry_execute_missing_tool() {
        let registry = ToolRegistry::new();
        let err = registry
            .execute("nonexistent", serde_json::json!({}), &ToolContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::NotFound(_)));
    }

    #[tokio::test]
    async fn remote_tools_are_not_executed_locally() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(HostedSearch)).unwrap();
        let err = registry
            .execute("web_search", serde_json::json!({}), &ToolContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Remote(_)));
    }

    #[tokio::test]
    async fn function_tool_sees_context() {
        let tool = FunctionTool::new(
            "whoami",
            "Report the calling agent",
            serde_json::json!({"type": "object"}),
            |_args, ctx: ToolContext| async move { Ok(ToolOutcome::value(ctx.agent)) },
        );
        let ctx = ToolContext {
            agent: "triage".into(),
            context_variables: ContextVariables::new(),
        };
        let outcome = tool.execute(serde_json::json!({}), &ctx).await.unwrap();
        assert!(matches!(outcome, ToolOutcome::Value(v) if v == "triage"));
    }
}
