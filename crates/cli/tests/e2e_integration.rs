//! End-to-end integration tests for the AgentRelay runtime.
//!
//! These tests exercise the full pipeline from configuration to final
//! answer: swarm initialization, sessions, tool dispatch, handoffs and
//! batch runs, against a scripted gateway.

use std::sync::Arc;

use agentrelay_agent::{
    AgentStreamEvent, BatchOptions, BatchRequest, RunOptions, SessionStatus, Swarm,
};
use agentrelay_config::{AgentConfig, AppConfig};
use agentrelay_core::agent::ToolChoice;
use agentrelay_core::error::{ErrorKind, ProviderError};
use agentrelay_core::event::DomainEvent;
use agentrelay_core::gateway::{CompletionGateway, CompletionRequest, CompletionResponse, Usage};
use agentrelay_core::message::{Message, MessageToolCall, Role, verify_tool_pairing};
use agentrelay_core::tool::{FunctionTool, ToolOutcome};
use agentrelay_tools::default_registry;
use futures::StreamExt;

// ── Mock Gateway ─────────────────────────────────────────────────────────

/// A mock gateway that returns scripted responses in sequence.
struct ScriptedGateway {
    responses: std::sync::Mutex<Vec<CompletionResponse>>,
    requests: std::sync::Mutex<Vec<CompletionRequest>>,
}

impl ScriptedGateway {
    fn new(responses: Vec<CompletionResponse>) -> Self {
        Self {
            responses: std::sync::Mutex::new(responses),
            requests: std::sync::Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn request(&self, index: usize) -> CompletionRequest {
        self.requests.lock().unwrap()[index].clone()
    }
}

#[async_trait::async_trait]
impl CompletionGateway for ScriptedGateway {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, ProviderError> {
        let mut requests = self.requests.lock().unwrap();
        let count = requests.len();
        requests.push(request);
        let responses = self.responses.lock().unwrap();
        if count >= responses.len() {
            panic!(
                "ScriptedGateway exhausted: call #{count}, have {}",
                responses.len()
            );
        }
        Ok(responses[count].clone())
    }
}

fn usage() -> Option<Usage> {
    Some(Usage {
        prompt_tokens: 10,
        completion_tokens: 5,
        total_tokens: 15,
    })
}

fn text_response(text: &str) -> CompletionResponse {
    CompletionResponse {
        message: Message::assistant(text),
        usage: usage(),
        model: "mock".into(),
        metadata: serde_json::Map::new(),
    }
}

fn tool_response(tool_calls: Vec<MessageToolCall>) -> CompletionResponse {
    CompletionResponse {
        message: Message::assistant_with_tool_calls("", tool_calls),
        usage: usage(),
        model: "mock".into(),
        metadata: serde_json::Map::new(),
    }
}

fn make_tool_call(id: &str, name: &str, args: serde_json::Value) -> MessageToolCall {
    MessageToolCall {
        id: id.to_string(),
        name: name.to_string(),
        arguments: serde_json::to_string(&args).unwrap(),
    }
}

fn agent(name: &str, system_message: &str, tools: &[&str]) -> AgentConfig {
    AgentConfig {
        name: name.into(),
        description: String::new(),
        system_message: system_message.into(),
        allowed_tools: tools.iter().map(|t| t.to_string()).collect(),
        model: None,
        tool_choice: ToolChoice::Auto,
        successor: None,
    }
}

fn config_with(agents: Vec<AgentConfig>) -> AppConfig {
    AppConfig {
        agents,
        ..AppConfig::default()
    }
}

fn swarm(config: &AppConfig, gateway: Arc<ScriptedGateway>) -> Swarm {
    Swarm::init(config, gateway, default_registry()).unwrap()
}

// ── E2E: Echo session ────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_echo_tool_two_turns() {
    // Scenario: agent A may call echo; the model calls echo("hi") and then
    // answers with its result.
    let mut tools = default_registry();
    tools
        .register(Box::new(FunctionTool::new(
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
        )))
        .unwrap();

    let gateway = Arc::new(ScriptedGateway::new(vec![
        tool_response(vec![make_tool_call(
            "c1",
            "echo",
            serde_json::json!({"text": "hi"}),
        )]),
        text_response("hi"),
    ]));
    let config = config_with(vec![agent("A", "You echo.", &["echo"])]);
    let swarm = Swarm::init(&config, gateway.clone(), tools).unwrap();

    let session = swarm.create_session(None).await.unwrap();
    let output = swarm
        .run_session(&session.id, "say hi", RunOptions::default())
        .await
        .unwrap();

    assert_eq!(output, "hi");
    assert_eq!(gateway.calls(), 2);

    let status = swarm.get_status(&session.id).await.unwrap();
    assert_eq!(status.turns, 2);
    assert_eq!(status.node_results[0], ("$1".to_string(), "hi".to_string()));

    // Second request carries the tool call paired with its result.
    let second = gateway.request(1);
    let history: Vec<Message> = second
        .messages
        .iter()
        .filter(|m| m.role != Role::System)
        .cloned()
        .collect();
    assert!(verify_tool_pairing(&history).is_ok());
    assert_eq!(history.last().unwrap().content, "hi");
}

// ── E2E: Unknown tool is recovered ───────────────────────────────────────

#[tokio::test]
async fn e2e_unknown_tool_recovers() {
    let gateway = Arc::new(ScriptedGateway::new(vec![
        tool_response(vec![make_tool_call("c1", "doStuff", serde_json::json!({}))]),
        text_response("I could not do that."),
    ]));
    let config = config_with(vec![agent("A", "You help.", &[])]);
    let swarm = swarm(&config, gateway.clone());

    let session = swarm.create_session(None).await.unwrap();
    let output = swarm
        .run_session(&session.id, "do stuff", RunOptions::default())
        .await
        .unwrap();

    assert_eq!(output, "I could not do that.");
    let tool_message = gateway
        .request(1)
        .messages
        .into_iter()
        .find(|m| m.role == Role::Tool)
        .unwrap();
    assert_eq!(tool_message.content, "Error: Tool doStuff not found.");
}

// ── E2E: Triage handoff with default agents ──────────────────────────────

#[tokio::test]
async fn e2e_triage_switches_to_math_and_calculates() {
    let gateway = Arc::new(ScriptedGateway::new(vec![
        tool_response(vec![make_tool_call(
            "c1",
            "switch_agent",
            serde_json::json!({"agent_name": "math", "step": "$1"}),
        )]),
        tool_response(vec![make_tool_call(
            "c2",
            "calculator",
            serde_json::json!({"expression": "12 * 7"}),
        )]),
        text_response("12 * 7 = 84"),
    ]));
    let config = AppConfig::default();
    let swarm = swarm(&config, gateway.clone());
    let mut events = swarm.event_bus().subscribe();

    let session = swarm.create_session(None).await.unwrap();
    assert_eq!(session.agent, "triage");

    let output = swarm
        .run_session(&session.id, "What is 12 * 7?", RunOptions::default())
        .await
        .unwrap();
    assert_eq!(output, "12 * 7 = 84");

    // The math agent's request carries its own prompt and tool schema.
    let second = gateway.request(1);
    assert!(second.system_prompt().unwrap().contains("arithmetic"));
    assert_eq!(second.tool_names(), vec!["calculator"]);
    assert!(
        second
            .messages
            .iter()
            .any(|m| m.role == Role::User && m.content.contains("handed this conversation"))
    );

    let status = swarm.get_status(&session.id).await.unwrap();
    assert_eq!(status.agent, "math");
    assert_eq!(status.node_results.len(), 2);
    assert_eq!(status.node_results[1].1, "84");

    let mut saw_handoff = false;
    while let Ok(event) = events.try_recv() {
        if let DomainEvent::AgentHandoff { from, to, manual, .. } = event.as_ref() {
            assert_eq!((from.as_str(), to.as_str(), *manual), ("triage", "math", false));
            saw_handoff = true;
        }
    }
    assert!(saw_handoff);
}

// ── E2E: Authorization ───────────────────────────────────────────────────

#[tokio::test]
async fn e2e_unauthorized_tool_fails_the_run() {
    let gateway = Arc::new(ScriptedGateway::new(vec![tool_response(vec![
        make_tool_call("c1", "calculator", serde_json::json!({"expression": "1+1"})),
    ])]));
    let swarm = swarm(&AppConfig::default(), gateway.clone());

    let session = swarm.create_session(Some("triage")).await.unwrap();
    let err = swarm
        .run_session(&session.id, "add", RunOptions::default())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Tool);
    assert_eq!(gateway.calls(), 1);

    let status = swarm.get_status(&session.id).await.unwrap();
    assert_eq!(status.status, SessionStatus::Failed);
    assert_eq!(status.messages, 0);

    swarm.end_session(&session.id).await.unwrap();
}

// ── E2E: Successor transfer from config ──────────────────────────────────

#[tokio::test]
async fn e2e_successor_takes_over_after_text_reply() {
    let mut greeter = agent("greeter", "Greet the user.", &[]);
    greeter.successor = Some("closer".into());
    let config = config_with(vec![greeter, agent("closer", "Wrap up.", &[])]);

    let gateway = Arc::new(ScriptedGateway::new(vec![
        text_response("Hello!"),
        text_response("Goodbye!"),
    ]));
    let swarm = swarm(&config, gateway.clone());

    let session = swarm.create_session(None).await.unwrap();
    let output = swarm
        .run_session(&session.id, "hi", RunOptions::default())
        .await
        .unwrap();

    assert_eq!(output, "Goodbye!");
    assert_eq!(gateway.request(1).system_prompt(), Some("Wrap up."));
    assert_eq!(swarm.get_status(&session.id).await.unwrap().agent, "closer");
}

// ── E2E: Turn budget from config ─────────────────────────────────────────

#[tokio::test]
async fn e2e_max_turns_from_config() {
    let call = || {
        tool_response(vec![make_tool_call(
            "c",
            "calculator",
            serde_json::json!({"expression": "1+1"}),
        )])
    };
    let mut config = config_with(vec![agent("math", "Loop forever.", &["calculator"])]);
    config.runtime.max_turns = Some(3);

    let gateway = Arc::new(ScriptedGateway::new(vec![call(), call(), call(), call()]));
    let swarm = swarm(&config, gateway.clone());
    let session = swarm.create_session(None).await.unwrap();

    let err = swarm
        .run_session(&session.id, "go", RunOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Execution);
    assert_eq!(gateway.calls(), 3);
}

// ── E2E: Streaming ───────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_streaming_matches_blocking_run() {
    let script = || {
        vec![
            tool_response(vec![make_tool_call(
                "c1",
                "weather_lookup",
                serde_json::json!({"location": "Oslo"}),
            )]),
            text_response("It is mild in Oslo."),
        ]
    };
    let config = config_with(vec![agent("weather", "Report weather.", &["weather_lookup"])]);

    let blocking = swarm(&config, Arc::new(ScriptedGateway::new(script())));
    let session = blocking.create_session(None).await.unwrap();
    let expected = blocking
        .run_session(&session.id, "Weather in Oslo?", RunOptions::default())
        .await
        .unwrap();
    let expected_status = blocking.get_status(&session.id).await.unwrap();

    let streaming = swarm(&config, Arc::new(ScriptedGateway::new(script())));
    let session = streaming.create_session(None).await.unwrap();
    let events: Vec<AgentStreamEvent> = streaming
        .run_session_stream(&session.id, "Weather in Oslo?", RunOptions::default())
        .await
        .unwrap()
        .map(|e| e.unwrap())
        .collect()
        .await;

    let streamed_text: String = events.iter().filter_map(|e| e.text()).collect();
    assert!(streamed_text.ends_with(&expected));

    let Some(AgentStreamEvent::Done(outcome)) = events.last() else {
        panic!("stream did not end with Done");
    };
    assert_eq!(outcome.final_text(), Some(expected.as_str()));

    let status = streaming.get_status(&session.id).await.unwrap();
    assert_eq!(status.node_results, expected_status.node_results);
    assert_eq!(
        status.context_variables["last_location"],
        serde_json::json!("Oslo")
    );
}

// ── E2E: Batch ───────────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_batch_runs_each_request_in_its_own_session() {
    let gateway = Arc::new(ScriptedGateway::new(vec![
        text_response("first"),
        text_response("second"),
    ]));
    let config = config_with(vec![agent("A", "Answer briefly.", &[])]);
    let swarm = swarm(&config, gateway.clone());

    let requests: Vec<BatchRequest> = serde_json::from_value(serde_json::json!([
        {"id": "one", "goal": "first question"},
        {"id": "two", "goal": "second question", "agent": "ghost"},
        {"id": "three", "goal": "third question"},
    ]))
    .unwrap();

    let results = swarm
        .run_batch(
            requests,
            Some(BatchOptions {
                concurrency: 1,
                batch_size: 10,
            }),
        )
        .await;

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].result.as_deref(), Some("first"));
    assert_eq!(results[1].error.as_ref().unwrap().kind, ErrorKind::Agent);
    assert_eq!(results[2].result.as_deref(), Some("second"));

    // Each session starts from an empty history.
    let third = gateway.request(1);
    assert_eq!(third.messages.len(), 2);

    let json = serde_json::to_value(&results).unwrap();
    assert_eq!(json[1]["error"]["kind"], "AGENT_ERROR");
    assert!(json[0].get("error").is_none());
    assert!(swarm.session_ids().await.is_empty());
}

// ── E2E: Script plans ────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_script_is_visible_to_the_model() {
    let gateway = Arc::new(ScriptedGateway::new(vec![text_response("done")]));
    let swarm = swarm(&AppConfig::default(), gateway.clone());
    let session = swarm.create_session(Some("math")).await.unwrap();

    swarm
        .run_session(
            &session.id,
            "Compute the total",
            RunOptions {
                script: Some("$1 = calculator(expression=\"2+3\")\n$2 = calculator(expression=\"$1*4\")".into()),
            },
        )
        .await
        .unwrap();

    let goal = &gateway.request(0).messages[1];
    assert_eq!(goal.role, Role::User);
    assert!(goal.content.starts_with("Compute the total"));
    assert!(goal.content.contains("$2 = calculator"));
}
