//! End-to-end tests for the m1nd orchestration pipeline.
//!
//! These wire real stores, gateways and delivery adapters around scripted
//! providers and check what a user would observe.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use m1nd_agent::{ConversationStore, FallbackOrchestrator, ITERATION_LIMIT_ANSWER, ToolLoop};
use m1nd_channels::{DeliveryAdapter, Segmenter};
use m1nd_core::channel::{Channel, ChannelId, ChannelMessage};
use m1nd_core::error::{ChannelError, ErrorKind, OrchestrationError, ProviderError, ToolError};
use m1nd_core::message::Role;
use m1nd_core::provider::{NormalizedRequest, NormalizedResponse, Provider};
use m1nd_core::tool::{Tool, ToolArguments, ToolInvocation, ToolRegistry};
use m1nd_providers::{ProviderGateway, ProviderRegistry, RetryPolicy};
use tokio::sync::mpsc;

// ── Mock Provider ────────────────────────────────────────────────────────

/// Replays scripted outcomes in order; the last one repeats.
struct ScriptedProvider {
    name: String,
    script: Mutex<Vec<Result<NormalizedResponse, ProviderError>>>,
    tools: bool,
    call_count: Mutex<usize>,
    requests: Mutex<Vec<NormalizedRequest>>,
}

impl ScriptedProvider {
    fn new(name: &str, script: Vec<Result<NormalizedResponse, ProviderError>>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            script: Mutex::new(script),
            tools: false,
            call_count: Mutex::new(0),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn text(name: &str, answer: &str) -> Arc<Self> {
        Self::new(name, vec![Ok(NormalizedResponse::answer(answer))])
    }

    fn failing(name: &str, error: ProviderError) -> Arc<Self> {
        Self::new(name, vec![Err(error)])
    }

    fn with_tool_support(name: &str, script: Vec<Result<NormalizedResponse, ProviderError>>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            script: Mutex::new(script),
            tools: true,
            call_count: Mutex::new(0),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        *self.call_count.lock().unwrap()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports_tools(&self) -> bool {
        self.tools
    }

    async fn complete(&self, request: &NormalizedRequest) -> Result<NormalizedResponse, ProviderError> {
        *self.call_count.lock().unwrap() += 1;
        self.requests.lock().unwrap().push(request.clone());
        let mut script = self.script.lock().unwrap();
        if script.len() > 1 {
            script.remove(0)
        } else {
            script[0].clone()
        }
    }
}

// ── Mock Tool ────────────────────────────────────────────────────────────

struct ClockTool {
    call_count: Mutex<usize>,
}

#[async_trait]
impl Tool for ClockTool {
    fn name(&self) -> &str {
        "clock"
    }

    fn description(&self) -> &str {
        "Current time"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _arguments: &ToolArguments) -> Result<String, ToolError> {
        *self.call_count.lock().unwrap() += 1;
        Ok("12:00".into())
    }
}

// ── Mock Channel ─────────────────────────────────────────────────────────

struct RecordingChannel {
    id: ChannelId,
    sent: Mutex<Vec<String>>,
}

impl RecordingChannel {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            id: ChannelId("recording".into()),
            sent: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl Channel for RecordingChannel {
    fn name(&self) -> &str {
        "recording"
    }

    fn id(&self) -> &ChannelId {
        &self.id
    }

    async fn start(&self) -> Result<mpsc::Receiver<Result<ChannelMessage, ChannelError>>, ChannelError> {
        let (_tx, rx) = mpsc::channel(1);
        Ok(rx)
    }

    async fn send(&self, _chat_id: &str, content: &str) -> Result<(), ChannelError> {
        self.sent.lock().unwrap().push(content.to_string());
        Ok(())
    }

    fn is_allowed(&self, _sender_id: &str) -> bool {
        true
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────

fn orchestrator(
    providers: &[Arc<ScriptedProvider>],
    retry: RetryPolicy,
    tools: ToolRegistry,
) -> FallbackOrchestrator {
    let registry = providers
        .iter()
        .fold(ProviderRegistry::new(), |r, p| r.add(p.clone(), Duration::from_secs(30)));
    let store = Arc::new(ConversationStore::new(10).with_system_prompt("Be brief."));
    FallbackOrchestrator::new(store, Arc::new(ProviderGateway::new(registry, retry)), Arc::new(tools))
}

fn no_retry() -> RetryPolicy {
    RetryPolicy::new(0, Duration::from_millis(1))
}

fn priority(ids: &[&str]) -> Vec<String> {
    ids.iter().map(|s| s.to_string()).collect()
}

fn clock_call() -> NormalizedResponse {
    NormalizedResponse::tool_calls(
        None,
        vec![ToolInvocation {
            call_id: "call_1".into(),
            name: "clock".into(),
            arguments: ToolArguments::new(),
        }],
    )
}

// ── Scenarios ────────────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_single_question_is_remembered() {
    let provider = ScriptedProvider::text("a", "Hi there");
    let orchestrator = orchestrator(&[provider.clone()], no_retry(), ToolRegistry::new());

    let answer = orchestrator.answer("u1", "hello", &priority(&["a"])).await.unwrap();
    assert_eq!(answer, "Hi there");

    let history = orchestrator.store().history("u1").await;
    let roles: Vec<Role> = history.iter().map(|t| t.role).collect();
    assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant]);
    assert_eq!(history[1].content, "hello");
    assert_eq!(history[2].content, "Hi there");

    // The provider saw the system prompt and the question.
    let request = provider.requests.lock().unwrap()[0].clone();
    assert_eq!(request.turns.len(), 2);
    assert_eq!(request.turns[0].content, "Be brief.");
}

#[tokio::test]
async fn e2e_long_answer_is_delivered_in_numbered_parts() {
    let long = "word ".repeat(1000);
    let provider = ScriptedProvider::text("a", &long);
    let orchestrator = orchestrator(&[provider], no_retry(), ToolRegistry::new());
    let channel = RecordingChannel::new();
    let delivery = DeliveryAdapter::new(channel.clone(), Segmenter::default()).with_part_delay(Duration::ZERO);

    let answer = orchestrator.answer("u1", "talk a lot", &priority(&["a"])).await.unwrap();
    let parts = delivery.deliver("chat", &answer).await.unwrap();

    assert_eq!(parts, 2);
    let sent = channel.sent.lock().unwrap().clone();
    assert!(sent[0].starts_with("(1/2)\n\n"));
    assert!(sent[1].starts_with("(2/2)\n\n"));
    assert!(sent.iter().all(|part| part.chars().count() <= 4096));

    let rebuilt: String = sent
        .iter()
        .map(|part| part.split_once("\n\n").map(|(_, body)| body).unwrap_or(part))
        .collect();
    assert_eq!(rebuilt, long);
}

#[tokio::test]
async fn e2e_hello_from_empty_store() {
    let answer_text = "x".repeat(5000);
    let provider = ScriptedProvider::text("a", &answer_text);
    let registry = ProviderRegistry::new().add(provider, Duration::from_secs(30));
    let store = Arc::new(ConversationStore::new(10));
    let orchestrator = FallbackOrchestrator::new(
        store.clone(),
        Arc::new(ProviderGateway::new(registry, no_retry())),
        Arc::new(ToolRegistry::new()),
    );

    let answer = orchestrator.answer("u1", "hello", &priority(&["a"])).await.unwrap();

    let history: Vec<(Role, String)> = store
        .history("u1")
        .await
        .into_iter()
        .map(|t| (t.role, t.content))
        .collect();
    assert_eq!(
        history,
        vec![(Role::User, "hello".to_string()), (Role::Assistant, answer_text.clone())]
    );

    let chunks = Segmenter::default().split(&answer).unwrap();
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks.iter().map(|c| c.index).collect::<Vec<_>>(), vec![1, 2]);
    let joined: String = chunks.iter().map(|c| c.body.as_str()).collect();
    assert_eq!(joined, answer_text);
}

#[tokio::test]
async fn e2e_short_answer_has_no_label() {
    let orchestrator = orchestrator(&[ScriptedProvider::text("a", "short")], no_retry(), ToolRegistry::new());
    let channel = RecordingChannel::new();
    let delivery = DeliveryAdapter::new(channel.clone(), Segmenter::default()).with_part_delay(Duration::ZERO);

    let answer = orchestrator.answer("u1", "q", &priority(&["a"])).await.unwrap();
    delivery.deliver("chat", &answer).await.unwrap();

    assert_eq!(channel.sent.lock().unwrap().clone(), vec!["short".to_string()]);
}

#[tokio::test]
async fn e2e_fallback_walks_the_priority_list() {
    let a = ScriptedProvider::failing(
        "a",
        ProviderError::ApiError {
            status_code: 503,
            message: "overloaded".into(),
        },
    );
    let b = ScriptedProvider::failing("b", ProviderError::AuthenticationFailed("bad key".into()));
    let c = ScriptedProvider::text("c", "from c");
    let orchestrator = orchestrator(&[a.clone(), b.clone(), c.clone()], no_retry(), ToolRegistry::new());

    let answer = orchestrator.answer("u1", "hello", &priority(&["a", "b", "c"])).await.unwrap();

    assert_eq!(answer, "from c");
    assert_eq!((a.calls(), b.calls(), c.calls()), (1, 1, 1));
    let assistant_turns = orchestrator
        .store()
        .history("u1")
        .await
        .iter()
        .filter(|t| t.role == Role::Assistant)
        .count();
    assert_eq!(assistant_turns, 1);
}

#[tokio::test]
async fn e2e_all_providers_failing_reports_each_kind() {
    let a = ScriptedProvider::failing("a", ProviderError::Timeout("slow".into()));
    let b = ScriptedProvider::failing("b", ProviderError::MalformedResponse("garbage".into()));
    let orchestrator = orchestrator(&[a, b], no_retry(), ToolRegistry::new());

    let err = orchestrator.answer("u1", "hello", &priority(&["a", "b"])).await.unwrap_err();

    let OrchestrationError::AllProvidersFailed { last_errors } = err;
    let kinds: Vec<(String, ErrorKind)> = last_errors.into_iter().map(|f| (f.provider_id, f.kind)).collect();
    assert_eq!(
        kinds,
        vec![
            ("a".to_string(), ErrorKind::Timeout),
            ("b".to_string(), ErrorKind::MalformedResponse)
        ]
    );

    // The question stays in history; no answer was recorded.
    let history = orchestrator.store().history("u1").await;
    assert_eq!(history.last().map(|t| t.role), Some(Role::User));
}

#[tokio::test(start_paused = true)]
async fn e2e_rate_limit_is_retried_on_the_same_provider() {
    let a = ScriptedProvider::new(
        "a",
        vec![
            Err(ProviderError::RateLimited { retry_after_secs: 3 }),
            Ok(NormalizedResponse::answer("after the wait")),
        ],
    );
    let b = ScriptedProvider::text("b", "from b");
    let orchestrator = orchestrator(
        &[a.clone(), b.clone()],
        RetryPolicy::new(2, Duration::from_millis(100)),
        ToolRegistry::new(),
    );

    let started = tokio::time::Instant::now();
    let answer = orchestrator.answer("u1", "hello", &priority(&["a", "b"])).await.unwrap();

    assert_eq!(answer, "after the wait");
    assert_eq!(a.calls(), 2);
    assert_eq!(b.calls(), 0);
    assert!(started.elapsed() >= Duration::from_secs(3));
}

#[tokio::test]
async fn e2e_tool_round_trip_feeds_results_back() {
    let provider = ScriptedProvider::with_tool_support(
        "a",
        vec![Ok(clock_call()), Ok(NormalizedResponse::answer("It is noon."))],
    );
    let mut tools = ToolRegistry::new();
    tools.register(Box::new(ClockTool {
        call_count: Mutex::new(0),
    }));
    let orchestrator = orchestrator(&[provider.clone()], no_retry(), tools);

    let answer = orchestrator.answer("u1", "what time is it?", &priority(&["a"])).await.unwrap();

    assert_eq!(answer, "It is noon.");
    assert_eq!(provider.calls(), 2);

    let second = provider.requests.lock().unwrap()[1].clone();
    let tool_turn = second.turns.iter().find(|t| t.role == Role::Tool).unwrap();
    assert_eq!(tool_turn.content, "12:00");
    assert!(!second.tools_offered.is_empty());
}

#[tokio::test]
async fn e2e_runaway_tool_loop_ends_with_apology() {
    let provider = ScriptedProvider::with_tool_support("a", vec![Ok(clock_call())]);
    let mut tools = ToolRegistry::new();
    tools.register(Box::new(ClockTool {
        call_count: Mutex::new(0),
    }));
    let orchestrator = orchestrator(&[provider.clone()], no_retry(), tools).with_tool_loop(ToolLoop::new(3));

    let answer = orchestrator.answer("u1", "loop forever", &priority(&["a"])).await.unwrap();

    assert_eq!(answer, ITERATION_LIMIT_ANSWER);
    assert_eq!(provider.calls(), 3);
}
