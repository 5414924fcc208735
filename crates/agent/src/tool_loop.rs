//! Tool loop: lets the model call tools until it produces an answer.
//!
//! Each round sends the working history to the gateway. If the response asks
//! for tools, they are executed, their results appended, and the request is
//! rebuilt. The number of gateway calls is capped.

use futures::future::join_all;
use m1nd_core::error::ErrorKind;
use m1nd_core::message::ConversationTurn;
use m1nd_core::provider::{NormalizedRequest, NormalizedResponse};
use m1nd_core::tool::{ToolInvocation, ToolRegistry, ToolResult};
use m1nd_providers::ProviderGateway;
use tracing::{debug, warn};

/// Default cap on gateway calls per question.
pub const DEFAULT_MAX_ITERATIONS: usize = 5;

/// Returned when the model keeps asking for tools.
pub const ITERATION_LIMIT_ANSWER: &str =
    "I've reached the maximum number of tool call iterations. Please try rephrasing your question.";

#[derive(Debug, Clone, Copy)]
pub struct ToolLoop {
    max_iterations: usize,
}

impl ToolLoop {
    pub fn new(max_iterations: usize) -> Self {
        Self {
            max_iterations: max_iterations.max(1),
        }
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    /// Run the request to completion.
    ///
    /// A gateway failure is returned as is. Hitting the cap yields a
    /// non-error response carrying the apology text and
    /// [`ErrorKind::ToolIterationLimitExceeded`].
    pub async fn resolve(
        &self,
        request: NormalizedRequest,
        gateway: &ProviderGateway,
        tools: &ToolRegistry,
    ) -> NormalizedResponse {
        let mut request = request;
        let mut iterations = 0;

        loop {
            iterations += 1;
            debug!(provider = %request.provider_id, iteration = iterations, "Tool loop iteration");

            let response = gateway.send(&request).await;
            if response.is_error || !response.has_tool_calls() {
                return response;
            }

            if iterations >= self.max_iterations {
                warn!(
                    provider = %request.provider_id,
                    max_iterations = self.max_iterations,
                    "Tool loop hit the iteration cap"
                );
                return NormalizedResponse {
                    content: Some(ITERATION_LIMIT_ANSWER.to_string()),
                    error_kind: Some(ErrorKind::ToolIterationLimitExceeded),
                    ..NormalizedResponse::default()
                }
                .with_continuation(response.continuation_token);
            }

            let results = execute_all(&response.tool_calls, tools).await;

            request.turns.push(ConversationTurn::tool_request(
                response.content.clone().unwrap_or_default(),
                response.tool_calls,
            ));
            request
                .turns
                .extend(results.into_iter().map(ConversationTurn::tool));

            if response.continuation_token.is_some() {
                request.continuation_token = response.continuation_token;
            }
        }
    }
}

impl Default for ToolLoop {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ITERATIONS)
    }
}

/// Run one round's invocations concurrently; results keep the call order.
async fn execute_all(calls: &[ToolInvocation], tools: &ToolRegistry) -> Vec<ToolResult> {
    join_all(calls.iter().map(|call| async move {
        debug!(tool = %call.name, call_id = %call.call_id, "Executing tool");
        let content = match tools.execute(&call.name, &call.arguments).await {
            Ok(output) => output,
            Err(e) => {
                warn!(tool = %call.name, error = %e, "Tool execution failed");
                format!("error: {e}")
            }
        };
        ToolResult {
            call_id: call.call_id.clone(),
            name: call.name.clone(),
            content,
        }
    }))
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use m1nd_core::error::{ProviderError, ToolError};
    use m1nd_core::message::Role;
    use m1nd_core::provider::Provider;
    use m1nd_core::tool::{Tool, ToolArguments};
    use m1nd_providers::{ProviderRegistry, RetryPolicy};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Always asks for the echo tool.
    struct LoopingProvider {
        call_count: Mutex<usize>,
    }

    #[async_trait]
    impl Provider for LoopingProvider {
        fn name(&self) -> &str {
            "looping"
        }

        async fn complete(&self, _request: &NormalizedRequest) -> Result<NormalizedResponse, ProviderError> {
            let mut count = self.call_count.lock().unwrap();
            *count += 1;
            Ok(NormalizedResponse::tool_calls(
                None,
                vec![ToolInvocation {
                    call_id: format!("call_{count}"),
                    name: "echo".into(),
                    arguments: ToolArguments::new(),
                }],
            ))
        }
    }

    /// Asks for two tools once, then answers with what it saw.
    struct TwoToolsProvider {
        requests: Mutex<Vec<NormalizedRequest>>,
    }

    #[async_trait]
    impl Provider for TwoToolsProvider {
        fn name(&self) -> &str {
            "two-tools"
        }

        async fn complete(&self, request: &NormalizedRequest) -> Result<NormalizedResponse, ProviderError> {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request.clone());
            if requests.len() == 1 {
                let mut args = ToolArguments::new();
                args.insert("text".into(), serde_json::json!("ping"));
                return Ok(NormalizedResponse::tool_calls(
                    None,
                    vec![
                        ToolInvocation {
                            call_id: "c1".into(),
                            name: "echo".into(),
                            arguments: args,
                        },
                        ToolInvocation {
                            call_id: "c2".into(),
                            name: "missing".into(),
                            arguments: ToolArguments::new(),
                        },
                    ],
                )
                .with_continuation(Some("resp_1".into())));
            }
            let tool_turns: Vec<String> = request
                .turns
                .iter()
                .filter(|t| t.role == Role::Tool)
                .map(|t| t.content.clone())
                .collect();
            Ok(NormalizedResponse::answer(tool_turns.join(" | ")))
        }
    }

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Echo the text argument"
        }

        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object", "properties": {"text": {"type": "string"}}})
        }

        async fn execute(&self, arguments: &ToolArguments) -> Result<String, ToolError> {
            Ok(arguments
                .get("text")
                .and_then(|v| v.as_str())
                .unwrap_or("nothing")
                .to_string())
        }
    }

    fn gateway(provider: Arc<dyn Provider>) -> ProviderGateway {
        ProviderGateway::new(
            ProviderRegistry::new().add(provider, Duration::from_secs(30)),
            RetryPolicy::new(0, Duration::from_millis(10)),
        )
    }

    fn echo_registry() -> ToolRegistry {
        let mut tools = ToolRegistry::new();
        tools.register(Box::new(EchoTool));
        tools
    }

    #[tokio::test]
    async fn stops_after_max_iterations() {
        let provider = Arc::new(LoopingProvider {
            call_count: Mutex::new(0),
        });
        let gateway = gateway(provider.clone());
        let request = NormalizedRequest::new("looping", vec![ConversationTurn::user("loop forever")]);

        let response = ToolLoop::new(5).resolve(request, &gateway, &echo_registry()).await;

        assert_eq!(*provider.call_count.lock().unwrap(), 5);
        assert!(!response.is_error);
        assert_eq!(response.content.as_deref(), Some(ITERATION_LIMIT_ANSWER));
        assert_eq!(response.error_kind, Some(ErrorKind::ToolIterationLimitExceeded));
    }

    #[tokio::test]
    async fn feeds_results_back_in_order() {
        let provider = Arc::new(TwoToolsProvider {
            requests: Mutex::new(Vec::new()),
        });
        let gateway = gateway(provider.clone());
        let request = NormalizedRequest::new("two-tools", vec![ConversationTurn::user("go")]);

        let response = ToolLoop::default().resolve(request, &gateway, &echo_registry()).await;

        assert_eq!(response.answer_text(), Some("ping | error: tool missing not found"));

        let requests = provider.requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        let second = &requests[1];
        assert_eq!(second.continuation_token.as_deref(), Some("resp_1"));

        let roles: Vec<Role> = second.turns.iter().map(|t| t.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant, Role::Tool, Role::Tool]);
        assert_eq!(second.turns[1].tool_calls.len(), 2);
        assert_eq!(second.turns[2].tool_call_id.as_deref(), Some("c1"));
        assert_eq!(second.turns[3].tool_call_id.as_deref(), Some("c2"));
    }

    #[tokio::test]
    async fn plain_answer_needs_one_call() {
        struct Plain;

        #[async_trait]
        impl Provider for Plain {
            fn name(&self) -> &str {
                "plain"
            }

            async fn complete(&self, _request: &NormalizedRequest) -> Result<NormalizedResponse, ProviderError> {
                Ok(NormalizedResponse::answer("42"))
            }
        }

        let gateway = gateway(Arc::new(Plain));
        let request = NormalizedRequest::new("plain", vec![ConversationTurn::user("answer?")]);
        let response = ToolLoop::default().resolve(request, &gateway, &ToolRegistry::new()).await;
        assert_eq!(response.answer_text(), Some("42"));
    }

    #[tokio::test]
    async fn gateway_failure_ends_loop() {
        let gateway = ProviderGateway::new(ProviderRegistry::new(), RetryPolicy::default());
        let request = NormalizedRequest::new("ghost", vec![ConversationTurn::user("hi")]);
        let response = ToolLoop::default().resolve(request, &gateway, &echo_registry()).await;
        assert!(response.is_error);
        assert_eq!(response.error_kind, Some(ErrorKind::AuthOrRequestError));
    }
}
