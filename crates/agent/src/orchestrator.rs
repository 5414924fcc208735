//! Fallback orchestrator: the entry point that turns a question into an
//! answer.
//!
//! Providers are tried in the priority order given by the caller. The first
//! one that produces a usable answer wins; its answer (and continuation
//! token, if any) is committed to the conversation store. Failed attempts
//! never touch the store.

use std::sync::Arc;

use m1nd_core::error::{ErrorKind, OrchestrationError, ProviderFailure};
use m1nd_core::message::ConversationTurn;
use m1nd_core::provider::{NormalizedRequest, NormalizedResponse};
use m1nd_core::tool::ToolRegistry;
use m1nd_providers::ProviderGateway;
use tracing::{debug, info, warn};

use crate::store::ConversationStore;
use crate::tool_loop::ToolLoop;

pub struct FallbackOrchestrator {
    store: Arc<ConversationStore>,
    gateway: Arc<ProviderGateway>,
    tools: Arc<ToolRegistry>,
    tool_loop: ToolLoop,
}

impl FallbackOrchestrator {
    pub fn new(store: Arc<ConversationStore>, gateway: Arc<ProviderGateway>, tools: Arc<ToolRegistry>) -> Self {
        Self {
            store,
            gateway,
            tools,
            tool_loop: ToolLoop::default(),
        }
    }

    pub fn with_tool_loop(mut self, tool_loop: ToolLoop) -> Self {
        self.tool_loop = tool_loop;
        self
    }

    pub fn store(&self) -> &Arc<ConversationStore> {
        &self.store
    }

    pub fn gateway(&self) -> &ProviderGateway {
        &self.gateway
    }

    /// Answer `question` for `user_id`, trying `priority` in order.
    pub async fn answer(
        &self,
        user_id: &str,
        question: &str,
        priority: &[String],
    ) -> Result<String, OrchestrationError> {
        let _turn = self.store.begin_turn(user_id).await;

        let generation = self.store.append(user_id, ConversationTurn::user(question)).await;

        info!(user_id = %user_id, providers = priority.len(), "Processing question");

        let mut failures = Vec::new();
        for provider_id in priority {
            let response = self.attempt(user_id, provider_id).await;

            match Self::accept(&response) {
                Ok(answer) => {
                    let answer = answer.to_string();
                    let token = response.continuation_token.map(|t| (provider_id.as_str(), t));
                    let committed = self
                        .store
                        .commit(user_id, generation, ConversationTurn::assistant(&answer), token)
                        .await;
                    if !committed {
                        debug!(user_id = %user_id, "Conversation was cleared while answering");
                    }
                    info!(
                        user_id = %user_id,
                        provider = %provider_id,
                        failed_before = failures.len(),
                        "Question answered"
                    );
                    return Ok(answer);
                }
                Err(failure) => {
                    warn!(
                        user_id = %user_id,
                        provider = %provider_id,
                        kind = %failure.kind,
                        error = %failure.message,
                        "Provider failed, falling back"
                    );
                    let eligible = failure.kind.is_fallback_eligible();
                    failures.push(ProviderFailure {
                        provider_id: provider_id.clone(),
                        ..failure
                    });
                    if !eligible {
                        break;
                    }
                }
            }
        }

        Err(OrchestrationError::AllProvidersFailed {
            last_errors: failures,
        })
    }

    async fn attempt(&self, user_id: &str, provider_id: &str) -> NormalizedResponse {
        let history = self.store.history(user_id).await;
        let token = self.store.continuation_token(user_id, provider_id).await;
        let request = NormalizedRequest::new(provider_id, history).with_continuation(token);

        if self.gateway.supports_tools(provider_id) && !self.tools.is_empty() {
            let request = request.with_tools(self.tools.list_tools());
            self.tool_loop.resolve(request, &self.gateway, &self.tools).await
        } else {
            self.gateway.send(&request).await
        }
    }

    /// The answer text of a usable response, or why it is unusable.
    fn accept(response: &NormalizedResponse) -> Result<&str, ProviderFailure> {
        if response.is_error {
            return Err(ProviderFailure {
                provider_id: String::new(),
                kind: response.error_kind.unwrap_or(ErrorKind::MalformedResponse),
                message: response.error_message.clone().unwrap_or_default(),
            });
        }
        response.answer_text().ok_or_else(|| ProviderFailure {
            provider_id: String::new(),
            kind: ErrorKind::MalformedResponse,
            message: "response carried no answer text".into(),
        })
    }
}
