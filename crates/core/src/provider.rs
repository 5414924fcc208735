//! Provider trait: the abstraction over upstream language-model vendors.
//!
//! An adapter knows how to turn a [`NormalizedRequest`] into one vendor HTTP
//! call and map the vendor's answer back into a [`NormalizedResponse`].
//! Vendor headers, auth schemes and URLs live in the adapter's configuration.
//!
//! Implementations: OpenAI-compatible chat completions (Groq, OpenAI,
//! OpenRouter, Ollama) and the stateful Responses API.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, ProviderError};
use crate::message::ConversationTurn;
use crate::tool::ToolInvocation;

/// A tool definition sent to the model so it knows what it can call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,

    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

/// One vendor-neutral request to one provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedRequest {
    /// Registry id of the provider that should answer
    pub provider_id: String,

    /// Conversation history, system turn first if present
    pub turns: Vec<ConversationTurn>,

    /// Opaque resume handle previously issued by this provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continuation_token: Option<String>,

    /// Tools the model may call
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools_offered: Vec<ToolDefinition>,
}

impl NormalizedRequest {
    pub fn new(provider_id: impl Into<String>, turns: Vec<ConversationTurn>) -> Self {
        Self {
            provider_id: provider_id.into(),
            turns,
            continuation_token: None,
            tools_offered: Vec::new(),
        }
    }

    pub fn with_continuation(mut self, token: Option<String>) -> Self {
        self.continuation_token = token;
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools_offered = tools;
        self
    }
}

/// A vendor-neutral response, or a classified failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NormalizedResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolInvocation>,

    /// New resume handle; the caller decides whether to store it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continuation_token: Option<String>,

    #[serde(default)]
    pub is_error: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,

    /// Human-readable failure detail, for logs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl NormalizedResponse {
    /// A plain text answer.
    pub fn answer(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }

    /// A response that asks for tool executions.
    pub fn tool_calls(content: Option<String>, calls: Vec<ToolInvocation>) -> Self {
        Self {
            content,
            tool_calls: calls,
            ..Self::default()
        }
    }

    /// A classified failure.
    pub fn failure(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            is_error: true,
            error_kind: Some(kind),
            error_message: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn with_continuation(mut self, token: Option<String>) -> Self {
        self.continuation_token = token;
        self
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// The answer text if it is present and not blank.
    pub fn answer_text(&self) -> Option<&str> {
        self.content.as_deref().filter(|c| !c.trim().is_empty())
    }
}

impl From<ProviderError> for NormalizedResponse {
    fn from(err: ProviderError) -> Self {
        Self::failure(err.kind(), err.to_string())
    }
}

/// The core Provider trait.
///
/// Every vendor adapter implements this trait. The gateway calls `complete()`
/// without knowing which vendor is behind it.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this adapter (e.g., "groq", "openai-responses").
    fn name(&self) -> &str;

    /// Whether the model behind this adapter accepts tool schemas.
    fn supports_tools(&self) -> bool {
        true
    }

    /// Send one request and map the vendor answer.
    ///
    /// Success values must have `is_error == false`; failures are reported
    /// through `ProviderError` so the gateway can classify them.
    async fn complete(
        &self,
        request: &NormalizedRequest,
    ) -> std::result::Result<NormalizedResponse, ProviderError>;
}
