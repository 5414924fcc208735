//! OpenAI-compatible chat-completions adapter.
//!
//! Works with: Groq, OpenAI, OpenRouter, Ollama and any endpoint exposing
//! `/chat/completions`. These vendors are stateless: the full history is sent
//! on every call and no continuation token is ever returned.

use async_trait::async_trait;
use m1nd_core::error::ProviderError;
use m1nd_core::message::{ConversationTurn, Role};
use m1nd_core::provider::{NormalizedRequest, NormalizedResponse, ToolDefinition};
use m1nd_core::tool::ToolInvocation;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::http;

/// An OpenAI-compatible chat-completions provider.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
    max_tokens: u32,
    supports_tools: bool,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Create a new OpenAI-compatible provider.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
            model: model.into(),
            temperature: 0.7,
            max_tokens: 500,
            supports_tools: true,
            client: reqwest::Client::new(),
        }
    }

    /// Create a Groq provider (convenience constructor).
    pub fn groq(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self::new("groq", "https://api.groq.com/openai/v1", model).with_api_key(api_key)
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_sampling(mut self, temperature: f32, max_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_tools(mut self, supports_tools: bool) -> Self {
        self.supports_tools = supports_tools;
        self
    }

    /// Convert conversation turns to the chat-completions message format.
    fn to_api_messages(turns: &[ConversationTurn]) -> Vec<ApiMessage> {
        turns
            .iter()
            .map(|t| {
                let tool_calls = (!t.tool_calls.is_empty()).then(|| {
                    t.tool_calls
                        .iter()
                        .map(|tc| ApiToolCall {
                            id: tc.call_id.clone(),
                            r#type: "function".into(),
                            function: ApiFunction {
                                name: tc.name.clone(),
                                arguments: http::encode_arguments(&tc.arguments),
                            },
                        })
                        .collect()
                });
                let content = if t.role == Role::Assistant && tool_calls.is_some() && t.content.is_empty() {
                    None
                } else {
                    Some(t.content.clone())
                };
                ApiMessage {
                    role: t.role.as_str().into(),
                    content,
                    tool_calls,
                    tool_call_id: t.tool_call_id.clone(),
                }
            })
            .collect()
    }

    /// Convert tool definitions to the chat-completions format.
    fn to_api_tools(tools: &[ToolDefinition]) -> Vec<ApiToolDefinition> {
        tools
            .iter()
            .map(|t| ApiToolDefinition {
                r#type: "function".into(),
                function: ApiToolFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters.clone(),
                },
            })
            .collect()
    }

    fn build_body(&self, request: &NormalizedRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": Self::to_api_messages(&request.turns),
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
            "stream": false,
        });

        if self.supports_tools && !request.tools_offered.is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(&request.tools_offered));
        }

        body
    }

    /// Map a decoded completion into the normalized shape.
    fn parse_completion(api_response: ApiResponse) -> Result<NormalizedResponse, ProviderError> {
        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::MalformedResponse("No choices in response".into()))?;

        let tool_calls: Vec<ToolInvocation> = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| ToolInvocation {
                arguments: http::decode_arguments(&tc.function.name, &tc.function.arguments),
                call_id: tc.id,
                name: tc.function.name,
            })
            .collect();

        if tool_calls.is_empty() {
            Ok(NormalizedResponse {
                content: choice.message.content,
                ..NormalizedResponse::default()
            })
        } else {
            Ok(NormalizedResponse::tool_calls(
                choice.message.content.filter(|c| !c.is_empty()),
                tool_calls,
            ))
        }
    }
}

#[async_trait]
impl m1nd_core::Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports_tools(&self) -> bool {
        self.supports_tools
    }

    async fn complete(
        &self,
        request: &NormalizedRequest,
    ) -> std::result::Result<NormalizedResponse, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.build_body(request);

        debug!(
            provider = %self.name,
            model = %self.model,
            turns = request.turns.len(),
            tools = request.tools_offered.len(),
            "Sending completion request"
        );

        let mut builder = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(http::send_error)?;
        let response = http::check_status(&self.name, response).await?;

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::MalformedResponse(format!("Failed to parse response: {e}")))?;

        Self::parse_completion(api_response)
    }
}

// --- Chat-completions API types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    id: String,
    r#type: String,
    function: ApiFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolDefinition {
    r#type: String,
    function: ApiToolFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}
