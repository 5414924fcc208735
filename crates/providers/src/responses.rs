//! Responses-API adapter (stateful).
//!
//! The vendor keeps the conversation server-side: each response carries an
//! `id` that the next request may pass as `previous_response_id`. That id is
//! surfaced as the continuation token; storing it is the caller's business.
//!
//! With a token, only the turns after the last assistant turn are sent (the
//! new question, or tool outputs). Without one, the whole history is sent.

use async_trait::async_trait;
use m1nd_core::error::ProviderError;
use m1nd_core::message::{ConversationTurn, Role};
use m1nd_core::provider::{NormalizedRequest, NormalizedResponse};
use m1nd_core::tool::ToolInvocation;
use serde::Deserialize;
use tracing::debug;

use crate::http;

pub struct ResponsesProvider {
    name: String,
    base_url: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
    max_output_tokens: u32,
    supports_tools: bool,
    client: reqwest::Client,
}

impl ResponsesProvider {
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
            max_output_tokens: 500,
            supports_tools: true,
            client: reqwest::Client::new(),
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_sampling(mut self, temperature: f32, max_output_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_output_tokens = max_output_tokens;
        self
    }

    pub fn with_tools(mut self, supports_tools: bool) -> Self {
        self.supports_tools = supports_tools;
        self
    }

    /// The turns that must be sent: everything when stateless, otherwise only
    /// what the server has not seen yet.
    fn pending_turns(request: &NormalizedRequest) -> &[ConversationTurn] {
        let turns = request.turns.as_slice();
        if request.continuation_token.is_none() {
            return turns;
        }
        match turns.iter().rposition(|t| t.role == Role::Assistant) {
            Some(idx) => &turns[idx + 1..],
            None => turns,
        }
    }

    fn to_input_items(turns: &[ConversationTurn]) -> Vec<serde_json::Value> {
        let mut items = Vec::with_capacity(turns.len());
        for turn in turns {
            match turn.role {
                // Carried as `instructions`.
                Role::System => {}
                Role::User => items.push(serde_json::json!({
                    "role": "user",
                    "content": turn.content,
                })),
                Role::Assistant if !turn.tool_calls.is_empty() => {
                    for call in &turn.tool_calls {
                        items.push(serde_json::json!({
                            "type": "function_call",
                            "call_id": call.call_id,
                            "name": call.name,
                            "arguments": http::encode_arguments(&call.arguments),
                        }));
                    }
                }
                Role::Assistant => items.push(serde_json::json!({
                    "role": "assistant",
                    "content": turn.content,
                })),
                Role::Tool => items.push(serde_json::json!({
                    "type": "function_call_output",
                    "call_id": turn.tool_call_id.as_deref().unwrap_or_default(),
                    "output": turn.content,
                })),
            }
        }
        items
    }

    fn build_body(&self, request: &NormalizedRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "input": Self::to_input_items(Self::pending_turns(request)),
            "temperature": self.temperature,
            "max_output_tokens": self.max_output_tokens,
        });

        if let Some(system) = request.turns.iter().find(|t| t.is_system()) {
            body["instructions"] = serde_json::json!(system.content);
        }

        if let Some(token) = &request.continuation_token {
            body["previous_response_id"] = serde_json::json!(token);
        }

        if self.supports_tools && !request.tools_offered.is_empty() {
            let tools: Vec<serde_json::Value> = request
                .tools_offered
                .iter()
                .map(|t| {
                    serde_json::json!({
                        "type": "function",
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                    })
                })
                .collect();
            body["tools"] = serde_json::json!(tools);
        }

        body
    }

    fn parse_response(api_response: ApiResponse) -> Result<NormalizedResponse, ProviderError> {
        if let Some(error) = api_response.error {
            return Err(ProviderError::MalformedResponse(format!(
                "response {} failed: {}",
                api_response.id, error.message
            )));
        }

        let mut text = String::new();
        let mut calls = Vec::new();
        for item in api_response.output {
            match item {
                OutputItem::Message { content } => {
                    for part in content {
                        if let ContentPart::OutputText { text: t } = part {
                            text.push_str(&t);
                        }
                    }
                }
                OutputItem::FunctionCall {
                    call_id,
                    name,
                    arguments,
                } => calls.push(ToolInvocation {
                    arguments: http::decode_arguments(&name, &arguments),
                    call_id,
                    name,
                }),
                OutputItem::Other => {}
            }
        }

        let content = (!text.is_empty()).then_some(text);
        let response = if calls.is_empty() {
            NormalizedResponse {
                content,
                ..NormalizedResponse::default()
            }
        } else {
            NormalizedResponse::tool_calls(content, calls)
        };
        Ok(response.with_continuation(Some(api_response.id)))
    }
}

#[async_trait]
impl m1nd_core::Provider for ResponsesProvider {
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
        let url = format!("{}/responses", self.base_url);
        let body = self.build_body(request);

        debug!(
            provider = %self.name,
            model = %self.model,
            resumed = request.continuation_token.is_some(),
            "Sending responses request"
        );

        let mut builder = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(http::send_error)?;
        let response = http::check_status(&self.name, response).await?;

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::MalformedResponse(format!("Failed to parse response: {e}")))?;

        Self::parse_response(api_response)
    }
}

// --- Responses API types (internal) ---

#[derive(Debug, Deserialize)]
struct ApiResponse {
    id: String,
    #[serde(default)]
    output: Vec<OutputItem>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum OutputItem {
    Message {
        #[serde(default)]
        content: Vec<ContentPart>,
    },
    FunctionCall {
        call_id: String,
        name: String,
        #[serde(default)]
        arguments: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    OutputText { text: String },
    #[serde(other)]
    Other,
}
