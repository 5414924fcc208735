//! Error types for the m1nd domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; provider failures are
//! additionally classified into an [`ErrorKind`] so retry and fallback
//! logic can branch on the classification instead of the concrete error.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classification of every failure the orchestration core can observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Timeout,
    RateLimited,
    UpstreamUnavailable,
    MalformedResponse,
    AuthOrRequestError,
    ToolExecutionError,
    ToolIterationLimitExceeded,
    AllProvidersFailed,
}

impl ErrorKind {
    /// Whether the gateway should retry the same provider after this failure.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::Timeout | ErrorKind::RateLimited | ErrorKind::UpstreamUnavailable
        )
    }

    /// Whether the orchestrator may move on to the next provider.
    pub fn is_fallback_eligible(self) -> bool {
        matches!(
            self,
            ErrorKind::Timeout
                | ErrorKind::RateLimited
                | ErrorKind::UpstreamUnavailable
                | ErrorKind::MalformedResponse
                | ErrorKind::AuthOrRequestError
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Timeout => "timeout",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::UpstreamUnavailable => "upstream_unavailable",
            ErrorKind::MalformedResponse => "malformed_response",
            ErrorKind::AuthOrRequestError => "auth_or_request_error",
            ErrorKind::ToolExecutionError => "tool_execution_error",
            ErrorKind::ToolIterationLimitExceeded => "tool_iteration_limit_exceeded",
            ErrorKind::AllProvidersFailed => "all_providers_failed",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

impl ProviderError {
    /// Map this error onto the orchestration taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProviderError::ApiError { status_code, .. } => match *status_code {
                429 => ErrorKind::RateLimited,
                500..=599 => ErrorKind::UpstreamUnavailable,
                _ => ErrorKind::AuthOrRequestError,
            },
            ProviderError::RateLimited { .. } => ErrorKind::RateLimited,
            ProviderError::AuthenticationFailed(_) => ErrorKind::AuthOrRequestError,
            ProviderError::Timeout(_) => ErrorKind::Timeout,
            ProviderError::Network(_) => ErrorKind::UpstreamUnavailable,
            ProviderError::MalformedResponse(_) => ErrorKind::MalformedResponse,
        }
    }
}

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Channel not configured: {0}")]
    NotConfigured(String),

    #[error("Message delivery failed to {channel}: {reason}")]
    DeliveryFailed { channel: String, reason: String },

    #[error("Channel connection lost: {0}")]
    ConnectionLost(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("tool {0} not found")]
    NotFound(String),

    #[error("tool {tool_name} failed: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("tool {tool_name} timed out after {timeout_secs}s")]
    Timeout { tool_name: String, timeout_secs: u64 },

    #[error("invalid tool arguments: {0}")]
    InvalidArguments(String),
}

/// One provider's failure inside a fallback chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderFailure {
    pub provider_id: String,
    pub kind: ErrorKind,
    pub message: String,
}

impl std::fmt::Display for ProviderFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} [{}]: {}", self.provider_id, self.kind, self.message)
    }
}

#[derive(Debug, Clone, Error)]
pub enum OrchestrationError {
    #[error("All providers failed: {}", format_failures(.last_errors))]
    AllProvidersFailed { last_errors: Vec<ProviderFailure> },
}

impl OrchestrationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OrchestrationError::AllProvidersFailed { .. } => ErrorKind::AllProvidersFailed,
        }
    }
}

fn format_failures(failures: &[ProviderFailure]) -> String {
    if failures.is_empty() {
        return "no providers configured".into();
    }
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
