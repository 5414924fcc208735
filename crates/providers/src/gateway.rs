//! Provider gateway: one normalized request to one provider, with a
//! per-provider timeout and exponential-backoff retries for transient failures.
//!
//! The gateway never raises: every outcome is a [`NormalizedResponse`], with
//! `is_error` and a classified [`ErrorKind`] on failure. Continuation tokens
//! are passed through untouched; storing them is the caller's job.

use std::time::Duration;

use m1nd_config::RetryConfig;
use m1nd_core::error::{ErrorKind, ProviderError};
use m1nd_core::provider::{NormalizedRequest, NormalizedResponse};
use tracing::{debug, warn};

use crate::registry::ProviderRegistry;

/// Longest wait honoured from a provider's `retry-after` hint.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(30);

/// Retry budget and backoff schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry; doubles each time
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Delay before retry number `retry` (0-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(retry))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(2, Duration::from_secs(2))
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self::new(config.max_retries, Duration::from_millis(config.base_delay_ms))
    }
}

/// A failed attempt, before the retry decision.
struct AttemptFailure {
    kind: ErrorKind,
    message: String,
    retry_after: Option<Duration>,
}

impl From<ProviderError> for AttemptFailure {
    fn from(err: ProviderError) -> Self {
        let retry_after = match &err {
            ProviderError::RateLimited { retry_after_secs } => {
                Some(Duration::from_secs(*retry_after_secs).min(MAX_RETRY_AFTER))
            }
            _ => None,
        };
        Self {
            kind: err.kind(),
            message: err.to_string(),
            retry_after,
        }
    }
}

pub struct ProviderGateway {
    registry: ProviderRegistry,
    retry: RetryPolicy,
}

impl ProviderGateway {
    pub fn new(registry: ProviderRegistry, retry: RetryPolicy) -> Self {
        Self { registry, retry }
    }

    /// Whether the provider behind `provider_id` accepts tool schemas.
    pub fn supports_tools(&self, provider_id: &str) -> bool {
        self.registry.supports_tools(provider_id)
    }

    /// Send one request, retrying transient failures.
    pub async fn send(&self, request: &NormalizedRequest) -> NormalizedResponse {
        let provider_id = request.provider_id.as_str();
        let Some(entry) = self.registry.get(provider_id) else {
            warn!(provider = %provider_id, "Gateway: provider is not registered");
            return NormalizedResponse::failure(
                ErrorKind::AuthOrRequestError,
                format!("Provider '{provider_id}' is not registered"),
            );
        };

        let total = self.retry.max_retries + 1;
        let mut retry = 0;
        loop {
            debug!(provider = %provider_id, attempt = retry + 1, total, "Gateway: sending request");

            let outcome = match tokio::time::timeout(entry.timeout, entry.provider.complete(request)).await {
                Ok(Ok(response)) => Self::validate(response),
                Ok(Err(e)) => Err(AttemptFailure::from(e)),
                Err(_) => Err(AttemptFailure {
                    kind: ErrorKind::Timeout,
                    message: format!(
                        "Provider '{}' timed out after {}s",
                        provider_id,
                        entry.timeout.as_secs()
                    ),
                    retry_after: None,
                }),
            };

            let failure = match outcome {
                Ok(response) => return response,
                Err(failure) => failure,
            };

            if !failure.kind.is_retryable() || retry >= self.retry.max_retries {
                warn!(
                    provider = %provider_id,
                    kind = %failure.kind,
                    attempts = retry + 1,
                    error = %failure.message,
                    "Gateway: giving up on provider"
                );
                return NormalizedResponse::failure(failure.kind, failure.message);
            }

            let backoff = self.retry.delay_for(retry);
            let delay = failure.retry_after.map_or(backoff, |hint| hint.max(backoff));
            warn!(
                provider = %provider_id,
                kind = %failure.kind,
                attempt = retry + 1,
                delay_ms = delay.as_millis() as u64,
                error = %failure.message,
                "Gateway: transient failure, retrying"
            );
            tokio::time::sleep(delay).await;
            retry += 1;
        }
    }

    /// Reject successes that carry nothing usable.
    fn validate(response: NormalizedResponse) -> Result<NormalizedResponse, AttemptFailure> {
        if response.is_error {
            return Err(AttemptFailure {
                kind: response.error_kind.unwrap_or(ErrorKind::MalformedResponse),
                message: response
                    .error_message
                    .unwrap_or_else(|| "Provider reported an error".into()),
                retry_after: None,
            });
        }
        if !response.has_tool_calls() && response.answer_text().is_none() {
            return Err(AttemptFailure {
                kind: ErrorKind::MalformedResponse,
                message: "Provider returned an empty answer".into(),
                retry_after: None,
            });
        }
        Ok(response)
    }
}
