//! HTTP plumbing shared by the vendor adapters: status mapping and
//! argument decoding.

use m1nd_core::error::ProviderError;
use m1nd_core::tool::ToolArguments;
use tracing::warn;

/// Retry hint used when a 429 carries no usable `retry-after` header.
const DEFAULT_RETRY_AFTER_SECS: u64 = 5;

/// Map a transport-level reqwest failure.
pub(crate) fn send_error(err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout(err.to_string())
    } else {
        ProviderError::Network(err.to_string())
    }
}

/// Turn a non-success status into the matching `ProviderError`.
pub(crate) async fn check_status(
    provider: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, ProviderError> {
    let status = response.status().as_u16();

    if status == 429 {
        let retry_after_secs = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
        return Err(ProviderError::RateLimited { retry_after_secs });
    }

    if status == 401 || status == 403 {
        return Err(ProviderError::AuthenticationFailed(
            "Invalid API key or insufficient permissions".into(),
        ));
    }

    if !response.status().is_success() {
        let error_body = response.text().await.unwrap_or_default();
        warn!(provider = %provider, status, body = %error_body, "Provider returned error");
        return Err(ProviderError::ApiError {
            status_code: status,
            message: error_body,
        });
    }

    Ok(response)
}

/// Decode a vendor's JSON-string arguments into a map.
///
/// Undecodable or non-object arguments become an empty map; the tool then
/// reports the missing parameters back to the model.
pub(crate) fn decode_arguments(tool: &str, raw: &str) -> ToolArguments {
    if raw.trim().is_empty() {
        return ToolArguments::new();
    }
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(serde_json::Value::Object(map)) => map,
        Ok(other) => {
            warn!(tool = %tool, arguments = %other, "Tool arguments are not a JSON object");
            ToolArguments::new()
        }
        Err(e) => {
            warn!(tool = %tool, error = %e, "Failed to decode tool arguments");
            ToolArguments::new()
        }
    }
}

/// Encode an argument map back into the vendor's JSON-string form.
pub(crate) fn encode_arguments(arguments: &ToolArguments) -> String {
    serde_json::Value::Object(arguments.clone()).to_string()
}
