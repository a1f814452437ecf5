//! Error classifier: one user-facing message per failure
//!
//! Priority, first match wins:
//! 1. vendor structured message (`error.message` in the body)
//! 2. vendor plain error string (`error` as a string)
//! 3. the failure's own message (transport, normalization, ...)
//! 4. [`FALLBACK_MESSAGE`]

use serde_json::Value;

use crate::error::GatewayError;

pub const FALLBACK_MESSAGE: &str = "Failed to get response";

/// Fixed message for targets missing provider, model or credential
pub const CONFIGURATION_INCOMPLETE_MESSAGE: &str =
    "Configuration incomplete: provider, model and API key are required";

/// Reduce any failure to a single non-empty, human-readable message.
pub fn user_message(err: &GatewayError) -> String {
    if let GatewayError::ConfigurationIncomplete { .. } = err {
        return CONFIGURATION_INCOMPLETE_MESSAGE.to_string();
    }

    let body = match err {
        GatewayError::Vendor { body: Some(body), .. } => Some(body),
        _ => None,
    };

    body.and_then(structured_message)
        .or_else(|| body.and_then(plain_message))
        .map(str::to_string)
        .or_else(|| non_blank(err.to_string()))
        .unwrap_or_else(|| FALLBACK_MESSAGE.to_string())
}

/// `{"error": {"message": "..."}}`, shared by OpenAI, Anthropic and Gemini
fn structured_message(body: &Value) -> Option<&str> {
    body.get("error")?
        .get("message")?
        .as_str()
        .filter(|s| !s.trim().is_empty())
}

/// `{"error": "..."}`
fn plain_message(body: &Value) -> Option<&str> {
    body.get("error")?.as_str().filter(|s| !s.trim().is_empty())
}

fn non_blank(s: String) -> Option<String> {
    if s.trim().is_empty() { None } else { Some(s) }
}
