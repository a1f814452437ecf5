//! Error types shared across the fan-out pipeline

use serde_json::Value;

use crate::catalog::Provider;

/// Every failure the gateway can produce.
///
/// The first four variants are the per-target failure kinds: they are always
/// contained in that target's result and never abort a round. The remaining
/// variants are boundary errors raised before a round starts.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Target is missing its provider, model or credential. Never reaches the network.
    #[error("configuration incomplete: missing {}", .missing.join(", "))]
    ConfigurationIncomplete { missing: Vec<&'static str> },

    /// The network call could not complete (DNS, connect, timeout, body read).
    #[error("{message}")]
    Transport { message: String },

    /// The call completed but the vendor reported a failure.
    #[error("{provider} request failed with status {status}")]
    Vendor {
        provider: Provider,
        status: u16,
        /// Parsed response body, when it was JSON
        body: Option<Value>,
    },

    /// The call succeeded but no text could be extracted from the payload.
    #[error("no text found in {provider} response")]
    Normalization { provider: Provider },

    #[error("prompt must not be empty")]
    EmptyPrompt,

    #[error("at most {max} targets can be configured")]
    CapacityExceeded { max: usize },

    #[error("model '{model}' is not available for {provider}")]
    UnknownModel { provider: Provider, model: String },

    #[error("unknown provider '{0}'")]
    UnknownProvider(String),

    #[error("no target with id '{0}'")]
    UnknownTarget(String),

    #[error("targets cannot be changed while a round is in flight")]
    RoundInFlight,

    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),
}

impl GatewayError {
    /// Wrap a reqwest failure as a transport error.
    pub fn transport(provider: Provider, err: &reqwest::Error) -> Self {
        let message = if err.is_timeout() {
            format!("{} request timed out", provider.display_name())
        } else if err.is_connect() {
            format!("could not connect to {}: {}", provider.display_name(), err)
        } else {
            format!("{} request failed: {}", provider.display_name(), err)
        };
        Self::Transport { message }
    }

    /// True for the four kinds that end up in a target's result.
    pub fn is_target_failure(&self) -> bool {
        matches!(
            self,
            Self::ConfigurationIncomplete { .. }
                | Self::Transport { .. }
                | Self::Vendor { .. }
                | Self::Normalization { .. }
        )
    }
}
