//! JSON bodies for the gateway API (camelCase on the wire)

use serde::{Deserialize, Serialize};
use serde_json::Value;

use parley_core::{Credential, Provider, ProviderEntry, TargetConfig, TargetId};

/// `{"error": "..."}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        Self { error: error.into() }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub status: &'static str,
    pub targets: usize,
    pub max_targets: usize,
    pub rounds_in_flight: usize,
    pub uptime_secs: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderView {
    pub id: Provider,
    pub name: String,
    pub models: Vec<String>,
}

impl From<&ProviderEntry> for ProviderView {
    fn from(entry: &ProviderEntry) -> Self {
        Self {
            id: entry.provider,
            name: entry.name.to_string(),
            models: entry.models.clone(),
        }
    }
}

/// A stored target as clients see it; the credential never leaves the server.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetView {
    pub id: TargetId,
    pub provider: Option<Provider>,
    pub model: String,
    pub has_credential: bool,
}

impl From<&TargetConfig> for TargetView {
    fn from(target: &TargetConfig) -> Self {
        Self {
            id: target.id.clone(),
            provider: target.provider,
            model: target.model.clone(),
            has_credential: !target.credential.is_empty(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddTargetRequest {
    pub provider: String,
    pub model: String,
    pub api_key: Credential,
}

#[derive(Debug, Deserialize)]
pub struct PromptRequest {
    pub prompt: String,
}

#[derive(Debug, Deserialize)]
pub struct AdhocRoundRequest {
    pub prompt: String,
    #[serde(default)]
    pub targets: Vec<TargetConfig>,
}

/// Single-target request, field-compatible with the original `/api/generate` backend
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GenerateRequest {
    pub provider: String,
    pub model: String,
    pub prompt: String,
    pub api_key: Credential,
}

/// Raw vendor payload, not normalized
#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub output: Value,
}
