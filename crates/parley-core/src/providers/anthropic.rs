//! Anthropic Claude messages adapter

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::catalog::Provider;
use crate::error::GatewayError;
use crate::target::Credential;

use super::types::{ProviderAdapter, RawPayload, read_vendor_body};

const API_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 1024;
const SYSTEM_PROMPT: &str = "You are Claude, a helpful AI assistant.";

/// Anthropic adapter: `x-api-key` header auth, `/v1/messages`
pub struct AnthropicAdapter {
    client: Client,
    base_url: String,
}

impl std::fmt::Debug for AnthropicAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicAdapter")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl AnthropicAdapter {
    pub fn new(client: Client, base_url: String) -> Self {
        Self { client, base_url }
    }

    fn build_request<'a>(prompt: &'a str, model: &'a str) -> AnthropicRequest<'a> {
        AnthropicRequest {
            model,
            max_tokens: MAX_TOKENS,
            system: SYSTEM_PROMPT,
            messages: vec![AnthropicMessage {
                role: "user",
                content: prompt,
            }],
        }
    }

    /// The `content` block array, passed through untouched
    fn to_payload(resp: AnthropicApiResponse) -> RawPayload {
        RawPayload::new(resp.content)
    }
}

#[async_trait]
impl ProviderAdapter for AnthropicAdapter {
    fn provider(&self) -> Provider {
        Provider::Anthropic
    }

    async fn invoke(
        &self,
        prompt: &str,
        model: &str,
        credential: &Credential,
    ) -> Result<RawPayload, GatewayError> {
        let url = format!("{}/v1/messages", self.base_url);
        let body = Self::build_request(prompt, model);

        debug!("Anthropic request: model={}, prompt_chars={}", model, prompt.len());

        let response = self
            .client
            .post(&url)
            .header("x-api-key", credential.expose())
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::transport(Provider::Anthropic, &e))?;

        let body = read_vendor_body(Provider::Anthropic, response).await?;
        let api_response: AnthropicApiResponse = serde_json::from_value(body)
            .map_err(|_| GatewayError::Normalization { provider: Provider::Anthropic })?;

        debug!(
            "Anthropic response: blocks={}, stop_reason={:?}",
            api_response.content.as_array().map_or(0, Vec::len),
            api_response.stop_reason
        );

        Ok(Self::to_payload(api_response))
    }
}

// ── Anthropic wire types ──

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'static str,
    messages: Vec<AnthropicMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct AnthropicApiResponse {
    #[serde(default)]
    content: Value,
    #[serde(default)]
    stop_reason: Option<String>,
}
