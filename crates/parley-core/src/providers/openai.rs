//! OpenAI chat-completions adapter

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::catalog::Provider;
use crate::error::GatewayError;
use crate::target::Credential;

use super::types::{ProviderAdapter, RawPayload, read_vendor_body};

/// OpenAI adapter: bearer-token auth, `/v1/chat/completions`
pub struct OpenAiAdapter {
    client: Client,
    base_url: String,
}

impl std::fmt::Debug for OpenAiAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiAdapter")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl OpenAiAdapter {
    pub fn new(client: Client, base_url: String) -> Self {
        Self { client, base_url }
    }

    fn build_request<'a>(prompt: &'a str, model: &'a str) -> OpenAiRequest<'a> {
        OpenAiRequest {
            model,
            messages: vec![OpenAiMessage {
                role: "user",
                content: prompt,
            }],
        }
    }

    /// First choice's message content, or `null` when absent
    fn to_payload(resp: OpenAiApiResponse) -> RawPayload {
        let output = resp
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .map(|m| m.content)
            .unwrap_or(Value::Null);
        RawPayload::new(output)
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiAdapter {
    fn provider(&self) -> Provider {
        Provider::OpenAi
    }

    async fn invoke(
        &self,
        prompt: &str,
        model: &str,
        credential: &Credential,
    ) -> Result<RawPayload, GatewayError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = Self::build_request(prompt, model);

        debug!("OpenAI request: model={}, prompt_chars={}", model, prompt.len());

        let response = self
            .client
            .post(&url)
            .bearer_auth(credential.expose())
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::transport(Provider::OpenAi, &e))?;

        let body = read_vendor_body(Provider::OpenAi, response).await?;
        let api_response: OpenAiApiResponse = serde_json::from_value(body)
            .map_err(|_| GatewayError::Normalization { provider: Provider::OpenAi })?;

        Ok(Self::to_payload(api_response))
    }
}

// ── OpenAI wire types ──

#[derive(Debug, Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAiMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct OpenAiMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct OpenAiApiResponse {
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    #[serde(default)]
    message: Option<OpenAiResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponseMessage {
    #[serde(default)]
    content: Value,
}
