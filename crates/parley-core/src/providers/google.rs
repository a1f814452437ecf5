//! Google Gemini generateContent adapter

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::catalog::Provider;
use crate::error::GatewayError;
use crate::target::Credential;

use super::types::{ProviderAdapter, RawPayload, read_vendor_body};

/// Gemini adapter: API key as the `key` query parameter
pub struct GeminiAdapter {
    client: Client,
    base_url: String,
}

impl std::fmt::Debug for GeminiAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiAdapter")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl GeminiAdapter {
    pub fn new(client: Client, base_url: String) -> Self {
        Self { client, base_url }
    }

    fn build_request(prompt: &str) -> GeminiRequest<'_> {
        GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart { text: prompt }],
            }],
        }
    }

    /// First candidate's `content.parts`, or `null` when any step is absent
    fn to_payload(resp: GeminiApiResponse) -> RawPayload {
        let output = resp
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts)
            .unwrap_or(Value::Null);
        RawPayload::new(output)
    }
}

#[async_trait]
impl ProviderAdapter for GeminiAdapter {
    fn provider(&self) -> Provider {
        Provider::Gemini
    }

    async fn invoke(
        &self,
        prompt: &str,
        model: &str,
        credential: &Credential,
    ) -> Result<RawPayload, GatewayError> {
        let url = format!("{}/v1beta/models/{}:generateContent", self.base_url, model);

        debug!("Gemini request: model={}, prompt_chars={}", model, prompt.len());

        let response = self
            .client
            .post(&url)
            .query(&[("key", credential.expose())])
            .json(&Self::build_request(prompt))
            .send()
            .await
            .map_err(|e| GatewayError::transport(Provider::Gemini, &e))?;

        let body = read_vendor_body(Provider::Gemini, response).await?;
        let api_response: GeminiApiResponse = serde_json::from_value(body)
            .map_err(|_| GatewayError::Normalization { provider: Provider::Gemini })?;

        debug!("Gemini response: candidates={}", api_response.candidates.len());

        Ok(Self::to_payload(api_response))
    }
}

// ── Gemini wire types ──

#[derive(Debug, Serialize)]
struct GeminiRequest<'a> {
    contents: Vec<GeminiContent<'a>>,
}

#[derive(Debug, Serialize)]
struct GeminiContent<'a> {
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Debug, Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GeminiApiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiCandidateContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidateContent {
    #[serde(default)]
    parts: Value,
}
