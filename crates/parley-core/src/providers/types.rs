//! Provider-agnostic adapter contract

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::catalog::{Provider, ProviderCatalog};
use crate::error::GatewayError;
use crate::target::Credential;

/// Per-call timeout applied to every vendor request
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(60);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Vendor answer reduced to the `{"output": ...}` envelope the normalizer reads.
///
/// `output` is whatever the vendor put at its answer location: a string, an
/// array of segments, an object, or `null` when that location was absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPayload {
    #[serde(default)]
    pub output: Value,
}

impl RawPayload {
    pub fn new(output: Value) -> Self {
        Self { output }
    }
}

/// Trait every vendor adapter implements
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Vendor this adapter talks to
    fn provider(&self) -> Provider;

    /// Issue exactly one request for `prompt` and return the raw payload.
    ///
    /// The model is forwarded as given; legality is checked by the target store.
    async fn invoke(
        &self,
        prompt: &str,
        model: &str,
        credential: &Credential,
    ) -> Result<RawPayload, GatewayError>;
}

/// Build the HTTP client shared by all adapters.
pub fn build_http_client(timeout: Duration) -> Result<Client, GatewayError> {
    Client::builder()
        .timeout(timeout)
        .connect_timeout(CONNECT_TIMEOUT.min(timeout))
        .build()
        .map_err(|e| GatewayError::HttpClientBuild(e.to_string()))
}

/// Read a vendor response: non-2xx and 2xx-with-`error` become [`GatewayError::Vendor`].
///
/// Returns the parsed JSON body on success. A 2xx body that is not JSON is a
/// normalization failure, not a vendor one.
pub(crate) async fn read_vendor_body(
    provider: Provider,
    response: Response,
) -> Result<Value, GatewayError> {
    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| GatewayError::transport(provider, &e))?;
    let body: Option<Value> = serde_json::from_str(&text).ok();

    debug!(
        "{} response: status={}, bytes={}",
        provider.display_name(),
        status.as_u16(),
        text.len()
    );

    if !status.is_success() {
        return Err(GatewayError::Vendor {
            provider,
            status: status.as_u16(),
            body,
        });
    }

    match body {
        Some(body) if body.get("error").is_some_and(|e| !e.is_null()) => Err(GatewayError::Vendor {
            provider,
            status: status.as_u16(),
            body: Some(body),
        }),
        Some(body) => Ok(body),
        None => Err(GatewayError::Normalization { provider }),
    }
}

/// Adapters keyed by provider, selected once per target at dispatch time
#[derive(Clone, Default)]
pub struct AdapterSet {
    adapters: HashMap<Provider, Arc<dyn ProviderAdapter>>,
}

impl AdapterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// The three HTTP adapters, pointed at the catalog's base URLs.
    pub fn http(catalog: &ProviderCatalog, timeout: Duration) -> Result<Self, GatewayError> {
        let client = build_http_client(timeout)?;
        Ok(Self::new()
            .with(Arc::new(super::openai::OpenAiAdapter::new(
                client.clone(),
                catalog.base_url(Provider::OpenAi).to_string(),
            )))
            .with(Arc::new(super::anthropic::AnthropicAdapter::new(
                client.clone(),
                catalog.base_url(Provider::Anthropic).to_string(),
            )))
            .with(Arc::new(super::google::GeminiAdapter::new(
                client,
                catalog.base_url(Provider::Gemini).to_string(),
            ))))
    }

    /// Register (or replace) the adapter for its provider.
    pub fn with(mut self, adapter: Arc<dyn ProviderAdapter>) -> Self {
        self.adapters.insert(adapter.provider(), adapter);
        self
    }

    pub fn get(&self, provider: Provider) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.get(&provider).cloned()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

impl std::fmt::Debug for AdapterSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut providers: Vec<_> = self.adapters.keys().map(|p| p.id()).collect();
        providers.sort_unstable();
        f.debug_struct("AdapterSet").field("providers", &providers).finish()
    }
}
