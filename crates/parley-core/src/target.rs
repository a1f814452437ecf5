//! Target configuration store
//!
//! Holds the (at most [`MAX_TARGETS`]) user-confirmed comparison slots. Plain
//! data: the dispatcher receives a snapshot and never mutates it.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::catalog::{Provider, ProviderCatalog};
use crate::error::GatewayError;

/// Fixed ceiling on concurrently configured targets
pub const MAX_TARGETS: usize = 3;

/// Opaque identifier assigned when a target is created
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetId(String);

impl TargetId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TargetId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for TargetId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for TargetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// API key for one target. Held in memory only; never serialized or logged.
#[derive(Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Credential({})", mask_secret(&self.0))
    }
}

/// Mask a secret for display: first 3 and last 4 chars of long keys, otherwise "***".
pub fn mask_secret(s: &str) -> String {
    if s.is_empty() {
        return "(empty)".to_string();
    }
    let chars: Vec<char> = s.chars().collect();
    if chars.len() > 7 {
        let prefix: String = chars[..3].iter().collect();
        let suffix: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", prefix, suffix)
    } else {
        "***".to_string()
    }
}

/// One user-configured comparison slot
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TargetConfig {
    #[serde(default)]
    pub id: TargetId,
    pub provider: Option<Provider>,
    #[serde(default)]
    pub model: String,
    #[serde(default, rename = "apiKey", skip_serializing)]
    pub credential: Credential,
}

impl TargetConfig {
    pub fn new(provider: Provider, model: impl Into<String>, credential: Credential) -> Self {
        Self {
            id: TargetId::new(),
            provider: Some(provider),
            model: model.into(),
            credential,
        }
    }

    /// Names of the required fields that are empty.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.provider.is_none() {
            missing.push("provider");
        }
        if self.model.trim().is_empty() {
            missing.push("model");
        }
        if self.credential.is_empty() {
            missing.push("credential");
        }
        missing
    }

    /// A target is dispatchable only when provider, model and credential are all set.
    pub fn is_usable(&self) -> bool {
        self.missing_fields().is_empty()
    }
}

/// Holds the confirmed targets, enforcing the capacity ceiling and model legality.
#[derive(Debug, Clone)]
pub struct TargetStore {
    catalog: Arc<ProviderCatalog>,
    targets: Vec<TargetConfig>,
}

impl TargetStore {
    pub fn new(catalog: Arc<ProviderCatalog>) -> Self {
        Self {
            catalog,
            targets: Vec::with_capacity(MAX_TARGETS),
        }
    }

    /// Confirm a new target. Returns its freshly assigned id.
    pub fn add(
        &mut self,
        provider: Provider,
        model: &str,
        credential: Credential,
    ) -> Result<TargetId, GatewayError> {
        if self.is_full() {
            return Err(GatewayError::CapacityExceeded { max: MAX_TARGETS });
        }
        self.catalog.validate(provider, model)?;

        if !credential_looks_valid(provider, &credential) {
            warn!(
                "{} API key does not have the expected prefix; keeping it anyway",
                provider.display_name()
            );
        }

        let target = TargetConfig::new(provider, model, credential);
        let id = target.id.clone();
        debug!("Added target {} ({} / {})", id, provider.id(), model);
        self.targets.push(target);
        Ok(id)
    }

    /// Remove a target, e.g. when its card is closed.
    pub fn remove(&mut self, id: &TargetId) -> Result<TargetConfig, GatewayError> {
        let idx = self
            .targets
            .iter()
            .position(|t| &t.id == id)
            .ok_or_else(|| GatewayError::UnknownTarget(id.to_string()))?;
        Ok(self.targets.remove(idx))
    }

    pub fn get(&self, id: &TargetId) -> Option<&TargetConfig> {
        self.targets.iter().find(|t| &t.id == id)
    }

    pub fn list(&self) -> &[TargetConfig] {
        &self.targets
    }

    /// Owned copy handed to the dispatcher for one round.
    pub fn snapshot(&self) -> Vec<TargetConfig> {
        self.targets.clone()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.targets.len() >= MAX_TARGETS
    }

    pub fn catalog(&self) -> &Arc<ProviderCatalog> {
        &self.catalog
    }
}

/// Vendor key prefixes: `sk-ant-` for Anthropic, `sk-` for OpenAI. Gemini keys are unprefixed.
fn credential_looks_valid(provider: Provider, credential: &Credential) -> bool {
    match provider {
        Provider::Anthropic => credential.expose().starts_with("sk-ant-"),
        Provider::OpenAi => credential.expose().starts_with("sk-"),
        Provider::Gemini => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> TargetStore {
        TargetStore::new(Arc::new(ProviderCatalog::builtin()))
    }

    #[test]
    fn test_add_assigns_unique_ids() {
        let mut store = store();
        let a = store.add(Provider::OpenAi, "gpt-4o", Credential::new("sk-a")).unwrap();
        let b = store.add(Provider::OpenAi, "gpt-4o", Credential::new("sk-b")).unwrap();
        assert_ne!(a, b);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_capacity_ceiling() {
        let mut store = store();
        for _ in 0..MAX_TARGETS {
            store.add(Provider::Gemini, "gemini-pro", Credential::new("key")).unwrap();
        }
        assert!(store.is_full());
        let err = store.add(Provider::Gemini, "gemini-pro", Credential::new("key")).unwrap_err();
        assert!(matches!(err, GatewayError::CapacityExceeded { max: 3 }));
    }

    #[test]
    fn test_add_rejects_illegal_model() {
        let mut store = store();
        let err = store
            .add(Provider::Anthropic, "gpt-4o", Credential::new("sk-ant-x"))
            .unwrap_err();
        assert!(matches!(err, GatewayError::UnknownModel { .. }));
        assert!(store.is_empty());
    }

    #[test]
    fn test_remove() {
        let mut store = store();
        let id = store.add(Provider::Gemini, "gemini-pro", Credential::new("key")).unwrap();
        assert!(store.get(&id).is_some());
        store.remove(&id).unwrap();
        assert!(store.get(&id).is_none());
        assert!(matches!(store.remove(&id), Err(GatewayError::UnknownTarget(_))));
    }

    #[test]
    fn test_usable_requires_all_fields() {
        let full = TargetConfig::new(Provider::OpenAi, "gpt-4o", Credential::new("sk-1"));
        assert!(full.is_usable());

        let no_key = TargetConfig::new(Provider::OpenAi, "gpt-4o", Credential::new("  "));
        assert_eq!(no_key.missing_fields(), vec!["credential"]);

        let blank = TargetConfig {
            id: TargetId::new(),
            provider: None,
            model: String::new(),
            credential: Credential::default(),
        };
        assert_eq!(blank.missing_fields(), vec!["provider", "model", "credential"]);
    }

    #[test]
    fn test_credential_never_serialized_or_debugged() {
        let target = TargetConfig::new(
            Provider::Anthropic,
            "claude-3-5-haiku-20241022",
            Credential::new("sk-ant-supersecret-1234"),
        );
        let json = serde_json::to_string(&target).unwrap();
        assert!(!json.contains("supersecret"));
        let debug = format!("{:?}", target);
        assert!(!debug.contains("supersecret"));
        assert!(debug.contains("sk-...1234"));
    }

    #[test]
    fn test_target_deserializes_api_key() {
        let target: TargetConfig = serde_json::from_str(
            r#"{"id":"t1","provider":"gemini","model":"gemini-pro","apiKey":"abc"}"#,
        )
        .unwrap();
        assert_eq!(target.id.as_str(), "t1");
        assert_eq!(target.credential.expose(), "abc");
        assert!(target.is_usable());
    }

    #[test]
    fn test_mask_secret() {
        assert_eq!(mask_secret(""), "(empty)");
        assert_eq!(mask_secret("short"), "***");
        assert_eq!(mask_secret("sk-abcdefgh"), "sk-...efgh");
    }
}
