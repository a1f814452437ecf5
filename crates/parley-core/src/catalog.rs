//! Provider catalog: the closed set of vendors and their legal models
//!
//! Built once at startup and shared read-only (behind an `Arc`) by the
//! dispatcher, the target store and the gateway.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::GatewayError;

/// Supported LLM vendors
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[serde(rename = "openai")]
    OpenAi,
    Anthropic,
    #[serde(alias = "google")]
    Gemini,
}

impl Provider {
    pub const ALL: [Provider; 3] = [Provider::OpenAi, Provider::Anthropic, Provider::Gemini];

    /// Stable wire id (`openai`, `anthropic`, `gemini`)
    pub fn id(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Gemini => "gemini",
        }
    }

    /// Human-readable name shown on result cards
    pub fn display_name(self) -> &'static str {
        match self {
            Self::OpenAi => "OpenAI",
            Self::Anthropic => "Anthropic",
            Self::Gemini => "Google Gemini",
        }
    }

    /// Parse a provider from its wire id (case-insensitive)
    pub fn from_id(s: &str) -> Result<Self, GatewayError> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            "gemini" | "google" => Ok(Self::Gemini),
            _ => Err(GatewayError::UnknownProvider(s.to_string())),
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

/// One row of the catalog
#[derive(Debug, Clone, Serialize)]
pub struct ProviderEntry {
    pub provider: Provider,
    pub name: &'static str,
    pub models: Vec<String>,
    #[serde(skip)]
    pub base_url: String,
}

/// Per-provider overrides read from the config file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderOverride {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub models: Option<Vec<String>>,
}

/// Immutable table of providers, their endpoints and legal models
#[derive(Debug, Clone)]
pub struct ProviderCatalog {
    entries: BTreeMap<Provider, ProviderEntry>,
}

impl ProviderCatalog {
    /// Catalog with the vendors' public endpoints and the default model lists.
    pub fn builtin() -> Self {
        let mut entries = BTreeMap::new();
        for provider in Provider::ALL {
            let (base_url, models): (&str, &[&str]) = match provider {
                Provider::OpenAi => (
                    "https://api.openai.com",
                    &[
                        "gpt-4o",
                        "gpt-3.5-turbo",
                        "gpt-4o-2024-11-20",
                        "gpt-4o-mini",
                        "o1-preview-2024-09-12",
                        "o1-mini-2024-09-12",
                    ],
                ),
                Provider::Anthropic => (
                    "https://api.anthropic.com",
                    &[
                        "claude-3-opus-20240229",
                        "claude-3-5-sonnet-20241022",
                        "claude-3-5-haiku-20241022",
                    ],
                ),
                Provider::Gemini => ("https://generativelanguage.googleapis.com", &["gemini-pro"]),
            };
            entries.insert(
                provider,
                ProviderEntry {
                    provider,
                    name: provider.display_name(),
                    models: models.iter().map(|m| m.to_string()).collect(),
                    base_url: base_url.to_string(),
                },
            );
        }
        Self { entries }
    }

    /// Apply config-file overrides on top of the built-in table.
    pub fn with_overrides(mut self, overrides: &BTreeMap<Provider, ProviderOverride>) -> Self {
        for (provider, o) in overrides {
            if let Some(entry) = self.entries.get_mut(provider) {
                if let Some(base_url) = &o.base_url {
                    entry.base_url = base_url.trim_end_matches('/').to_string();
                }
                if let Some(models) = &o.models {
                    if !models.is_empty() {
                        entry.models = models.clone();
                    }
                }
            }
        }
        self
    }

    /// Point every provider at the same base URL (stub servers, proxies).
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        for entry in self.entries.values_mut() {
            entry.base_url = base_url.trim_end_matches('/').to_string();
        }
        self
    }

    pub fn entry(&self, provider: Provider) -> &ProviderEntry {
        // every Provider variant is inserted by builtin()
        &self.entries[&provider]
    }

    pub fn entries(&self) -> impl Iterator<Item = &ProviderEntry> {
        self.entries.values()
    }

    pub fn models(&self, provider: Provider) -> &[String] {
        &self.entry(provider).models
    }

    pub fn base_url(&self, provider: Provider) -> &str {
        &self.entry(provider).base_url
    }

    pub fn is_legal(&self, provider: Provider, model: &str) -> bool {
        self.models(provider).iter().any(|m| m == model)
    }

    /// Reject a model the provider does not declare.
    pub fn validate(&self, provider: Provider, model: &str) -> Result<(), GatewayError> {
        if self.is_legal(provider, model) {
            Ok(())
        } else {
            Err(GatewayError::UnknownModel {
                provider,
                model: model.to_string(),
            })
        }
    }
}

impl Default for ProviderCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}
