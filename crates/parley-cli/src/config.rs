use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

use parley_core::{
    Credential, MAX_TARGETS, Provider, ProviderCatalog, ProviderOverride, TargetStore, mask_secret,
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParleyConfig {
    #[serde(default)]
    pub dispatch: DispatchSection,
    #[serde(default)]
    pub gateway: GatewaySection,
    #[serde(default)]
    pub providers: ProvidersSection,
    #[serde(default)]
    pub targets: Vec<TargetEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchSection {
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
}

fn default_call_timeout_secs() -> u64 {
    60
}

impl Default for DispatchSection {
    fn default() -> Self {
        Self {
            call_timeout_secs: default_call_timeout_secs(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct GatewaySection {
    #[serde(default = "default_gateway_bind")]
    pub bind: String,
    #[serde(default)]
    pub auth_token: String,
}

impl std::fmt::Debug for GatewaySection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewaySection")
            .field("bind", &self.bind)
            .field("auth_token", &mask_secret(&self.auth_token))
            .finish()
    }
}

fn default_gateway_bind() -> String {
    "127.0.0.1:3000".to_string()
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            bind: default_gateway_bind(),
            auth_token: String::new(),
        }
    }
}

/// `[providers.openai]`, `[providers.anthropic]`, `[providers.gemini]`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvidersSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openai: Option<ProviderOverride>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anthropic: Option<ProviderOverride>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gemini: Option<ProviderOverride>,
}

impl ProvidersSection {
    pub fn overrides(&self) -> BTreeMap<Provider, ProviderOverride> {
        [
            (Provider::OpenAi, &self.openai),
            (Provider::Anthropic, &self.anthropic),
            (Provider::Gemini, &self.gemini),
        ]
        .into_iter()
        .filter_map(|(provider, o)| o.clone().map(|o| (provider, o)))
        .collect()
    }
}

/// One `[[targets]]` entry
#[derive(Clone, Serialize, Deserialize)]
pub struct TargetEntry {
    pub provider: String,
    pub model: String,
    #[serde(default)]
    pub api_key: String,
}

impl std::fmt::Debug for TargetEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TargetEntry")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("api_key", &mask_secret(&self.api_key))
            .finish()
    }
}

pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".parley")
}

impl ParleyConfig {
    pub fn load(custom_path: &Option<PathBuf>) -> Result<Self> {
        let path = custom_path
            .clone()
            .unwrap_or_else(|| config_dir().join("config.toml"));

        // Refuse config files readable by group or other: they hold API keys
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Ok(metadata) = std::fs::metadata(&path) {
                let mode = metadata.permissions().mode();
                if mode & 0o077 != 0 {
                    return Err(anyhow::anyhow!(
                        "Config file {:?} has overly permissive permissions ({:o}). \
                         It may contain secrets. Fix with: chmod 600 {:?}",
                        path,
                        mode & 0o777,
                        path
                    ));
                }
            }
        }

        let content = std::fs::read_to_string(&path).with_context(|| {
            format!(
                "Failed to read config at {}. Run `parley init` first.",
                path.display()
            )
        })?;

        Self::from_toml(&content)
            .with_context(|| format!("Failed to load config at {}", path.display()))
    }

    /// Parse, warn about literal secrets, then expand `${VAR}` references.
    pub fn from_toml(content: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(content).context("Invalid TOML")?;

        if config.targets.len() > MAX_TARGETS {
            anyhow::bail!(
                "{} targets configured, at most {} are allowed",
                config.targets.len(),
                MAX_TARGETS
            );
        }

        for (i, target) in config.targets.iter().enumerate() {
            if is_hardcoded(&target.api_key) {
                warn!(
                    "API key for target #{} ({}) is hardcoded in config file. For security, use environment variables: api_key = \"${{OPENAI_API_KEY}}\"",
                    i + 1,
                    target.provider
                );
            }
        }
        if is_hardcoded(&config.gateway.auth_token) {
            warn!(
                "Gateway token is hardcoded in config file. For security, use environment variables: auth_token = \"${{PARLEY_GATEWAY_TOKEN}}\""
            );
        }

        config.expand_secrets();
        Ok(config)
    }

    fn expand_secrets(&mut self) {
        for target in &mut self.targets {
            target.api_key = expand_env_vars(&target.api_key);
        }
        self.gateway.auth_token = expand_env_vars(&self.gateway.auth_token);
        for o in [
            &mut self.providers.openai,
            &mut self.providers.anthropic,
            &mut self.providers.gemini,
        ]
        .into_iter()
        .flatten()
        {
            if let Some(base_url) = &o.base_url {
                o.base_url = Some(expand_env_vars(base_url));
            }
        }
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.dispatch.call_timeout_secs.max(1))
    }

    pub fn catalog(&self) -> ProviderCatalog {
        ProviderCatalog::builtin().with_overrides(&self.providers.overrides())
    }

    /// Populate a store from the `[[targets]]` entries, in file order.
    pub fn target_store(&self, catalog: std::sync::Arc<ProviderCatalog>) -> Result<TargetStore> {
        let mut store = TargetStore::new(catalog);
        for (i, entry) in self.targets.iter().enumerate() {
            let provider = Provider::from_id(&entry.provider)
                .with_context(|| format!("Target #{}", i + 1))?;
            store
                .add(provider, &entry.model, Credential::new(entry.api_key.clone()))
                .with_context(|| format!("Target #{}", i + 1))?;
        }
        Ok(store)
    }

    pub fn auth_token(&self) -> Option<String> {
        Some(self.gateway.auth_token.clone()).filter(|t| !t.trim().is_empty())
    }

    /// Copy with every secret masked, for `parley config`.
    pub fn masked(&self) -> Self {
        let mut masked = self.clone();
        for target in &mut masked.targets {
            target.api_key = mask_secret(&target.api_key);
        }
        masked.gateway.auth_token = mask_secret(&masked.gateway.auth_token);
        masked
    }
}

fn is_hardcoded(secret: &str) -> bool {
    !secret.trim().is_empty() && !secret.contains("${")
}

/// Environment variables that may be expanded in config values. Anything else
/// is left as-is so a tampered config cannot read arbitrary variables.
const ALLOWED_ENV_VARS: &[&str] = &[
    "OPENAI_API_KEY",
    "ANTHROPIC_API_KEY",
    "GEMINI_API_KEY",
    "GOOGLE_AI_API_KEY",
    "PARLEY_GATEWAY_TOKEN",
    "HOME",
    "USER",
];

fn expand_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    let mut pos = 0;
    while pos < result.len() {
        let Some(start) = result[pos..].find("${") else {
            break;
        };
        let abs_start = pos + start;
        let Some(end) = result[abs_start..].find('}') else {
            break;
        };
        let var_name = result[abs_start + 2..abs_start + end].to_string();

        if !ALLOWED_ENV_VARS.contains(&var_name.as_str()) {
            warn!(
                "Skipping expansion of unrecognized env var '{}' in config (not in allowlist)",
                var_name
            );
            pos = abs_start + end + 1;
            continue;
        }

        let value = std::env::var(&var_name).unwrap_or_default();
        result = format!(
            "{}{}{}",
            &result[..abs_start],
            value,
            &result[abs_start + end + 1..]
        );
        pos = abs_start + value.len();
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_default_config_parses() {
        let config = ParleyConfig::from_toml(include_str!("../../../config/default.toml")).unwrap();
        assert_eq!(config.dispatch.call_timeout_secs, 60);
        assert_eq!(config.gateway.bind, "127.0.0.1:3000");
        assert_eq!(config.targets.len(), 3);
        assert_eq!(config.targets[1].provider, "anthropic");
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = ParleyConfig::from_toml("").unwrap();
        assert_eq!(config.call_timeout(), Duration::from_secs(60));
        assert!(config.targets.is_empty());
        assert!(config.auth_token().is_none());
    }

    #[test]
    fn test_too_many_targets_rejected() {
        let entry = "[[targets]]\nprovider = \"gemini\"\nmodel = \"gemini-pro\"\n";
        let err = ParleyConfig::from_toml(&entry.repeat(4)).unwrap_err();
        assert!(err.to_string().contains("at most 3"));
    }

    #[test]
    fn test_expand_allowed_var() {
        // HOME is set in any test environment
        let home = std::env::var("HOME").unwrap();
        assert_eq!(expand_env_vars("${HOME}/x"), format!("{}/x", home));
    }

    #[test]
    fn test_expand_skips_unlisted_var() {
        assert_eq!(expand_env_vars("${PATH}"), "${PATH}");
        assert_eq!(expand_env_vars("${HOME"), "${HOME");
        assert_eq!(expand_env_vars("plain"), "plain");
    }

    #[test]
    fn test_provider_overrides() {
        let config = ParleyConfig::from_toml(
            r#"
[providers.openai]
base_url = "http://localhost:8080/"
models = ["gpt-4o-mini"]
"#,
        )
        .unwrap();
        let overrides = config.providers.overrides();
        assert_eq!(overrides.len(), 1);

        let catalog = config.catalog();
        assert_eq!(catalog.base_url(Provider::OpenAi), "http://localhost:8080");
        assert!(catalog.is_legal(Provider::OpenAi, "gpt-4o-mini"));
        assert!(!catalog.is_legal(Provider::OpenAi, "gpt-4o"));
        assert!(catalog.is_legal(Provider::Gemini, "gemini-pro"));
    }

    #[test]
    fn test_target_store_from_entries() {
        let config = ParleyConfig::from_toml(
            r#"
[[targets]]
provider = "openai"
model = "gpt-4o"
api_key = "sk-literal-key"

[[targets]]
provider = "google"
model = "gemini-pro"
"#,
        )
        .unwrap();
        let store = config
            .target_store(Arc::new(config.catalog()))
            .unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.list()[0].credential.expose(), "sk-literal-key");
        assert_eq!(store.list()[1].provider, Some(Provider::Gemini));
        assert!(!store.list()[1].is_usable());
    }

    #[test]
    fn test_target_store_rejects_unknown_model() {
        let config = ParleyConfig::from_toml(
            "[[targets]]\nprovider = \"anthropic\"\nmodel = \"claude-9\"\napi_key = \"k\"\n",
        )
        .unwrap();
        let err = config.target_store(Arc::new(config.catalog())).unwrap_err();
        assert!(format!("{:#}", err).contains("Target #1"));
    }

    #[test]
    fn test_masked_hides_secrets() {
        let config = ParleyConfig::from_toml(
            r#"
[gateway]
auth_token = "gateway-token-value"

[[targets]]
provider = "openai"
model = "gpt-4o"
api_key = "sk-abcdefghijklmnop"
"#,
        )
        .unwrap();
        let rendered = toml::to_string_pretty(&config.masked()).unwrap();
        assert!(!rendered.contains("sk-abcdefghijklmnop"));
        assert!(!rendered.contains("gateway-token-value"));
        assert!(rendered.contains("sk-...mnop"));
        assert!(!format!("{:?}", config).contains("sk-abcdefghijklmnop"));
    }
}
