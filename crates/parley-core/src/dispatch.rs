//! Fan-out dispatcher
//!
//! Runs one round: a task per usable target, each bounded by the per-call
//! timeout, each writing only its own result. A failing, panicking or hung
//! target never affects its siblings.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::catalog::Provider;
use crate::classify::user_message;
use crate::error::GatewayError;
use crate::normalize::normalize;
use crate::providers::{AdapterSet, DEFAULT_CALL_TIMEOUT, ProviderAdapter, RawPayload};
use crate::round::{DispatchRound, RoundEvent, TargetResult};
use crate::target::{Credential, TargetConfig, TargetId};

/// Dispatcher settings
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Upper bound on each vendor call; expiry fails that target only
    pub call_timeout: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }
}

/// Fans a prompt out to every configured target concurrently.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    adapters: AdapterSet,
    config: DispatchConfig,
    progress_tx: Option<mpsc::Sender<RoundEvent>>,
}

impl Dispatcher {
    pub fn new(adapters: AdapterSet, config: DispatchConfig) -> Self {
        Self {
            adapters,
            config,
            progress_tx: None,
        }
    }

    /// Receive a [`RoundEvent`] for every status transition.
    pub fn with_progress(mut self, tx: mpsc::Sender<RoundEvent>) -> Self {
        self.progress_tx = Some(tx);
        self
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Run one round for `prompt` over `targets`.
    ///
    /// Returns once every target is terminal. Unusable targets fail
    /// immediately without a network call. Duplicate ids after the first are
    /// dropped.
    pub async fn dispatch(
        &self,
        prompt: &str,
        targets: &[TargetConfig],
    ) -> Result<DispatchRound, GatewayError> {
        if prompt.trim().is_empty() {
            return Err(GatewayError::EmptyPrompt);
        }

        let round_id = Uuid::new_v4();
        let started_at = Utc::now();
        let prompt: Arc<str> = Arc::from(prompt);

        let mut seen = HashSet::new();
        let mut order: Vec<TargetId> = Vec::with_capacity(targets.len());
        let mut slots: HashMap<TargetId, TargetResult> = HashMap::with_capacity(targets.len());
        let mut handles = Vec::new();

        for target in targets {
            if !seen.insert(target.id.clone()) {
                warn!("Duplicate target id {} in round {}, skipping", target.id, round_id);
                continue;
            }
            order.push(target.id.clone());
            let mut result = TargetResult::pending(target.id.clone());

            let adapter = match self.resolve(target) {
                Ok(adapter) => adapter,
                Err(e) => {
                    debug!("Target {} not dispatched: {}", target.id, e);
                    result.fail(user_message(&e));
                    self.emit(round_id, &result).await;
                    slots.insert(target.id.clone(), result);
                    continue;
                }
            };

            result.mark_in_flight();
            self.emit(round_id, &result).await;

            let prompt = prompt.clone();
            let model = target.model.clone();
            let credential = target.credential.clone();
            let timeout = self.config.call_timeout;
            let progress_tx = self.progress_tx.clone();

            handles.push((
                target.id.clone(),
                tokio::spawn(async move {
                    let outcome = run_target(adapter.as_ref(), &prompt, &model, &credential, timeout).await;
                    match outcome {
                        Ok(text) => {
                            result.succeed(text);
                        }
                        Err(e) => {
                            warn!(
                                "Target {} ({} / {}) failed: {}",
                                result.target_id(),
                                adapter.provider().id(),
                                model,
                                e
                            );
                            result.fail(user_message(&e));
                        }
                    }
                    send_event(progress_tx.as_ref(), round_id, &result).await;
                    result
                }),
            ));
        }

        info!(
            "Round {} started: {} targets, {} dispatched",
            round_id,
            order.len(),
            handles.len()
        );

        for (target_id, handle) in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => {
                    warn!("Target {} task aborted: {}", target_id, e);
                    let mut result = TargetResult::pending(target_id.clone());
                    result.mark_in_flight();
                    result.fail(format!("Target task panicked: {}", e));
                    self.emit(round_id, &result).await;
                    result
                }
            };
            slots.insert(target_id, result);
        }

        let results: Vec<TargetResult> = order
            .iter()
            .filter_map(|id| slots.remove(id))
            .collect();

        let round = DispatchRound {
            round_id,
            prompt: prompt.to_string(),
            started_at,
            finished_at: Utc::now(),
            results,
        };

        info!(
            "Round {} finished: {} succeeded, {} failed",
            round_id,
            round.succeeded(),
            round.failed()
        );

        Ok(round)
    }

    /// Single call with no normalization; backs the raw `/api/generate` route.
    pub async fn invoke_raw(
        &self,
        provider: Provider,
        model: &str,
        credential: &Credential,
        prompt: &str,
    ) -> Result<RawPayload, GatewayError> {
        let adapter = self
            .adapters
            .get(provider)
            .ok_or_else(|| GatewayError::UnknownProvider(provider.id().to_string()))?;
        invoke_with_timeout(adapter.as_ref(), prompt, model, credential, self.config.call_timeout).await
    }

    fn resolve(&self, target: &TargetConfig) -> Result<Arc<dyn ProviderAdapter>, GatewayError> {
        let missing = target.missing_fields();
        if !missing.is_empty() {
            return Err(GatewayError::ConfigurationIncomplete { missing });
        }
        let provider = target
            .provider
            .ok_or_else(|| GatewayError::ConfigurationIncomplete { missing: vec!["provider"] })?;
        self.adapters
            .get(provider)
            .ok_or_else(|| GatewayError::UnknownProvider(provider.id().to_string()))
    }

    async fn emit(&self, round_id: Uuid, result: &TargetResult) {
        send_event(self.progress_tx.as_ref(), round_id, result).await;
    }
}

/// Adapter call, then normalization: the success path for one target.
async fn run_target(
    adapter: &dyn ProviderAdapter,
    prompt: &str,
    model: &str,
    credential: &Credential,
    timeout: Duration,
) -> Result<String, GatewayError> {
    let payload = invoke_with_timeout(adapter, prompt, model, credential, timeout).await?;
    normalize(adapter.provider(), &payload)
}

async fn invoke_with_timeout(
    adapter: &dyn ProviderAdapter,
    prompt: &str,
    model: &str,
    credential: &Credential,
    timeout: Duration,
) -> Result<RawPayload, GatewayError> {
    match tokio::time::timeout(timeout, adapter.invoke(prompt, model, credential)).await {
        Ok(result) => result,
        Err(_) => Err(GatewayError::Transport {
            message: format!(
                "{} request timed out after {}s",
                adapter.provider().display_name(),
                timeout.as_secs_f32()
            ),
        }),
    }
}

async fn send_event(tx: Option<&mpsc::Sender<RoundEvent>>, round_id: Uuid, result: &TargetResult) {
    let Some(tx) = tx else { return };
    let event = RoundEvent {
        round_id,
        target_id: result.target_id().clone(),
        status: result.status(),
    };
    if let Err(e) = tx.send(event).await {
        debug!("Progress receiver dropped: {}", e);
    }
}
