//! Round session
//!
//! Owns the target store, the dispatcher and the latest completed round.
//! Every round over the stored targets takes the next generation number; one
//! that finishes after a newer one has started is superseded and its results
//! are discarded. Ad-hoc rounds over caller-supplied targets are stateless.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

use crate::catalog::{Provider, ProviderCatalog};
use crate::dispatch::Dispatcher;
use crate::error::GatewayError;
use crate::round::DispatchRound;
use crate::target::{Credential, MAX_TARGETS, TargetConfig, TargetId, TargetStore};

/// How a round ended from the session's point of view
#[derive(Debug, Clone)]
pub enum RoundOutcome {
    /// Newest round at completion time; stored as the latest snapshot
    Completed(DispatchRound),
    /// A newer prompt was submitted while this round ran
    Superseded { round_id: Uuid },
}

pub struct Session {
    catalog: Arc<ProviderCatalog>,
    store: RwLock<TargetStore>,
    dispatcher: Dispatcher,
    generation: AtomicU64,
    in_flight: AtomicUsize,
    latest: Mutex<Option<DispatchRound>>,
}

impl Session {
    pub fn new(store: TargetStore, dispatcher: Dispatcher) -> Self {
        Self {
            catalog: store.catalog().clone(),
            store: RwLock::new(store),
            dispatcher,
            generation: AtomicU64::new(0),
            in_flight: AtomicUsize::new(0),
            latest: Mutex::new(None),
        }
    }

    pub fn catalog(&self) -> &Arc<ProviderCatalog> {
        &self.catalog
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Number of rounds currently running
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Generation of the most recently started round (0 before the first)
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub async fn targets(&self) -> Vec<TargetConfig> {
        self.store.read().await.snapshot()
    }

    pub async fn add_target(
        &self,
        provider: Provider,
        model: &str,
        credential: Credential,
    ) -> Result<TargetId, GatewayError> {
        let mut store = self.store.write().await;
        self.ensure_idle()?;
        store.add(provider, model, credential)
    }

    pub async fn remove_target(&self, id: &TargetId) -> Result<TargetConfig, GatewayError> {
        let mut store = self.store.write().await;
        self.ensure_idle()?;
        store.remove(id)
    }

    /// Run a round over the stored targets.
    pub async fn start_round(&self, prompt: &str) -> Result<RoundOutcome, GatewayError> {
        if prompt.trim().is_empty() {
            return Err(GatewayError::EmptyPrompt);
        }
        // The in-flight count is raised under the read lock so that a
        // concurrent edit, which holds the write lock, always observes it.
        let (targets, guard) = {
            let store = self.store.read().await;
            (store.snapshot(), InFlightGuard::enter(&self.in_flight))
        };
        self.run_guarded(prompt, &targets, guard).await
    }

    /// Run a stateless round over caller-supplied targets.
    ///
    /// Bypasses the store and the session state: no generation is taken,
    /// `latest` is left alone and target edits stay allowed. The targets get
    /// the same checks the store applies: at most [`MAX_TARGETS`] of them, and
    /// every provider/model pair must be in the catalog.
    pub async fn run_round(
        &self,
        prompt: &str,
        targets: &[TargetConfig],
    ) -> Result<DispatchRound, GatewayError> {
        if prompt.trim().is_empty() {
            return Err(GatewayError::EmptyPrompt);
        }
        if targets.len() > MAX_TARGETS {
            return Err(GatewayError::CapacityExceeded { max: MAX_TARGETS });
        }
        for target in targets {
            if let Some(provider) = target.provider {
                if !target.model.is_empty() {
                    self.catalog.validate(provider, &target.model)?;
                }
            }
        }
        self.dispatcher.dispatch(prompt, targets).await
    }

    /// Last completed, non-superseded round
    pub async fn latest(&self) -> Option<DispatchRound> {
        self.latest.lock().await.clone()
    }

    async fn run_guarded(
        &self,
        prompt: &str,
        targets: &[TargetConfig],
        _guard: InFlightGuard<'_>,
    ) -> Result<RoundOutcome, GatewayError> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("Starting round generation {} over {} targets", generation, targets.len());

        let round = self.dispatcher.dispatch(prompt, targets).await?;

        let mut latest = self.latest.lock().await;
        if self.generation.load(Ordering::SeqCst) != generation {
            info!(
                "Round {} (generation {}) superseded, discarding results",
                round.round_id, generation
            );
            return Ok(RoundOutcome::Superseded {
                round_id: round.round_id,
            });
        }
        *latest = Some(round.clone());
        Ok(RoundOutcome::Completed(round))
    }

    fn ensure_idle(&self) -> Result<(), GatewayError> {
        if self.in_flight() > 0 {
            return Err(GatewayError::RoundInFlight);
        }
        Ok(())
    }
}

/// Keeps the in-flight count accurate even if the round future is dropped.
struct InFlightGuard<'a>(&'a AtomicUsize);

impl<'a> InFlightGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}
