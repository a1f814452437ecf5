//! parley-core - Fan one prompt out to several LLM vendors at once
//!
//! This crate provides:
//! - Provider catalog and the capped target store
//! - One adapter per vendor (OpenAI, Anthropic, Gemini) behind a single trait
//! - Concurrent dispatcher with per-target timeouts and failure isolation
//! - Response normalizer and user-facing error classifier
//! - Round session with supersession of stale rounds

pub mod catalog;
pub mod classify;
pub mod dispatch;
pub mod error;
pub mod normalize;
pub mod providers;
pub mod round;
pub mod session;
pub mod target;

// Re-export main types for convenience
pub use catalog::{Provider, ProviderCatalog, ProviderEntry, ProviderOverride};
pub use classify::user_message;
pub use dispatch::{DispatchConfig, Dispatcher};
pub use error::GatewayError;
pub use normalize::normalize;
pub use providers::{AdapterSet, ProviderAdapter, RawPayload};
pub use round::{DispatchRound, RoundEvent, TargetResult, TargetStatus};
pub use session::{RoundOutcome, Session};
pub use target::{Credential, MAX_TARGETS, TargetConfig, TargetId, TargetStore, mask_secret};

