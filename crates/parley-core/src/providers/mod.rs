//! Vendor adapters
//!
//! One [`ProviderAdapter`] per vendor. Each owns its endpoint shape, auth
//! convention and response envelope; nothing outside this module branches on
//! provider identity.

pub mod anthropic;
pub mod google;
pub mod openai;
pub mod types;

#[cfg(test)]
pub(crate) mod stub;

pub use types::{AdapterSet, DEFAULT_CALL_TIMEOUT, ProviderAdapter, RawPayload, build_http_client};
