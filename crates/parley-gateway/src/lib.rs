//! parley-gateway - HTTP front end for the fan-out dispatcher
//!
//! Exposes target management, dispatch rounds and the single-target
//! `/api/generate` call over a small JSON API.

pub mod auth;
pub mod protocol;
pub mod server;

pub use server::GatewayServer;
