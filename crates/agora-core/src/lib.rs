//! Core library for agora.
//!
//! Session-aware authenticated request layer for the governance web app:
//! token attachment, expiry classification, single-flight token refresh,
//! and session teardown, plus the persisted credential cache they rely on.

pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod context;
pub mod models;

#[cfg(test)]
pub(crate) mod test_support;

pub use api::{ApiError, Outcome, Redirect, RequestExecutor};
pub use config::Config;
pub use context::{AgentStack, RestStack, SessionContext};
