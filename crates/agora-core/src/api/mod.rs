//! Session-aware request layer.
//!
//! This module provides the error classifier, the `Transport` seam with its
//! reqwest implementation, the `RequestExecutor` that recovers from access
//! token expiry, and the two call-site adapters built on it: the bearer-token
//! `RestClient` and the `XrpcAgent` identity-service adapter.

pub mod agent;
pub mod client;
pub mod error;
pub mod executor;
pub mod transport;

pub use agent::{AgentSessionAdapter, AtpSession, XrpcAgent};
pub use client::{RestClient, RestSessionAdapter};
pub use error::{classify, ApiError, ErrorBody, FailureKind};
pub use executor::{Navigator, Outcome, Redirect, RequestExecutor};
pub use transport::{ApiRequest, ApiResponse, HttpTransport, Payload, Transport};
