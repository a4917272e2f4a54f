//! Authentication module for managing user sessions and credentials.
//!
//! This module provides:
//! - `SessionStore` / `SessionAdapter`: the in-memory session and the capability
//!   the refresh machinery needs from a session source
//! - `RefreshCoordinator`: single-flight token refresh shared by all callers
//! - `SessionInvalidator`: full teardown on logout or a dead refresh token
//! - `CredentialStore`: secure OS-level storage of the sign-in password via keyring

pub mod credentials;
pub mod invalidate;
pub mod refresh;
pub mod session;

pub use credentials::CredentialStore;
pub use invalidate::SessionInvalidator;
pub use refresh::RefreshCoordinator;
pub use session::{SessionAdapter, SessionEvent, SessionObserver, SessionStore};
