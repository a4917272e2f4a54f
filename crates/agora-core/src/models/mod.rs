//! Data models shared between the request layer and the web front end.
//!
//! - `SessionData`, `NewTokens`: the in-memory session and refresh results
//! - `CredentialBundle`: the long-lived identity imported at sign-in
//! - `ProfileSnapshot`: cached profile of the signed-in identity

pub mod credential;
pub mod profile;
pub mod session;

pub use credential::CredentialBundle;
pub use profile::ProfileSnapshot;
pub use session::{NewTokens, SessionData};
