use std::sync::RwLock;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

use crate::api::ApiError;
use crate::models::{NewTokens, SessionData};

/// In-memory holder for the current session.
///
/// Reads hand out clones so no caller keeps a token across a suspension point.
#[derive(Debug, Default)]
pub struct SessionStore {
    data: RwLock<Option<SessionData>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<SessionData> {
        self.data.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn set(&self, session: SessionData) {
        *self.data.write().unwrap_or_else(|e| e.into_inner()) = Some(session);
    }

    pub fn clear(&self) {
        *self.data.write().unwrap_or_else(|e| e.into_inner()) = None;
    }

    pub fn access_token(&self) -> Option<String> {
        self.data
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|d| d.access_token.clone())
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.data
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .and_then(|d| d.refresh_token.clone())
    }
}

/// Capability the refresh machinery needs from a session source.
///
/// Implemented by the bearer-token REST adapter and by the adapter around the
/// identity-service agent, so both share one coordinator.
#[async_trait]
pub trait SessionAdapter: Send + Sync {
    fn session(&self) -> Option<SessionData>;

    fn set_session(&self, session: SessionData);

    fn clear_session(&self);

    /// Mint a new token pair from the current refresh token.
    async fn refresh(&self) -> Result<NewTokens, ApiError>;

    fn access_token(&self) -> Option<String> {
        self.session().map(|s| s.access_token)
    }

    fn refresh_token(&self) -> Option<String> {
        self.session().and_then(|s| s.refresh_token)
    }
}

/// Notifications for the application-wide state owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Refreshed(SessionData),
    LoggedOut,
}

/// The application-wide state owner, injected at construction.
///
/// `logged_out` must be safe to call with no active session.
pub trait SessionObserver: Send + Sync {
    fn session_refreshed(&self, session: &SessionData);

    fn logged_out(&self);
}

impl SessionObserver for mpsc::UnboundedSender<SessionEvent> {
    fn session_refreshed(&self, session: &SessionData) {
        if self.send(SessionEvent::Refreshed(session.clone())).is_err() {
            debug!("Session event receiver dropped");
        }
    }

    fn logged_out(&self) {
        if self.send(SessionEvent::LoggedOut).is_err() {
            debug!("Session event receiver dropped");
        }
    }
}
