//! Single-flight token refresh.
//!
//! The first caller to ask for a fresh token while the coordinator is idle
//! drives the refresh; everyone who asks while it is in flight is queued and
//! receives the same outcome. The queue is drained exactly once per attempt.

use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::api::{classify, ApiError, FailureKind};
use crate::cache::CacheManager;

use super::invalidate::SessionInvalidator;
use super::session::{SessionAdapter, SessionObserver};

type RefreshResult = Result<String, ApiError>;

enum RefreshState {
    Idle,
    Refreshing {
        waiters: Vec<oneshot::Sender<RefreshResult>>,
    },
}

pub struct RefreshCoordinator {
    adapter: Arc<dyn SessionAdapter>,
    cache: Arc<CacheManager>,
    observer: Arc<dyn SessionObserver>,
    invalidator: Arc<SessionInvalidator>,
    state: Mutex<RefreshState>,
}

impl RefreshCoordinator {
    pub fn new(
        adapter: Arc<dyn SessionAdapter>,
        cache: Arc<CacheManager>,
        observer: Arc<dyn SessionObserver>,
        invalidator: Arc<SessionInvalidator>,
    ) -> Self {
        Self {
            adapter,
            cache,
            observer,
            invalidator,
            state: Mutex::new(RefreshState::Idle),
        }
    }

    pub fn is_refreshing(&self) -> bool {
        matches!(*self.lock_state(), RefreshState::Refreshing { .. })
    }

    /// Get a new access token, joining a refresh already in flight if there is one.
    ///
    /// Fails with `ApiError::SessionExpired` when the refresh token is dead (the
    /// session has been invalidated by then), or with the raw refresh error
    /// otherwise. There is no timeout: a refresh that never settles keeps every
    /// caller waiting.
    pub async fn acquire_refreshed_token(&self) -> RefreshResult {
        let waiter = {
            let mut state = self.lock_state();
            match *state {
                RefreshState::Refreshing { ref mut waiters } => {
                    let (tx, rx) = oneshot::channel();
                    waiters.push(tx);
                    debug!(queued = waiters.len(), "Joining in-flight token refresh");
                    Some(rx)
                }
                RefreshState::Idle => {
                    *state = RefreshState::Refreshing {
                        waiters: Vec::new(),
                    };
                    None
                }
            }
        };

        if let Some(rx) = waiter {
            return rx.await.unwrap_or(Err(ApiError::RefreshAbandoned));
        }

        let mut flight = Flight {
            coordinator: self,
            settled: false,
        };
        let result = self.run_refresh().await;
        flight.settle(&result);
        result
    }

    async fn run_refresh(&self) -> RefreshResult {
        info!("Refreshing access token");

        match self.adapter.refresh().await {
            Ok(tokens) => {
                // Signed out while the refresh was in flight: the new tokens are discarded.
                let Some(mut session) = self.adapter.session() else {
                    warn!("Session ended during token refresh, discarding new tokens");
                    return Err(ApiError::SessionExpired);
                };
                session.apply(&tokens);
                self.adapter.set_session(session.clone());
                if let Err(e) = self.cache.save_session_snapshot(&session) {
                    warn!(error = %e, "Failed to persist refreshed session");
                }
                self.observer.session_refreshed(&session);
                info!("Access token refreshed");
                Ok(tokens.access_jwt)
            }
            Err(e) => match classify(&e, true) {
                FailureKind::RefreshExpired => {
                    warn!(error = %e, "Refresh token rejected, ending session");
                    self.invalidator.invalidate();
                    Err(ApiError::SessionExpired)
                }
                _ => {
                    warn!(error = %e, "Token refresh failed");
                    Err(e)
                }
            },
        }
    }

    /// Return to idle and hand the waiters queued so far back to the caller.
    fn finish(&self) -> Vec<oneshot::Sender<RefreshResult>> {
        let mut state = self.lock_state();
        match std::mem::replace(&mut *state, RefreshState::Idle) {
            RefreshState::Refreshing { waiters } => waiters,
            RefreshState::Idle => Vec::new(),
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, RefreshState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Settles one refresh attempt. If the driving future is dropped mid-refresh,
/// the waiters are rejected instead of being left queued.
struct Flight<'a> {
    coordinator: &'a RefreshCoordinator,
    settled: bool,
}

impl Flight<'_> {
    fn settle(&mut self, result: &RefreshResult) {
        self.settled = true;
        let waiters = self.coordinator.finish();
        debug!(waiters = waiters.len(), ok = result.is_ok(), "Broadcasting refresh outcome");
        for tx in waiters {
            // A waiter that stopped listening has nothing to receive.
            let _ = tx.send(result.clone());
        }
    }
}

impl Drop for Flight<'_> {
    fn drop(&mut self) {
        if !self.settled {
            warn!("Token refresh dropped before completion");
            self.settle(&Err(ApiError::RefreshAbandoned));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiResponse;
    use crate::test_support::{fixture, is_refresh};
    use futures::future::join_all;
    use serde_json::json;

    #[tokio::test]
    async fn test_concurrent_callers_share_one_refresh() {
        let fx = fixture(|req| {
            assert!(is_refresh(req));
            Ok(ApiResponse::ok(json!({"accessJwt": "T2", "refreshJwt": "R2"})))
        });

        let results = join_all((0..5).map(|_| fx.coordinator.acquire_refreshed_token())).await;

        assert_eq!(fx.transport.refresh_count(), 1);
        for result in results {
            assert_eq!(result, Ok("T2".to_string()));
        }
        assert!(!fx.coordinator.is_refreshing());
        assert_eq!(fx.adapter.access_token().as_deref(), Some("T2"));
        assert_eq!(fx.adapter.refresh_token().as_deref(), Some("R2"));
        assert_eq!(fx.observer.refreshed_tokens(), vec!["T2".to_string()]);
        let snapshot = fx.cache.load_session_snapshot().unwrap().unwrap();
        assert_eq!(snapshot.access_token, "T2");
    }

    #[tokio::test]
    async fn test_refresh_expired_invalidates_once_and_rejects_all() {
        let fx = fixture(|_| Err(ApiError::from_status(400, r#"{"error":"BadJwt"}"#)));

        let results = join_all((0..4).map(|_| fx.coordinator.acquire_refreshed_token())).await;

        assert_eq!(fx.transport.refresh_count(), 1);
        assert_eq!(fx.observer.logouts(), 1);
        for result in results {
            assert_eq!(result, Err(ApiError::SessionExpired));
        }
        assert!(fx.adapter.session().is_none());
        assert_eq!(fx.cache.load_session_snapshot().unwrap(), None);
    }

    #[tokio::test]
    async fn test_transient_refresh_failure_keeps_session() {
        let fx = fixture(|_| Err(ApiError::from_status(503, "unavailable")));

        let results = join_all((0..3).map(|_| fx.coordinator.acquire_refreshed_token())).await;

        for result in &results {
            assert!(matches!(result, Err(ApiError::Status { status: 503, .. })));
        }
        assert_eq!(fx.observer.logouts(), 0);
        assert_eq!(fx.adapter.access_token().as_deref(), Some("T1"));
        assert!(!fx.coordinator.is_refreshing());
    }

    #[tokio::test]
    async fn test_coordinator_can_refresh_again_after_settling() {
        let fx = fixture(|_| Ok(ApiResponse::ok(json!({"accessJwt": "T2"}))));

        assert_eq!(fx.coordinator.acquire_refreshed_token().await, Ok("T2".to_string()));
        assert_eq!(fx.coordinator.acquire_refreshed_token().await, Ok("T2".to_string()));
        assert_eq!(fx.transport.refresh_count(), 2);
    }

    #[tokio::test]
    async fn test_sign_out_during_refresh_discards_tokens() {
        let fx = fixture(|_| Ok(ApiResponse::ok(json!({"accessJwt": "T2", "refreshJwt": "R2"}))));

        let mut leader = Box::pin(fx.coordinator.acquire_refreshed_token());
        assert!(futures::poll!(leader.as_mut()).is_pending());
        let mut waiter = Box::pin(fx.coordinator.acquire_refreshed_token());
        assert!(futures::poll!(waiter.as_mut()).is_pending());

        fx.invalidator.invalidate();

        assert_eq!(leader.await, Err(ApiError::SessionExpired));
        assert_eq!(waiter.await, Err(ApiError::SessionExpired));
        assert!(fx.adapter.session().is_none());
        assert_eq!(fx.cache.load_session_snapshot().unwrap(), None);
        assert!(fx.observer.refreshed_tokens().is_empty());
        assert_eq!(fx.observer.logouts(), 1);
        assert!(!fx.coordinator.is_refreshing());
    }

    #[tokio::test]
    async fn test_dropped_refresh_rejects_waiters() {
        let fx = fixture(|_| Ok(ApiResponse::ok(json!({"accessJwt": "T2"}))));

        let mut leader = Box::pin(fx.coordinator.acquire_refreshed_token());
        // Poll the leader once so it is parked inside the transport.
        assert!(futures::poll!(leader.as_mut()).is_pending());
        assert!(fx.coordinator.is_refreshing());

        let mut waiter = Box::pin(fx.coordinator.acquire_refreshed_token());
        assert!(futures::poll!(waiter.as_mut()).is_pending());

        drop(leader);
        assert_eq!(waiter.await, Err(ApiError::RefreshAbandoned));
        assert!(!fx.coordinator.is_refreshing());
    }
}
