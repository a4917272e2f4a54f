//! Runs one logical authenticated call: attach the current token, classify
//! failures, recover from access-token expiry with a single shared refresh and
//! at most one retry.

use std::future::Future;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::auth::{RefreshCoordinator, SessionAdapter, SessionInvalidator};

use super::error::{classify, ApiError, FailureKind};
use super::transport::{ApiResponse, Payload};

/// Where a call wants the caller to go instead of returning data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Redirect {
    NotFound,
}

/// Result of a call that completed at the transport level.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Data(T),
    Redirect(Redirect),
}

/// Navigation collaborator owned by the UI layer.
pub trait Navigator: Send + Sync {
    fn redirect_to_not_found(&self);
}

/// Per-call record: a logical call gets at most one retry.
#[derive(Debug, Default)]
struct RequestAttempt {
    retried: bool,
}

pub struct RequestExecutor {
    adapter: Arc<dyn SessionAdapter>,
    coordinator: Arc<RefreshCoordinator>,
    invalidator: Arc<SessionInvalidator>,
}

impl RequestExecutor {
    pub fn new(
        adapter: Arc<dyn SessionAdapter>,
        coordinator: Arc<RefreshCoordinator>,
        invalidator: Arc<SessionInvalidator>,
    ) -> Self {
        Self {
            adapter,
            coordinator,
            invalidator,
        }
    }

    /// Execute `call`, which performs one round trip with the token it is given.
    ///
    /// The first attempt reads the token from the session at the moment it runs;
    /// a retry uses the token the refresh produced.
    pub async fn execute<F, Fut>(&self, call: F) -> Result<Outcome<Value>, ApiError>
    where
        F: Fn(Option<String>) -> Fut,
        Fut: Future<Output = Result<ApiResponse, ApiError>>,
    {
        let mut attempt = RequestAttempt::default();
        let mut token = self.adapter.access_token();

        loop {
            let result = call(token).await.and_then(ApiResponse::into_payload);

            let err = match result {
                Ok(Payload::Data(data)) => return Ok(Outcome::Data(data)),
                Ok(Payload::NotFound(body)) => {
                    debug!(%body, "Call reported not found");
                    return Ok(Outcome::Redirect(Redirect::NotFound));
                }
                Err(err) => err,
            };

            if classify(&err, false) != FailureKind::AccessExpired || attempt.retried {
                return Err(err);
            }

            if self.adapter.refresh_token().is_none() {
                warn!("Access token expired with no refresh token available");
                self.invalidator.invalidate();
                return Err(ApiError::Unauthenticated);
            }

            info!(error = %err, "Access token expired, refreshing before retry");
            token = Some(self.coordinator.acquire_refreshed_token().await?);
            attempt.retried = true;
        }
    }

    /// Legacy behaviour: a not-found body sends the UI to its not-found page and
    /// the returned future never completes.
    ///
    /// Callers cannot tell from the return type that this may hang; prefer
    /// `execute` and act on `Outcome::Redirect`.
    pub async fn execute_with_navigation<F, Fut>(
        &self,
        call: F,
        navigator: &dyn Navigator,
    ) -> Result<Value, ApiError>
    where
        F: Fn(Option<String>) -> Fut,
        Fut: Future<Output = Result<ApiResponse, ApiError>>,
    {
        match self.execute(call).await? {
            Outcome::Data(data) => Ok(data),
            Outcome::Redirect(Redirect::NotFound) => {
                navigator.redirect_to_not_found();
                futures::future::pending().await
            }
        }
    }
}
