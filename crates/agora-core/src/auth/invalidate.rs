use std::sync::Arc;

use tracing::{info, warn};

use crate::cache::CacheManager;

use super::session::{SessionAdapter, SessionObserver};

/// Tears a session down: persisted credentials, in-memory session, and the
/// application-wide state owner.
pub struct SessionInvalidator {
    adapter: Arc<dyn SessionAdapter>,
    cache: Arc<CacheManager>,
    observer: Arc<dyn SessionObserver>,
}

impl SessionInvalidator {
    pub fn new(
        adapter: Arc<dyn SessionAdapter>,
        cache: Arc<CacheManager>,
        observer: Arc<dyn SessionObserver>,
    ) -> Self {
        Self {
            adapter,
            cache,
            observer,
        }
    }

    /// Clear everything. Idempotent and infallible: storage errors are logged,
    /// and the remaining steps still run.
    pub fn invalidate(&self) {
        info!("Invalidating session");

        if let Err(e) = self.cache.remove_credential_bundle() {
            warn!(error = %e, "Failed to remove credential bundle");
        }
        if let Err(e) = self.cache.remove_session_snapshot() {
            warn!(error = %e, "Failed to remove session snapshot");
        }
        if let Err(e) = self.cache.remove_profile_snapshot() {
            warn!(error = %e, "Failed to remove profile snapshot");
        }

        self.adapter.clear_session();
        self.observer.logged_out();
    }
}
