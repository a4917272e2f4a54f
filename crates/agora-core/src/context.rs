//! Wiring for the session layer.
//!
//! `SessionContext` builds the invalidator, refresh coordinator and executor
//! around one `SessionAdapter`, with the state owner injected up front.
//! `RestStack` and `AgentStack` assemble the two call-site adapters.

use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info};

use crate::api::{AgentSessionAdapter, RequestExecutor, RestClient, RestSessionAdapter, Transport, XrpcAgent};
use crate::auth::{RefreshCoordinator, SessionAdapter, SessionInvalidator, SessionObserver};
use crate::cache::CacheManager;
use crate::config::Config;
use crate::models::SessionData;

pub struct SessionContext {
    adapter: Arc<dyn SessionAdapter>,
    cache: Arc<CacheManager>,
    invalidator: Arc<SessionInvalidator>,
    executor: Arc<RequestExecutor>,
}

impl SessionContext {
    pub fn new(
        adapter: Arc<dyn SessionAdapter>,
        cache: Arc<CacheManager>,
        observer: Arc<dyn SessionObserver>,
    ) -> Self {
        let invalidator = Arc::new(SessionInvalidator::new(
            Arc::clone(&adapter),
            Arc::clone(&cache),
            Arc::clone(&observer),
        ));
        let coordinator = Arc::new(RefreshCoordinator::new(
            Arc::clone(&adapter),
            Arc::clone(&cache),
            observer,
            Arc::clone(&invalidator),
        ));
        let executor = Arc::new(RequestExecutor::new(
            Arc::clone(&adapter),
            coordinator,
            Arc::clone(&invalidator),
        ));

        Self {
            adapter,
            cache,
            invalidator,
            executor,
        }
    }

    /// Load a cached session snapshot into the adapter. Returns whether one was found.
    pub fn restore(&self) -> bool {
        match self.cache.restore_session_snapshot() {
            Some(session) => {
                debug!(identity = %session.identity_id, "Session restored from cache");
                self.adapter.set_session(session);
                true
            }
            None => {
                debug!("No cached session to restore");
                false
            }
        }
    }

    /// Install a freshly signed-in session and persist its snapshot.
    pub fn establish(&self, session: SessionData) -> Result<()> {
        info!(identity = %session.identity_id, handle = %session.display_handle, "Session established");
        self.adapter.set_session(session.clone());
        self.cache.save_session_snapshot(&session)
    }

    pub fn sign_out(&self) {
        self.invalidator.invalidate();
    }

    pub fn session(&self) -> Option<SessionData> {
        self.adapter.session()
    }

    pub fn is_signed_in(&self) -> bool {
        self.adapter.session().is_some()
    }

    pub fn cache(&self) -> &Arc<CacheManager> {
        &self.cache
    }

    pub fn executor(&self) -> &Arc<RequestExecutor> {
        &self.executor
    }
}

/// The governance REST API behind a bearer-token session.
pub struct RestStack {
    pub context: SessionContext,
    pub adapter: Arc<RestSessionAdapter>,
    pub client: RestClient,
}

impl RestStack {
    pub fn new(
        config: &Config,
        cache: Arc<CacheManager>,
        transport: Arc<dyn Transport>,
        observer: Arc<dyn SessionObserver>,
    ) -> Self {
        let adapter = Arc::new(RestSessionAdapter::new(&config.api_base_url, Arc::clone(&transport)));
        let context = SessionContext::new(adapter.clone(), cache, observer);
        let client = RestClient::new(&config.api_base_url, transport, Arc::clone(context.executor()));
        Self {
            context,
            adapter,
            client,
        }
    }

    /// Sign in with an identifier and password and establish the session.
    pub async fn sign_in(&self, identifier: &str, password: &str) -> Result<SessionData> {
        let session = self.adapter.login(identifier, password).await?;
        self.context.establish(session.clone())?;
        Ok(session)
    }
}

/// The identity service behind an `XrpcAgent`.
pub struct AgentStack {
    pub context: SessionContext,
    pub agent: Arc<XrpcAgent>,
}

impl AgentStack {
    pub fn new(
        config: &Config,
        cache: Arc<CacheManager>,
        transport: Arc<dyn Transport>,
        observer: Arc<dyn SessionObserver>,
    ) -> Self {
        let agent = Arc::new(XrpcAgent::new(&config.service_url, transport));
        let adapter = Arc::new(AgentSessionAdapter::new(Arc::clone(&agent)));
        let context = SessionContext::new(adapter, cache, observer);
        Self { context, agent }
    }

    pub async fn sign_in(&self, identifier: &str, password: &str) -> Result<SessionData> {
        let session: SessionData = self.agent.create_session(identifier, password).await?.into();
        self.context.establish(session.clone())?;
        Ok(session)
    }
}
