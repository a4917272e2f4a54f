//! Shared test infrastructure: a scripted transport, recording collaborators,
//! and a fully wired REST fixture.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::api::{
    ApiError, ApiRequest, ApiResponse, Navigator, RequestExecutor, RestSessionAdapter, Transport,
};
use crate::auth::{RefreshCoordinator, SessionAdapter, SessionInvalidator, SessionObserver};
use crate::cache::CacheManager;
use crate::models::SessionData;

type Handler = Box<dyn Fn(&ApiRequest) -> Result<ApiResponse, ApiError> + Send + Sync>;

/// Transport that answers from a closure and records every request.
///
/// Each send yields once before answering so that callers started together
/// are all in flight at the same time.
pub struct MockTransport {
    handler: Handler,
    requests: Mutex<Vec<ApiRequest>>,
}

impl MockTransport {
    pub fn new(
        handler: impl Fn(&ApiRequest) -> Result<ApiResponse, ApiError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            handler: Box::new(handler),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn refresh_count(&self) -> usize {
        self.requests.lock().unwrap().iter().filter(|r| is_refresh(r)).count()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        self.requests.lock().unwrap().push(request.clone());
        tokio::task::yield_now().await;
        (self.handler)(&request)
    }
}

pub fn is_refresh(request: &ApiRequest) -> bool {
    request.url.ends_with("/auth/refresh")
}

#[derive(Default)]
pub struct RecordingObserver {
    refreshed: Mutex<Vec<SessionData>>,
    logouts: AtomicUsize,
}

impl RecordingObserver {
    pub fn refreshed_tokens(&self) -> Vec<String> {
        self.refreshed
            .lock()
            .unwrap()
            .iter()
            .map(|s| s.access_token.clone())
            .collect()
    }

    pub fn logouts(&self) -> usize {
        self.logouts.load(Ordering::SeqCst)
    }
}

impl SessionObserver for RecordingObserver {
    fn session_refreshed(&self, session: &SessionData) {
        self.refreshed.lock().unwrap().push(session.clone());
    }

    fn logged_out(&self) {
        self.logouts.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct RecordingNavigator {
    redirects: AtomicUsize,
}

impl RecordingNavigator {
    pub fn redirects(&self) -> usize {
        self.redirects.load(Ordering::SeqCst)
    }
}

impl Navigator for RecordingNavigator {
    fn redirect_to_not_found(&self) {
        self.redirects.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn signed_in_session() -> SessionData {
    SessionData {
        access_token: "T1".to_string(),
        refresh_token: Some("R1".to_string()),
        identity_id: "did:plc:alice".to_string(),
        display_handle: "alice.test".to_string(),
        active: true,
    }
}

/// REST adapter wired to a coordinator, invalidator and executor, signed in
/// with access token `T1` and refresh token `R1`.
pub struct Fixture {
    _dir: tempfile::TempDir,
    pub cache: Arc<CacheManager>,
    pub transport: Arc<MockTransport>,
    pub adapter: Arc<RestSessionAdapter>,
    pub observer: Arc<RecordingObserver>,
    pub invalidator: Arc<SessionInvalidator>,
    pub coordinator: Arc<RefreshCoordinator>,
    pub executor: Arc<RequestExecutor>,
}

impl Fixture {
    /// A call thunk that GETs `https://api.test{path}` with the token it is given.
    pub fn call(
        &self,
        path: &str,
    ) -> impl Fn(Option<String>) -> BoxFuture<'static, Result<ApiResponse, ApiError>> {
        let transport = Arc::clone(&self.transport);
        let url = format!("https://api.test{}", path);
        move |token| {
            let transport = Arc::clone(&transport);
            let request = ApiRequest::get(url.clone()).bearer(token);
            Box::pin(async move { transport.send(request).await })
        }
    }
}

pub fn fixture(
    handler: impl Fn(&ApiRequest) -> Result<ApiResponse, ApiError> + Send + Sync + 'static,
) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let cache = Arc::new(CacheManager::new(dir.path().join("cache")).unwrap());
    let transport = Arc::new(MockTransport::new(handler));
    let adapter = Arc::new(RestSessionAdapter::new("https://auth.test", transport.clone()));
    adapter.set_session(signed_in_session());
    cache.save_session_snapshot(&signed_in_session()).unwrap();

    let observer = Arc::new(RecordingObserver::default());
    let invalidator = Arc::new(SessionInvalidator::new(
        adapter.clone(),
        cache.clone(),
        observer.clone(),
    ));
    let coordinator = Arc::new(RefreshCoordinator::new(
        adapter.clone(),
        cache.clone(),
        observer.clone(),
        invalidator.clone(),
    ));
    let executor = Arc::new(RequestExecutor::new(
        adapter.clone(),
        coordinator.clone(),
        invalidator.clone(),
    ));

    Fixture {
        _dir: dir,
        cache,
        transport,
        adapter,
        observer,
        invalidator,
        coordinator,
        executor,
    }
}
