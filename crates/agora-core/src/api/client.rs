//! Bearer-token REST adapter for the governance API.
//!
//! `RestSessionAdapter` owns the session and knows how to sign in and refresh
//! against the auth endpoints. `RestClient` issues typed calls through the
//! shared `RequestExecutor`, so every call gets the same expiry handling.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::auth::{SessionAdapter, SessionStore};
use crate::models::{NewTokens, ProfileSnapshot, SessionData};

use super::error::ApiError;
use super::executor::{Outcome, RequestExecutor};
use super::transport::{ApiRequest, ApiResponse, Payload, Transport};

const LOGIN_PATH: &str = "/auth/login";
const REFRESH_PATH: &str = "/auth/refresh";

/// Decode a 2xx body that must hold data (auth endpoints never redirect).
fn expect_data<T: DeserializeOwned>(response: ApiResponse, what: &str) -> Result<T, ApiError> {
    let status = response.status;
    match response.into_payload()? {
        Payload::Data(data) => serde_json::from_value(data)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse {}: {}", what, e))),
        Payload::NotFound(body) => Err(ApiError::Rejected { status, body }),
    }
}

pub struct RestSessionAdapter {
    auth_base_url: String,
    transport: Arc<dyn Transport>,
    store: SessionStore,
}

impl RestSessionAdapter {
    pub fn new(auth_base_url: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        Self {
            auth_base_url: auth_base_url.into().trim_end_matches('/').to_string(),
            transport,
            store: SessionStore::new(),
        }
    }

    /// Exchange an identifier and password for a new session. The session is
    /// returned, not installed; see `SessionContext::establish`.
    pub async fn login(&self, identifier: &str, password: &str) -> Result<SessionData, ApiError> {
        let url = format!("{}{}", self.auth_base_url, LOGIN_PATH);
        let request = ApiRequest::post(url, json!({ "identifier": identifier, "password": password }));
        let response = self.transport.send(request).await?;
        let tokens: NewTokens = expect_data(response, "login response")?;
        Ok(tokens.into_session())
    }
}

#[async_trait]
impl SessionAdapter for RestSessionAdapter {
    fn session(&self) -> Option<SessionData> {
        self.store.get()
    }

    fn set_session(&self, session: SessionData) {
        self.store.set(session);
    }

    fn clear_session(&self) {
        self.store.clear();
    }

    async fn refresh(&self) -> Result<NewTokens, ApiError> {
        let refresh_token = self.store.refresh_token().ok_or(ApiError::Unauthenticated)?;
        let url = format!("{}{}", self.auth_base_url, REFRESH_PATH);
        let request = ApiRequest::post(url, json!({ "refreshToken": refresh_token }))
            .bearer(Some(refresh_token));

        let response = self.transport.send(request).await?;
        expect_data(response, "refresh response")
    }

    fn access_token(&self) -> Option<String> {
        self.store.access_token()
    }

    fn refresh_token(&self) -> Option<String> {
        self.store.refresh_token()
    }
}

/// Typed calls against the governance REST API.
/// Clone is cheap - everything behind it is shared.
#[derive(Clone)]
pub struct RestClient {
    base_url: String,
    transport: Arc<dyn Transport>,
    executor: Arc<RequestExecutor>,
}

impl RestClient {
    pub fn new(
        base_url: impl Into<String>,
        transport: Arc<dyn Transport>,
        executor: Arc<RequestExecutor>,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            transport,
            executor,
        }
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    /// Send an authenticated request and return the raw payload.
    pub async fn send(&self, request: ApiRequest) -> Result<Outcome<Value>, ApiError> {
        debug!(method = %request.method, url = %request.url, "Authenticated call");
        self.executor
            .execute(|token| {
                let request = request.clone().bearer(token);
                let transport = Arc::clone(&self.transport);
                async move { transport.send(request).await }
            })
            .await
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<Outcome<T>, ApiError> {
        let outcome = self.send(ApiRequest::get(self.url(path))).await?;
        decode(outcome, path)
    }

    pub async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Outcome<T>, ApiError> {
        let body = serde_json::to_value(body)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to encode body: {}", e)))?;
        let outcome = self.send(ApiRequest::post(self.url(path), body)).await?;
        decode(outcome, path)
    }

    /// Fetch the profile of an identity.
    pub async fn fetch_profile(&self, identity_id: &str) -> Result<Outcome<ProfileSnapshot>, ApiError> {
        self.get(&format!("/profiles/{}", identity_id)).await
    }
}

fn decode<T: DeserializeOwned>(outcome: Outcome<Value>, path: &str) -> Result<Outcome<T>, ApiError> {
    match outcome {
        Outcome::Data(data) => serde_json::from_value(data)
            .map(Outcome::Data)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse response from {}: {}", path, e))),
        Outcome::Redirect(target) => Ok(Outcome::Redirect(target)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{fixture, is_refresh, MockTransport};
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Proposal {
        id: u32,
        title: String,
    }

    #[tokio::test]
    async fn test_login_builds_session() {
        let transport = Arc::new(MockTransport::new(|req| {
            assert!(req.url.ends_with(LOGIN_PATH));
            assert_eq!(req.body.as_ref().unwrap()["identifier"], "alice.test");
            Ok(ApiResponse::ok(json!({
                "code": 200,
                "data": {"accessJwt": "T1", "refreshJwt": "R1", "did": "did:plc:alice", "handle": "alice.test"}
            })))
        }));
        let adapter = RestSessionAdapter::new("https://auth.test/", transport);

        let session = adapter.login("alice.test", "hunter2").await.unwrap();

        assert_eq!(session.access_token, "T1");
        assert_eq!(session.refresh_token.as_deref(), Some("R1"));
        assert_eq!(session.identity_id, "did:plc:alice");
        assert!(adapter.session().is_none());
    }

    #[tokio::test]
    async fn test_refresh_sends_refresh_token() {
        let fx = fixture(|req| {
            assert!(is_refresh(req));
            assert_eq!(req.bearer.as_deref(), Some("R1"));
            Ok(ApiResponse::ok(json!({"accessJwt": "T2"})))
        });

        let tokens = fx.adapter.refresh().await.unwrap();
        assert_eq!(tokens.access_jwt, "T2");
    }

    #[tokio::test]
    async fn test_refresh_without_refresh_token() {
        let transport = Arc::new(MockTransport::new(|_| unreachable!("nothing to send")));
        let adapter = RestSessionAdapter::new("https://auth.test", transport);
        assert_eq!(adapter.refresh().await, Err(ApiError::Unauthenticated));
    }

    #[tokio::test]
    async fn test_get_decodes_typed_data() {
        let fx = fixture(|req| {
            assert_eq!(req.bearer.as_deref(), Some("T1"));
            assert_eq!(req.url, "https://api.test/proposals/7");
            Ok(ApiResponse::ok(json!({"code": 200, "data": {"id": 7, "title": "Fund the park"}})))
        });
        let client = RestClient::new("https://api.test/", fx.transport.clone(), fx.executor.clone());

        let outcome: Outcome<Proposal> = client.get("proposals/7").await.unwrap();
        assert_eq!(
            outcome,
            Outcome::Data(Proposal {
                id: 7,
                title: "Fund the park".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_get_passes_redirect_through() {
        let fx = fixture(|_| Ok(ApiResponse::ok(json!({"code": 404, "error": "NotFound"}))));
        let client = RestClient::new("https://api.test", fx.transport.clone(), fx.executor.clone());

        let outcome: Outcome<Proposal> = client.get("/proposals/404").await.unwrap();
        assert_eq!(outcome, Outcome::Redirect(crate::api::Redirect::NotFound));
    }
}
