//! Identity-service agent and its session adapter.
//!
//! `XrpcAgent` mirrors the session object of an XRPC client library: it owns
//! its own session and exposes create/resume/refresh. `AgentSessionAdapter`
//! maps it onto `SessionAdapter` so calls made through the agent share the
//! same refresh coordinator as the REST client.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::auth::SessionAdapter;
use crate::models::{NewTokens, SessionData};

use super::error::ApiError;
use super::executor::{Outcome, RequestExecutor};
use super::transport::{ApiRequest, Payload, Transport};

const CREATE_SESSION: &str = "com.atproto.server.createSession";
const REFRESH_SESSION: &str = "com.atproto.server.refreshSession";

/// Session as the identity service reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AtpSession {
    pub access_jwt: String,
    pub refresh_jwt: String,
    pub did: String,
    pub handle: String,
    #[serde(default)]
    pub active: Option<bool>,
}

impl From<AtpSession> for SessionData {
    fn from(s: AtpSession) -> Self {
        SessionData {
            access_token: s.access_jwt,
            refresh_token: Some(s.refresh_jwt),
            identity_id: s.did,
            display_handle: s.handle,
            active: s.active.unwrap_or(true),
        }
    }
}

impl From<AtpSession> for NewTokens {
    fn from(s: AtpSession) -> Self {
        NewTokens {
            access_jwt: s.access_jwt,
            refresh_jwt: Some(s.refresh_jwt),
            did: Some(s.did),
            handle: Some(s.handle),
            active: s.active,
        }
    }
}

pub struct XrpcAgent {
    service: String,
    transport: Arc<dyn Transport>,
    session: RwLock<Option<AtpSession>>,
}

impl XrpcAgent {
    pub fn new(service: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        Self {
            service: service.into().trim_end_matches('/').to_string(),
            transport,
            session: RwLock::new(None),
        }
    }

    fn endpoint(&self, nsid: &str) -> String {
        format!("{}/xrpc/{}", self.service, nsid)
    }

    pub fn session(&self) -> Option<AtpSession> {
        self.session.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn resume_session(&self, session: AtpSession) {
        *self.session.write().unwrap_or_else(|e| e.into_inner()) = Some(session);
    }

    pub fn clear_session(&self) {
        *self.session.write().unwrap_or_else(|e| e.into_inner()) = None;
    }

    async fn send_for_session(&self, request: ApiRequest) -> Result<AtpSession, ApiError> {
        let response = self.transport.send(request).await?;
        let status = response.status;
        match response.into_payload()? {
            Payload::Data(data) => serde_json::from_value(data)
                .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse session: {}", e))),
            Payload::NotFound(body) => Err(ApiError::Rejected { status, body }),
        }
    }

    /// Sign in and adopt the new session.
    pub async fn create_session(&self, identifier: &str, password: &str) -> Result<AtpSession, ApiError> {
        let request = ApiRequest::post(
            self.endpoint(CREATE_SESSION),
            json!({ "identifier": identifier, "password": password }),
        );
        let session = self.send_for_session(request).await?;
        self.resume_session(session.clone());
        Ok(session)
    }

    /// Trade the refresh JWT for a new pair and adopt it, unless the session
    /// was cleared while the call was in flight.
    pub async fn refresh_session(&self) -> Result<AtpSession, ApiError> {
        let refresh_jwt = self
            .session()
            .map(|s| s.refresh_jwt)
            .ok_or(ApiError::Unauthenticated)?;
        let request = ApiRequest {
            method: reqwest::Method::POST,
            url: self.endpoint(REFRESH_SESSION),
            bearer: Some(refresh_jwt),
            body: None,
        };
        let session = self.send_for_session(request).await?;
        let mut current = self.session.write().unwrap_or_else(|e| e.into_inner());
        if current.is_some() {
            *current = Some(session.clone());
        }
        Ok(session)
    }

    /// Build a request for a procedure or query. The caller attaches the token.
    pub fn request(&self, nsid: &str, input: Option<Value>) -> ApiRequest {
        match input {
            Some(body) => ApiRequest::post(self.endpoint(nsid), body),
            None => ApiRequest::get(self.endpoint(nsid)),
        }
    }

    /// Run an XRPC call through the executor with this agent's token.
    pub async fn call(
        &self,
        executor: &RequestExecutor,
        nsid: &str,
        input: Option<Value>,
    ) -> Result<Outcome<Value>, ApiError> {
        debug!(nsid, "XRPC call");
        let request = self.request(nsid, input);
        executor
            .execute(|token| {
                let request = request.clone().bearer(token);
                let transport = Arc::clone(&self.transport);
                async move { transport.send(request).await }
            })
            .await
    }
}

/// `SessionAdapter` over an `XrpcAgent`.
pub struct AgentSessionAdapter {
    agent: Arc<XrpcAgent>,
}

impl AgentSessionAdapter {
    pub fn new(agent: Arc<XrpcAgent>) -> Self {
        Self { agent }
    }

    pub fn agent(&self) -> &Arc<XrpcAgent> {
        &self.agent
    }
}

#[async_trait]
impl SessionAdapter for AgentSessionAdapter {
    fn session(&self) -> Option<SessionData> {
        self.agent.session().map(SessionData::from)
    }

    fn set_session(&self, session: SessionData) {
        // The agent cannot hold a session without a refresh JWT.
        let Some(refresh_jwt) = session.refresh_token else {
            self.agent.clear_session();
            return;
        };
        self.agent.resume_session(AtpSession {
            access_jwt: session.access_token,
            refresh_jwt,
            did: session.identity_id,
            handle: session.display_handle,
            active: Some(session.active),
        });
    }

    fn clear_session(&self) {
        self.agent.clear_session();
    }

    async fn refresh(&self) -> Result<NewTokens, ApiError> {
        self.agent.refresh_session().await.map(NewTokens::from)
    }
}
