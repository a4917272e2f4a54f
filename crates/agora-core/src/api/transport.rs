//! Transport seam between the request layer and the network.
//!
//! `HttpTransport` is the production implementation over `reqwest`; tests
//! substitute a scripted transport.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, Method};
use serde_json::Value;
use tracing::debug;

use super::error::{ApiError, ErrorBody};

/// HTTP request timeout in seconds.
/// 30s allows for slow API responses while failing fast enough for good UX.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Business code a 2xx body uses to say the resource does not exist.
const BUSINESS_NOT_FOUND: i64 = 404;

/// Keys of the `{code, error, message, data}` response envelope.
const ENVELOPE_KEYS: &[&str] = &["code", "error", "message", "data"];

/// One transport round trip.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub url: String,
    pub bearer: Option<String>,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            bearer: None,
            body: None,
        }
    }

    pub fn post(url: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::POST,
            url: url.into(),
            bearer: None,
            body: Some(body),
        }
    }

    pub fn bearer(mut self, token: Option<String>) -> Self {
        self.bearer = token;
        self
    }
}

/// A response with a 2xx transport status.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

/// What a 2xx body turned out to hold.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Data(Value),
    NotFound(ErrorBody),
}

impl ApiResponse {
    pub fn ok(body: Value) -> Self {
        Self { status: 200, body }
    }

    /// Inspect the body of a successful round trip.
    ///
    /// An envelope (an object whose keys are all among `code`, `error`,
    /// `message` and `data`) may carry a business error under a 2xx status. A
    /// business 404 becomes `Payload::NotFound`; any other non-2xx code or an
    /// `error` tag becomes `ApiError::Rejected`, and `data` is unwrapped. Any
    /// other body is data as is, even if it has a `code` field of its own.
    pub fn into_payload(self) -> Result<Payload, ApiError> {
        if !is_envelope(&self.body) {
            return Ok(Payload::Data(self.body));
        }

        let body = ErrorBody::from_value(&self.body);
        if body.code == Some(BUSINESS_NOT_FOUND) {
            return Ok(Payload::NotFound(body));
        }

        let bad_code = body
            .code
            .map(|code| code != 0 && !(200..300).contains(&code))
            .unwrap_or(false);
        if bad_code || body.error.is_some() {
            return Err(ApiError::Rejected {
                status: self.status,
                body,
            });
        }

        match self.body {
            Value::Object(mut map) => match map.remove("data") {
                Some(data) => Ok(Payload::Data(data)),
                None => Ok(Payload::Data(Value::Object(map))),
            },
            other => Ok(Payload::Data(other)),
        }
    }
}

fn is_envelope(body: &Value) -> bool {
    match body {
        Value::Object(map) => {
            !map.is_empty() && map.keys().all(|key| ENVELOPE_KEYS.contains(&key.as_str()))
        }
        _ => false,
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one request. Non-2xx statuses come back as `ApiError::Status`
    /// carrying the parsed body.
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ApiError>;
}

/// Transport over reqwest.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        let mut builder = self
            .client
            .request(request.method.clone(), &request.url)
            .header(header::ACCEPT, "application/json");
        if let Some(ref token) = request.bearer {
            builder = builder.bearer_auth(token);
        }
        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let text = response.text().await?;
        debug!(method = %request.method, url = %request.url, status = status.as_u16(), "Round trip complete");

        if !status.is_success() {
            return Err(ApiError::from_status(status.as_u16(), &text));
        }

        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text)
                .map_err(|e| ApiError::InvalidResponse(format!("{} from {}", e, request.url)))?
        };

        Ok(ApiResponse {
            status: status.as_u16(),
            body,
        })
    }
}
