use serde_json::Value;
use thiserror::Error;

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Message fragments that mean the access token has expired.
const EXPIRED_MARKERS: &[&str] = &["token has expired", "expired token", "jwt expired", "token expired"];

/// Message fragments that mean the token could not be parsed or verified.
const MALFORMED_MARKERS: &[&str] = &["badjwt", "bad token", "jwt malformed", "malformed token", "invalid token"];

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: ErrorBody },

    #[error("Request rejected (HTTP {status}): {body}")]
    Rejected { status: u16, body: ErrorBody },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Session expired - sign in again")]
    SessionExpired,

    #[error("Not authenticated")]
    Unauthenticated,

    #[error("Token refresh was abandoned before it completed")]
    RefreshAbandoned,
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => ApiError::Status {
                status: status.as_u16(),
                body: ErrorBody::default(),
            },
            None => ApiError::Network(err.to_string()),
        }
    }
}

impl ApiError {
    pub fn from_status(status: u16, body: &str) -> Self {
        ApiError::Status {
            status,
            body: ErrorBody::parse(body),
        }
    }

    /// Transport status and parsed body, for failures that carry them.
    fn parts(&self) -> Option<(u16, &ErrorBody)> {
        match self {
            ApiError::Status { status, body } | ApiError::Rejected { status, body } => {
                Some((*status, body))
            }
            _ => None,
        }
    }

    /// True for the terminal error that requires signing in again.
    pub fn is_session_expired(&self) -> bool {
        matches!(self, ApiError::SessionExpired)
    }
}

/// The parts of an error body the classifier looks at.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ErrorBody {
    pub code: Option<i64>,
    pub error: Option<String>,
    pub message: Option<String>,
}

impl ErrorBody {
    /// Parse a raw response body. Non-JSON bodies are kept, truncated, as the message.
    pub fn parse(text: &str) -> Self {
        match serde_json::from_str::<Value>(text) {
            Ok(value) if value.is_object() => Self::from_value(&value),
            _ if text.trim().is_empty() => Self::default(),
            _ => Self {
                message: Some(truncate_body(text)),
                ..Self::default()
            },
        }
    }

    pub fn from_value(value: &Value) -> Self {
        Self {
            code: value.get("code").and_then(Value::as_i64),
            error: value.get("error").and_then(Value::as_str).map(str::to_string),
            message: value.get("message").and_then(Value::as_str).map(str::to_string),
        }
    }

    fn error_is(&self, tag: &str) -> bool {
        self.error.as_deref() == Some(tag)
    }

    fn message_contains_any(&self, markers: &[&str]) -> bool {
        self.message
            .as_deref()
            .map(|m| {
                let m = m.to_lowercase();
                markers.iter().any(|marker| m.contains(marker))
            })
            .unwrap_or(false)
    }
}

impl std::fmt::Display for ErrorBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut parts = Vec::new();
        if let Some(code) = self.code {
            parts.push(format!("code {}", code));
        }
        if let Some(ref error) = self.error {
            parts.push(error.clone());
        }
        if let Some(ref message) = self.message {
            parts.push(message.clone());
        }
        if parts.is_empty() {
            write!(f, "(no details)")
        } else {
            write!(f, "{}", parts.join(": "))
        }
    }
}

/// Truncate a response body to avoid logging excessive data
fn truncate_body(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY_LENGTH {
        body.to_string()
    } else {
        let mut end = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
    }
}

// ============================================================================
// Classification
// ============================================================================

/// What a failed call means for the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The access token is no longer accepted; a refresh may recover.
    AccessExpired,
    /// The refresh token itself is dead; the session must be torn down.
    RefreshExpired,
    /// Anything else. Never refreshed, never retried.
    Other,
}

/// Classify a failed call.
///
/// Refresh calls use a broader rule than normal calls: a 400 or any token error
/// tag on a refresh is terminal, while a plain 401 on a normal call only ever
/// means the access token expired.
pub fn classify(failure: &ApiError, is_refresh_call: bool) -> FailureKind {
    let Some((status, body)) = failure.parts() else {
        return FailureKind::Other;
    };

    if is_refresh_call {
        let terminal = matches!(status, 400 | 401)
            || body.error_is("BadJwt")
            || body.error_is("ExpiredToken")
            || body.error_is("InvalidRequest")
            || body.message_contains_any(EXPIRED_MARKERS)
            || body.message_contains_any(MALFORMED_MARKERS);
        return if terminal {
            FailureKind::RefreshExpired
        } else {
            FailureKind::Other
        };
    }

    let expired = status == 401
        || body.code == Some(401)
        || body.error_is("ExpiredToken")
        || (body.error_is("InvalidRequest") && body.message_contains_any(MALFORMED_MARKERS))
        || body.message_contains_any(EXPIRED_MARKERS);
    if expired {
        FailureKind::AccessExpired
    } else {
        FailureKind::Other
    }
}
