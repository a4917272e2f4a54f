use serde::{Deserialize, Serialize};

/// The signed-in session: token pair plus identity metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
#[serde(rename_all = "camelCase")]
pub struct SessionData {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub identity_id: String,
    pub display_handle: String,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl SessionData {
    /// Apply a successful refresh in place.
    ///
    /// A refresh that does not rotate the refresh token keeps the old one, and
    /// identity fields are only overwritten when the service returned them.
    pub fn apply(&mut self, tokens: &NewTokens) {
        self.access_token = tokens.access_jwt.clone();
        if let Some(ref refresh) = tokens.refresh_jwt {
            self.refresh_token = Some(refresh.clone());
        }
        if let Some(ref did) = tokens.did {
            self.identity_id = did.clone();
        }
        if let Some(ref handle) = tokens.handle {
            self.display_handle = handle.clone();
        }
        if let Some(active) = tokens.active {
            self.active = active;
        }
    }
}

/// Tokens minted by a refresh (or sign-in) call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTokens {
    pub access_jwt: String,
    #[serde(default)]
    pub refresh_jwt: Option<String>,
    #[serde(default)]
    pub did: Option<String>,
    #[serde(default)]
    pub handle: Option<String>,
    #[serde(default)]
    pub active: Option<bool>,
}

impl NewTokens {
    /// Build a full session from a sign-in response.
    pub fn into_session(self) -> SessionData {
        SessionData {
            access_token: self.access_jwt,
            refresh_token: self.refresh_jwt,
            identity_id: self.did.unwrap_or_default(),
            display_handle: self.handle.unwrap_or_default(),
            active: self.active.unwrap_or(true),
        }
    }
}
