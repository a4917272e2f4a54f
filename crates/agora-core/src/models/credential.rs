use serde::{Deserialize, Serialize};

/// Long-lived identity created at sign-in or import and destroyed at logout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
#[serde(rename_all = "camelCase")]
pub struct CredentialBundle {
    pub identity_id: String,
    pub external_address: String,
    pub signing_key: String,
}

impl std::fmt::Display for CredentialBundle {
    // The signing key stays out of logs and error messages.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.identity_id, self.external_address)
    }
}
