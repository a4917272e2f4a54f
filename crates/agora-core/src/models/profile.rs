use serde::{Deserialize, Serialize};

/// Profile of the signed-in identity, cached next to the session snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
#[serde(rename_all = "camelCase")]
pub struct ProfileSnapshot {
    pub identity_id: String,
    pub handle: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
}

impl ProfileSnapshot {
    /// Name to show in the UI: display name when set, otherwise `@handle`.
    pub fn display(&self) -> String {
        match self.display_name {
            Some(ref name) if !name.trim().is_empty() => name.clone(),
            _ => format!("@{}", self.handle),
        }
    }
}
