use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, warn};

use crate::models::{CredentialBundle, ProfileSnapshot, SessionData};

/// Session and profile snapshots are dropped 24 hours after they were written.
pub const SNAPSHOT_TTL_HOURS: i64 = 24;

const CREDENTIAL_BUNDLE: &str = "credential_bundle";
const SESSION_SNAPSHOT: &str = "session";
const PROFILE_SNAPSHOT: &str = "profile";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedData<T> {
    pub data: T,
    pub cached_at: DateTime<Utc>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl<T> CachedData<T> {
    pub fn new(data: T) -> Self {
        Self {
            data,
            cached_at: Utc::now(),
            expires_at: None,
        }
    }

    pub fn expiring_in(data: T, ttl: Duration) -> Self {
        let cached_at = Utc::now();
        Self {
            data,
            cached_at,
            expires_at: Some(cached_at + ttl),
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at.map(|at| Utc::now() >= at).unwrap_or(false)
    }
}

/// Durable key-value storage for the credential bundle and the cached
/// session/profile snapshots. One JSON file per entry.
pub struct CacheManager {
    cache_dir: PathBuf,
}

impl CacheManager {
    pub fn new(cache_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&cache_dir)
            .with_context(|| format!("Failed to create cache directory: {}", cache_dir.display()))?;
        Ok(Self { cache_dir })
    }

    pub fn dir(&self) -> &Path {
        &self.cache_dir
    }

    fn cache_path(&self, name: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.json", name))
    }

    fn load<T: DeserializeOwned>(&self, name: &str) -> Result<Option<CachedData<T>>> {
        let path = self.cache_path(name);
        if !path.exists() {
            return Ok(None);
        }

        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read cache file: {}", name))?;

        let cached: CachedData<T> = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse cache file: {}", name))?;

        if cached.is_expired() {
            debug!(cache = name, "Cache entry expired");
            return Ok(None);
        }

        Ok(Some(cached))
    }

    fn save<T: Serialize>(&self, name: &str, cached: &CachedData<T>) -> Result<()> {
        let path = self.cache_path(name);
        let contents = serde_json::to_string_pretty(cached)?;
        std::fs::write(&path, contents)
            .with_context(|| format!("Failed to write cache file: {}", name))?;
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<()> {
        match std::fs::remove_file(self.cache_path(name)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to remove cache file: {}", name)),
        }
    }

    // ===== Credential Bundle =====

    pub fn load_credential_bundle(&self) -> Result<Option<CredentialBundle>> {
        Ok(self.load(CREDENTIAL_BUNDLE)?.map(|c| c.data))
    }

    pub fn save_credential_bundle(&self, bundle: &CredentialBundle) -> Result<()> {
        self.save(CREDENTIAL_BUNDLE, &CachedData::new(bundle))
    }

    pub fn remove_credential_bundle(&self) -> Result<()> {
        self.remove(CREDENTIAL_BUNDLE)
    }

    // ===== Session Snapshot =====

    pub fn load_session_snapshot(&self) -> Result<Option<SessionData>> {
        Ok(self.load(SESSION_SNAPSHOT)?.map(|c| c.data))
    }

    pub fn save_session_snapshot(&self, session: &SessionData) -> Result<()> {
        let cached = CachedData::expiring_in(session, Duration::hours(SNAPSHOT_TTL_HOURS));
        self.save(SESSION_SNAPSHOT, &cached)
    }

    pub fn remove_session_snapshot(&self) -> Result<()> {
        self.remove(SESSION_SNAPSHOT)
    }

    /// Snapshot for session restore. Unreadable entries count as absent.
    pub fn restore_session_snapshot(&self) -> Option<SessionData> {
        match self.load_session_snapshot() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "Ignoring unreadable session snapshot");
                None
            }
        }
    }

    // ===== Profile Snapshot =====

    pub fn load_profile_snapshot(&self) -> Result<Option<ProfileSnapshot>> {
        Ok(self.load(PROFILE_SNAPSHOT)?.map(|c| c.data))
    }

    pub fn save_profile_snapshot(&self, profile: &ProfileSnapshot) -> Result<()> {
        let cached = CachedData::expiring_in(profile, Duration::hours(SNAPSHOT_TTL_HOURS));
        self.save(PROFILE_SNAPSHOT, &cached)
    }

    pub fn remove_profile_snapshot(&self) -> Result<()> {
        self.remove(PROFILE_SNAPSHOT)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> (tempfile::TempDir, CacheManager) {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheManager::new(dir.path().join("cache")).unwrap();
        (dir, cache)
    }

    fn session() -> SessionData {
        SessionData {
            access_token: "T1".to_string(),
            refresh_token: Some("R1".to_string()),
            identity_id: "did:plc:alice".to_string(),
            display_handle: "alice.test".to_string(),
            active: true,
        }
    }

    #[test]
    fn test_cached_data_expiry() {
        let fresh = CachedData::expiring_in(1, Duration::hours(SNAPSHOT_TTL_HOURS));
        assert!(!fresh.is_expired());

        let mut old = CachedData::expiring_in(1, Duration::hours(SNAPSHOT_TTL_HOURS));
        old.expires_at = Some(Utc::now() - Duration::minutes(1));
        assert!(old.is_expired());

        assert!(!CachedData::new(1).is_expired());
    }

    #[test]
    fn test_session_snapshot_round_trip_and_remove() {
        let (_dir, cache) = manager();
        cache.save_session_snapshot(&session()).unwrap();
        assert_eq!(cache.load_session_snapshot().unwrap(), Some(session()));

        cache.remove_session_snapshot().unwrap();
        assert_eq!(cache.load_session_snapshot().unwrap(), None);
        cache.remove_session_snapshot().unwrap();
    }

    #[test]
    fn test_expired_snapshot_reads_as_absent() {
        let (_dir, cache) = manager();
        let mut cached = CachedData::expiring_in(session(), Duration::hours(SNAPSHOT_TTL_HOURS));
        cached.cached_at = Utc::now() - Duration::hours(25);
        cached.expires_at = Some(Utc::now() - Duration::hours(1));
        cache.save(SESSION_SNAPSHOT, &cached).unwrap();

        assert_eq!(cache.load_session_snapshot().unwrap(), None);
    }

    #[test]
    fn test_credential_bundle_has_no_expiry() {
        let (_dir, cache) = manager();
        let bundle = CredentialBundle {
            identity_id: "did:plc:alice".to_string(),
            external_address: "0xabc".to_string(),
            signing_key: "secret".to_string(),
        };
        cache.save_credential_bundle(&bundle).unwrap();

        let raw = std::fs::read_to_string(cache.cache_path(CREDENTIAL_BUNDLE)).unwrap();
        let cached: CachedData<CredentialBundle> = serde_json::from_str(&raw).unwrap();
        assert!(cached.expires_at.is_none());
        assert_eq!(cache.load_credential_bundle().unwrap(), Some(bundle));
    }

    #[test]
    fn test_corrupt_snapshot_is_ignored_on_restore() {
        let (_dir, cache) = manager();
        std::fs::write(cache.cache_path(SESSION_SNAPSHOT), "{not json").unwrap();

        assert!(cache.load_session_snapshot().is_err());
        assert_eq!(cache.restore_session_snapshot(), None);
    }
}
