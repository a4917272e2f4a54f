//! Persisted credential cache.
//!
//! This module provides the `CacheManager` for storing the long-lived
//! credential bundle and the session/profile snapshots on disk. Data is
//! stored as JSON; snapshots expire 24 hours after they are written and
//! read as absent afterwards.

pub mod manager;

pub use manager::{CacheManager, CachedData, SNAPSHOT_TTL_HOURS};
