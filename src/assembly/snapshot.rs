//! Prefix snapshots.
//!
//! A snapshot captures the assembled prefix of a story's in-progress
//! operation so a later independent call (regenerate-this-unit) replays the
//! exact historical prefix instead of rebuilding from drifted state. The
//! store is an explicit bounded cache owned by the caller: capacity and TTL
//! bound its lifetime, and `invalidate` is the only eviction trigger beyond
//! those. A missing or version-mismatched snapshot is a cache miss, never
//! an error.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use moka::future::Cache;
use serde::{Deserialize, Serialize};

use crate::assembly::message::MessagePrefix;

/// Bumped whenever the serialized snapshot layout changes. Snapshots from
/// another version fail to load as a miss, falling through to live
/// assembly.
pub const SNAPSHOT_SCHEMA_VERSION: u32 = 2;

/// Key for one story's in-progress operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SnapshotKey {
    pub story_id: String,
}

impl SnapshotKey {
    pub fn new(story_id: impl Into<String>) -> Self {
        Self {
            story_id: story_id.into(),
        }
    }
}

/// Versioned, serializable capture of a message prefix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrefixSnapshot {
    pub schema_version: u32,
    pub story_id: String,
    /// Operation that produced the prefix.
    pub operation_id: String,
    pub created_at: DateTime<Utc>,
    pub prefix: MessagePrefix,
}

impl PrefixSnapshot {
    pub fn new(
        story_id: impl Into<String>,
        operation_id: impl Into<String>,
        prefix: MessagePrefix,
    ) -> Self {
        Self {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            story_id: story_id.into(),
            operation_id: operation_id.into(),
            created_at: Utc::now(),
            prefix,
        }
    }

    /// Serialize for persistence by the caller.
    pub fn encode(&self) -> String {
        serde_json::to_string(self).expect("snapshot serialization is infallible")
    }

    /// Decode a persisted snapshot. Schema drift and corrupt payloads both
    /// read as `None`.
    pub fn decode(json: &str) -> Option<Self> {
        let snapshot: PrefixSnapshot = match serde_json::from_str(json) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!("Discarding unreadable prefix snapshot: {}", e);
                return None;
            }
        };
        if snapshot.schema_version != SNAPSHOT_SCHEMA_VERSION {
            tracing::warn!(
                stored = snapshot.schema_version,
                current = SNAPSHOT_SCHEMA_VERSION,
                "Discarding prefix snapshot with mismatched schema version"
            );
            return None;
        }
        Some(snapshot)
    }
}

/// Bounded in-process snapshot store.
pub struct SnapshotStore {
    cache: Cache<SnapshotKey, Arc<PrefixSnapshot>>,
}

impl SnapshotStore {
    pub fn new(capacity: u64, ttl: Duration) -> Self {
        Self {
            cache: Cache::builder()
                .max_capacity(capacity)
                .time_to_live(ttl)
                .build(),
        }
    }

    /// Capture the prefix for this story's in-progress operation,
    /// replacing any previous snapshot for the story.
    pub async fn save(&self, snapshot: PrefixSnapshot) {
        let key = SnapshotKey::new(snapshot.story_id.clone());
        tracing::debug!(
            story = %snapshot.story_id,
            operation = %snapshot.operation_id,
            blocks = snapshot.prefix.blocks().len(),
            "Saved prefix snapshot"
        );
        self.cache.insert(key, Arc::new(snapshot)).await;
    }

    /// Load the snapshot for a story. `None` is a cache miss; callers fall
    /// through to live assembly.
    pub async fn load(&self, key: &SnapshotKey) -> Option<Arc<PrefixSnapshot>> {
        let snapshot = self.cache.get(key).await?;
        if snapshot.schema_version != SNAPSHOT_SCHEMA_VERSION {
            tracing::warn!(
                story = %key.story_id,
                "Prefix snapshot schema drifted; treating as miss"
            );
            return None;
        }
        Some(snapshot)
    }

    /// Seed the store from a caller-persisted snapshot.
    pub async fn restore(&self, snapshot: PrefixSnapshot) {
        self.save(snapshot).await;
    }

    /// Drop the snapshot for a story. Owned by the caller: invoked when
    /// the in-progress operation completes or is abandoned.
    pub async fn invalidate(&self, key: &SnapshotKey) {
        self.cache.invalidate(key).await;
    }
}
