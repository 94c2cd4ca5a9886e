//! Snapshot Cache Contract
//!
//! Cross-instance coordination for the profile snapshot: a versioned
//! payload plus a refresh lock. The production adapter lives in the
//! infrastructure layer (Redis); the in-memory and no-op variants here
//! serve single-node deployments and tests. Variants are selected at
//! composition time.
//!
//! Every operation is total: an unreachable backing store degrades to a
//! miss and must never fail the caller.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::value_objects::FaceProfileSnapshot;

/// Distributed snapshot payload + refresh lock.
#[async_trait]
pub trait SnapshotCache: Send + Sync {
    /// Best-effort read of the cached snapshot. Returns the version and
    /// payload, or `None` on miss or backing-store failure.
    async fn try_get(&self) -> Option<(u64, Vec<FaceProfileSnapshot>)>;

    /// Writes the payload and bumps the version. Returns the new version,
    /// or 0 on backing-store failure.
    async fn set(&self, snapshots: &[FaceProfileSnapshot]) -> u64;

    /// Bumps the version and shortens the payload's remaining lifetime so
    /// other instances re-read soon.
    async fn invalidate(&self);

    /// Set-if-absent acquisition of the refresh lock. Returns the lock
    /// token when acquired.
    async fn try_acquire_lock(&self) -> Option<String>;

    /// Releases the refresh lock, but only if `token` still owns it.
    async fn release_lock(&self, token: &str);
}

/// Cache variant used when coordination is disabled: always misses,
/// always grants the lock.
pub struct NoopSnapshotCache;

#[async_trait]
impl SnapshotCache for NoopSnapshotCache {
    async fn try_get(&self) -> Option<(u64, Vec<FaceProfileSnapshot>)> {
        None
    }

    async fn set(&self, _snapshots: &[FaceProfileSnapshot]) -> u64 {
        0
    }

    async fn invalidate(&self) {}

    async fn try_acquire_lock(&self) -> Option<String> {
        Some(Uuid::new_v4().to_string())
    }

    async fn release_lock(&self, _token: &str) {}
}

struct InMemoryState {
    payload: Option<(u64, Vec<FaceProfileSnapshot>, Instant)>,
    version: u64,
    lock: Option<(String, Instant)>,
}

/// Process-local cache variant with the same TTL/lock semantics as the
/// distributed adapter. Lets two refreshers coordinate in tests.
pub struct InMemorySnapshotCache {
    state: Mutex<InMemoryState>,
    payload_ttl: Duration,
    lock_ttl: Duration,
}

impl InMemorySnapshotCache {
    pub fn new(payload_ttl: Duration, lock_ttl: Duration) -> Self {
        Self {
            state: Mutex::new(InMemoryState {
                payload: None,
                version: 0,
                lock: None,
            }),
            payload_ttl,
            lock_ttl,
        }
    }
}

impl Default for InMemorySnapshotCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(180), Duration::from_secs(20))
    }
}

#[async_trait]
impl SnapshotCache for InMemorySnapshotCache {
    async fn try_get(&self) -> Option<(u64, Vec<FaceProfileSnapshot>)> {
        let Ok(state) = self.state.lock() else {
            return None;
        };
        match &state.payload {
            Some((version, snapshots, written_at))
                if written_at.elapsed() < self.payload_ttl =>
            {
                Some((*version, snapshots.clone()))
            }
            _ => None,
        }
    }

    async fn set(&self, snapshots: &[FaceProfileSnapshot]) -> u64 {
        let Ok(mut state) = self.state.lock() else {
            return 0;
        };
        state.version += 1;
        let version = state.version;
        state.payload = Some((version, snapshots.to_vec(), Instant::now()));
        version
    }

    async fn invalidate(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.version += 1;
            state.payload = None;
        }
    }

    async fn try_acquire_lock(&self) -> Option<String> {
        let Ok(mut state) = self.state.lock() else {
            return None;
        };
        if let Some((_, acquired_at)) = &state.lock {
            if acquired_at.elapsed() < self.lock_ttl {
                return None;
            }
        }
        let token = Uuid::new_v4().to_string();
        state.lock = Some((token.clone(), Instant::now()));
        Some(token)
    }

    async fn release_lock(&self, token: &str) {
        if let Ok(mut state) = self.state.lock() {
            if let Some((held, _)) = &state.lock {
                if held == token {
                    state.lock = None;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn snapshot() -> FaceProfileSnapshot {
        FaceProfileSnapshot::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            "Test".to_string(),
            false,
            Utc::now(),
            vec![vec![0.1; 128]],
        )
    }

    #[tokio::test]
    async fn noop_cache_always_misses_and_grants_lock() {
        let cache = NoopSnapshotCache;
        assert!(cache.try_get().await.is_none());
        assert_eq!(cache.set(&[snapshot()]).await, 0);
        assert!(cache.try_acquire_lock().await.is_some());
    }

    #[tokio::test]
    async fn in_memory_set_bumps_version_and_is_readable() {
        let cache = InMemorySnapshotCache::default();
        assert!(cache.try_get().await.is_none());

        let v1 = cache.set(&[snapshot()]).await;
        assert_eq!(v1, 1);

        let (version, snapshots) = cache.try_get().await.unwrap();
        assert_eq!(version, 1);
        assert_eq!(snapshots.len(), 1);

        let v2 = cache.set(&[snapshot(), snapshot()]).await;
        assert_eq!(v2, 2);
    }

    #[tokio::test]
    async fn invalidate_drops_payload_but_keeps_advancing_version() {
        let cache = InMemorySnapshotCache::default();
        cache.set(&[snapshot()]).await;
        cache.invalidate().await;
        assert!(cache.try_get().await.is_none());
        assert_eq!(cache.set(&[snapshot()]).await, 3);
    }

    #[tokio::test]
    async fn lock_is_exclusive_until_released() {
        let cache = InMemorySnapshotCache::default();
        let token = cache.try_acquire_lock().await.unwrap();
        assert!(cache.try_acquire_lock().await.is_none());

        cache.release_lock("wrong-token").await;
        assert!(cache.try_acquire_lock().await.is_none());

        cache.release_lock(&token).await;
        assert!(cache.try_acquire_lock().await.is_some());
    }

    #[tokio::test]
    async fn expired_lock_can_be_reacquired() {
        let cache = InMemorySnapshotCache::new(Duration::from_secs(180), Duration::ZERO);
        let _token = cache.try_acquire_lock().await.unwrap();
        assert!(cache.try_acquire_lock().await.is_some());
    }

    #[tokio::test]
    async fn expired_payload_reads_as_miss() {
        let cache = InMemorySnapshotCache::new(Duration::ZERO, Duration::from_secs(20));
        cache.set(&[snapshot()]).await;
        assert!(cache.try_get().await.is_none());
    }
}
