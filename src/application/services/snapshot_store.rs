//! Face Profile Snapshot Store
//!
//! In-process holder of the current matching snapshot. Many readers, one
//! writer (the refresher): writers swap an `Arc` pointer under a short
//! lock, readers clone it and never observe a partially built snapshot.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Notify;
use tracing::debug;

use crate::domain::value_objects::FaceProfileSnapshot;

/// Shared, versioned snapshot of all enrolled face profiles.
pub struct FaceProfileSnapshotStore {
    current: RwLock<Arc<Vec<FaceProfileSnapshot>>>,
    version: AtomicU64,
    last_refresh_at: RwLock<Option<DateTime<Utc>>>,
    last_refresh_duration_ms: AtomicU64,
    last_error: RwLock<Option<String>>,
    is_refreshing: AtomicBool,
    refresh_requested: AtomicBool,
    refresh_notify: Notify,
}

impl Default for FaceProfileSnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

impl FaceProfileSnapshotStore {
    /// Creates an empty store at version 0.
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(Vec::new())),
            version: AtomicU64::new(0),
            last_refresh_at: RwLock::new(None),
            last_refresh_duration_ms: AtomicU64::new(0),
            last_error: RwLock::new(None),
            is_refreshing: AtomicBool::new(false),
            refresh_requested: AtomicBool::new(false),
            refresh_notify: Notify::new(),
        }
    }

    /// Returns the latest snapshot without blocking on the writer.
    pub fn current(&self) -> Arc<Vec<FaceProfileSnapshot>> {
        self.current
            .read()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    /// Monotonic snapshot version. 0 until the first publication.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Time since the last successful refresh, if any.
    pub fn age(&self) -> Option<Duration> {
        self.last_refresh_at
            .read()
            .ok()
            .and_then(|guard| *guard)
            .map(|at| Utc::now() - at)
    }

    pub fn last_refresh_at(&self) -> Option<DateTime<Utc>> {
        self.last_refresh_at.read().ok().and_then(|guard| *guard)
    }

    pub fn last_refresh_duration_ms(&self) -> u64 {
        self.last_refresh_duration_ms.load(Ordering::Relaxed)
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().ok().and_then(|guard| guard.clone())
    }

    /// Atomically installs a new snapshot.
    ///
    /// Installs are rejected when `version` does not advance the store,
    /// so a reader never observes a lower version after a higher one.
    /// Returns whether the snapshot was installed.
    pub fn update_success(
        &self,
        snapshots: Vec<FaceProfileSnapshot>,
        duration_ms: u64,
        version: u64,
    ) -> bool {
        let Ok(mut guard) = self.current.write() else {
            return false;
        };

        let current_version = self.version.load(Ordering::Acquire);
        if version <= current_version {
            debug!(
                version,
                current_version, "Skipping stale snapshot install"
            );
            return false;
        }

        *guard = Arc::new(snapshots);
        self.version.store(version, Ordering::Release);
        drop(guard);

        if let Ok(mut at) = self.last_refresh_at.write() {
            *at = Some(Utc::now());
        }
        self.last_refresh_duration_ms
            .store(duration_ms, Ordering::Relaxed);
        if let Ok(mut err) = self.last_error.write() {
            *err = None;
        }
        true
    }

    /// Records a refresh failure without touching the current snapshot.
    pub fn update_failure(&self, error: &str, duration_ms: u64) {
        if let Ok(mut err) = self.last_error.write() {
            *err = Some(error.to_string());
        }
        self.last_refresh_duration_ms
            .store(duration_ms, Ordering::Relaxed);
    }

    /// Requests an out-of-band refresh and wakes the refresher.
    pub fn request_refresh(&self) {
        self.refresh_requested.store(true, Ordering::Release);
        self.refresh_notify.notify_one();
    }

    /// Consumes a pending refresh request, if one was made.
    pub fn take_refresh_request(&self) -> bool {
        self.refresh_requested.swap(false, Ordering::AcqRel)
    }

    /// Resolves when a refresh request arrives.
    pub async fn wait_refresh_request(&self) {
        self.refresh_notify.notified().await;
    }

    /// Non-reentrant refresh guard. Returns `false` when a refresh is
    /// already in flight; callers that get `true` must call
    /// [`end_refresh`](Self::end_refresh).
    pub fn begin_refresh(&self) -> bool {
        self.is_refreshing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn end_refresh(&self) {
        self.is_refreshing.store(false, Ordering::Release);
    }

    pub fn is_refreshing(&self) -> bool {
        self.is_refreshing.load(Ordering::Acquire)
    }
}
