//! Snapshot Refresher
//!
//! Background task that keeps the in-process profile snapshot fresh.
//! One instance per process; instances elect a leader per refresh cycle
//! through the distributed cache lock. The leader loads from the profile
//! store and publishes; followers install the leader's payload. A
//! follower that cannot observe a payload while its local snapshot is
//! past the staleness bound may perform an emergency database refresh.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use metrics::{counter, histogram};
use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::application::services::{
    EventBus, FaceProfileSnapshotStore, ProfileLoader, SnapshotCache,
};
use crate::domain::events::{DomainEvent, SnapshotRefreshedEvent};

/// Delay before a follower's single re-read of the distributed cache.
const FOLLOWER_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Configuration for the profile snapshot cache.
#[derive(Debug, Clone)]
pub struct ProfileCacheConfig {
    /// Base interval between refresh cycles.
    pub refresh_interval: Duration,
    /// Jitter applied to the interval, as a fraction in [0, 0.5].
    pub jitter_percent: f64,
    /// Per-attempt timeout for the profile store load.
    pub refresh_timeout: Duration,
    /// Local snapshot age past which a follower may load the database.
    pub max_staleness: Duration,
    /// TTL of the distributed payload.
    pub distributed_ttl: Duration,
    /// TTL of the distributed refresh lock.
    pub lock_ttl: Duration,
    /// Try the distributed cache before the first database load.
    pub prefer_distributed_on_startup: bool,
    /// Allow the emergency database refresh for stale followers.
    pub allow_emergency_db_refresh: bool,
}

impl Default for ProfileCacheConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(60),
            jitter_percent: 0.2,
            refresh_timeout: Duration::from_secs(20),
            max_staleness: Duration::from_secs(300),
            distributed_ttl: Duration::from_secs(180),
            lock_ttl: Duration::from_secs(20),
            prefer_distributed_on_startup: true,
            allow_emergency_db_refresh: true,
        }
    }
}

/// Background refresher coordinating snapshot publication.
pub struct SnapshotRefresher {
    store: Arc<FaceProfileSnapshotStore>,
    cache: Arc<dyn SnapshotCache>,
    loader: Arc<ProfileLoader>,
    event_bus: Arc<EventBus>,
    config: ProfileCacheConfig,
}

impl SnapshotRefresher {
    /// Creates a new refresher.
    pub fn new(
        store: Arc<FaceProfileSnapshotStore>,
        cache: Arc<dyn SnapshotCache>,
        loader: Arc<ProfileLoader>,
        event_bus: Arc<EventBus>,
        config: ProfileCacheConfig,
    ) -> Self {
        Self {
            store,
            cache,
            loader,
            event_bus,
            config,
        }
    }

    /// Runs the refresh loop until cancelled.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        info!("Snapshot refresher started");

        if self.config.prefer_distributed_on_startup {
            if !self.install_from_cache().await {
                self.refresh_once().await;
            }
        } else {
            self.refresh_once().await;
        }

        loop {
            let wait = self.jittered_interval();
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(wait) => {},
                _ = self.store.wait_refresh_request() => {
                    debug!("Refresh requested out of band");
                }
            }
            if cancel.is_cancelled() {
                break;
            }
            self.store.take_refresh_request();
            self.refresh_once().await;
        }

        info!("Snapshot refresher stopped");
    }

    /// Base interval with ±jitter applied.
    fn jittered_interval(&self) -> Duration {
        let jitter = self.config.jitter_percent.clamp(0.0, 0.5);
        if jitter == 0.0 {
            return self.config.refresh_interval;
        }
        let factor = 1.0 + rand::thread_rng().gen_range(-jitter..=jitter);
        self.config.refresh_interval.mul_f64(factor)
    }

    /// One refresh cycle. Concurrent attempts are dropped by the
    /// in-process guard.
    pub async fn refresh_once(&self) {
        if !self.store.begin_refresh() {
            debug!("Refresh already in flight, dropping attempt");
            return;
        }
        self.refresh_cycle().await;
        self.store.end_refresh();
    }

    async fn refresh_cycle(&self) {
        // Leader path: the lock holder loads the database for the cluster.
        if let Some(token) = self.cache.try_acquire_lock().await {
            self.refresh_from_database("database").await;
            self.cache.release_lock(&token).await;
            return;
        }

        // Follower path: install the leader's payload.
        if self.install_from_cache().await {
            return;
        }
        tokio::time::sleep(FOLLOWER_RETRY_DELAY).await;
        if self.install_from_cache().await {
            return;
        }

        // A snapshot that never loaded counts as infinitely stale.
        let stale = match self.store.age() {
            None => true,
            Some(age) => age.to_std().unwrap_or(Duration::ZERO) > self.config.max_staleness,
        };

        if stale && self.config.allow_emergency_db_refresh {
            warn!("Distributed payload missing and snapshot stale, forcing database refresh");
            self.refresh_from_database("database_emergency").await;
        } else {
            counter!(
                "face_snapshot_refresh_total",
                "source" => "distributed",
                "result" => "miss"
            )
            .increment(1);
        }
    }

    /// Loads the profile store and publishes locally and to the
    /// distributed cache.
    async fn refresh_from_database(&self, source: &'static str) {
        let started = Instant::now();

        let loaded = tokio::time::timeout(self.config.refresh_timeout, self.loader.load()).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        let snapshots = match loaded {
            Err(_) => {
                warn!(source, "Profile load timed out");
                self.store.update_failure("profile load timed out", duration_ms);
                self.report(source, "timeout", duration_ms);
                return;
            }
            Ok(Err(e)) => {
                warn!(source, "Profile load failed: {}", e);
                self.store.update_failure(&e.to_string(), duration_ms);
                self.report(source, "error", duration_ms);
                return;
            }
            Ok(Ok(snapshots)) => snapshots,
        };

        let mut version = self.cache.set(&snapshots).await;
        if version == 0 {
            // Distributed cache unavailable; advance the local version so
            // publication stays monotonic.
            version = self.store.version() + 1;
        }

        let profile_count = snapshots.len();
        if self.store.update_success(snapshots, duration_ms, version) {
            info!(source, version, profile_count, duration_ms, "Snapshot refreshed");
            self.event_bus
                .publish(DomainEvent::SnapshotRefreshed(SnapshotRefreshedEvent {
                    version,
                    profile_count,
                    source: source.to_string(),
                    duration_ms,
                    timestamp: Utc::now(),
                }));
            self.report(source, "success", duration_ms);
        } else {
            self.report(source, "stale", duration_ms);
        }
    }

    /// Attempts to install the distributed payload. Returns whether a
    /// payload was found.
    async fn install_from_cache(&self) -> bool {
        let started = Instant::now();
        let Some((version, snapshots)) = self.cache.try_get().await else {
            return false;
        };
        let duration_ms = started.elapsed().as_millis() as u64;

        let profile_count = snapshots.len();
        if self.store.update_success(snapshots, duration_ms, version) {
            info!(version, profile_count, "Snapshot installed from distributed cache");
            self.event_bus
                .publish(DomainEvent::SnapshotRefreshed(SnapshotRefreshedEvent {
                    version,
                    profile_count,
                    source: "distributed".to_string(),
                    duration_ms,
                    timestamp: Utc::now(),
                }));
            self.report("distributed", "success", duration_ms);
        } else {
            // Already at (or past) this version; the cycle still counts.
            self.report("distributed", "noop", duration_ms);
        }
        true
    }

    fn report(&self, source: &'static str, result: &'static str, duration_ms: u64) {
        counter!(
            "face_snapshot_refresh_total",
            "source" => source,
            "result" => result
        )
        .increment(1);
        histogram!("face_snapshot_refresh_duration_ms", "source" => source)
            .record(duration_ms as f64);
    }
}
