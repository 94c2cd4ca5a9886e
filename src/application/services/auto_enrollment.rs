//! Auto-Enrollment Service
//!
//! Grows a user's embedding set with diverse new observations without
//! degrading match precision. Candidates are rate-limited per user,
//! bounded per profile and gated on variation distance from every
//! existing embedding.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::counter;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::application::services::{EventBus, FaceProfileSnapshotStore, SnapshotCache};
use crate::domain::entities::DEFAULT_MAX_EMBEDDINGS_PER_PROFILE;
use crate::domain::events::{DomainEvent, ProfileAutoEnrolledEvent};
use crate::domain::repositories::{FaceProfileRepository, RepoResult};
use crate::domain::value_objects::FaceEmbedding;

/// Capacity of the candidate hand-off queue.
pub const AUTO_ENROLL_QUEUE_CAPACITY: usize = 64;

/// Configuration for auto-enrollment.
#[derive(Debug, Clone)]
pub struct AutoEnrollmentConfig {
    /// Minimum time between successful enrolls for one user.
    pub min_interval: Duration,
    /// Upper bound on embeddings per profile.
    pub max_embeddings_per_profile: usize,
    /// Minimum cosine distance (1 - cos) to every existing embedding.
    pub min_variation_distance: f32,
}

impl Default for AutoEnrollmentConfig {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_secs(600),
            max_embeddings_per_profile: DEFAULT_MAX_EMBEDDINGS_PER_PROFILE,
            min_variation_distance: 0.08,
        }
    }
}

/// A matched observation proposed for enrollment.
#[derive(Debug, Clone)]
pub struct AutoEnrollCandidate {
    pub user_id: Uuid,
    pub profile_id: Uuid,
    pub embedding: FaceEmbedding,
    pub similarity: f32,
}

/// Outcome of one enrollment attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrollmentOutcome {
    Accepted,
    RateLimited,
    ProfileFull,
    TooSimilar,
    ProfileMissing,
}

impl EnrollmentOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            EnrollmentOutcome::Accepted => "accepted",
            EnrollmentOutcome::RateLimited => "rate_limited",
            EnrollmentOutcome::ProfileFull => "profile_full",
            EnrollmentOutcome::TooSimilar => "too_similar",
            EnrollmentOutcome::ProfileMissing => "profile_missing",
        }
    }
}

/// Service that evaluates and applies auto-enrollment candidates.
pub struct AutoEnrollmentService {
    profile_repo: Arc<dyn FaceProfileRepository>,
    snapshot_store: Arc<FaceProfileSnapshotStore>,
    snapshot_cache: Arc<dyn SnapshotCache>,
    event_bus: Arc<EventBus>,
    config: AutoEnrollmentConfig,
    last_enroll: Mutex<HashMap<Uuid, DateTime<Utc>>>,
}

impl AutoEnrollmentService {
    /// Creates a new auto-enrollment service.
    pub fn new(
        profile_repo: Arc<dyn FaceProfileRepository>,
        snapshot_store: Arc<FaceProfileSnapshotStore>,
        snapshot_cache: Arc<dyn SnapshotCache>,
        event_bus: Arc<EventBus>,
        config: AutoEnrollmentConfig,
    ) -> Self {
        Self {
            profile_repo,
            snapshot_store,
            snapshot_cache,
            event_bus,
            config,
            last_enroll: Mutex::new(HashMap::new()),
        }
    }

    /// Evaluates a candidate and appends its embedding when every gate
    /// passes. Repository errors bubble up to the worker, which logs and
    /// keeps running; they never reach the verification caller.
    pub async fn try_enroll(&self, candidate: &AutoEnrollCandidate) -> RepoResult<EnrollmentOutcome> {
        if self.is_rate_limited(candidate.user_id) {
            return Ok(self.finish(candidate, EnrollmentOutcome::RateLimited));
        }

        let Some(profile) = self.profile_repo.find_by_id(candidate.profile_id).await? else {
            return Ok(self.finish(candidate, EnrollmentOutcome::ProfileMissing));
        };

        if profile.embedding_count() >= self.config.max_embeddings_per_profile {
            return Ok(self.finish(candidate, EnrollmentOutcome::ProfileFull));
        }

        // Diversity gate: the new observation must differ from every
        // stored embedding by at least the configured cosine distance.
        let probe = candidate.embedding.normalized();
        for existing in profile.embeddings() {
            let distance = 1.0 - probe.cosine_similarity(existing);
            if distance < self.config.min_variation_distance {
                return Ok(self.finish(candidate, EnrollmentOutcome::TooSimilar));
            }
        }

        self.profile_repo
            .append_embedding(candidate.profile_id, &probe)
            .await?;

        if let Ok(mut last) = self.last_enroll.lock() {
            last.insert(candidate.user_id, Utc::now());
        }

        // New embeddings become visible at the next refresh tick: bump the
        // distributed version and wake the refresher, never splice the
        // running snapshot.
        self.snapshot_cache.invalidate().await;
        self.snapshot_store.request_refresh();

        self.event_bus
            .publish(DomainEvent::ProfileAutoEnrolled(ProfileAutoEnrolledEvent {
                user_id: candidate.user_id,
                profile_id: candidate.profile_id,
                embedding_count: profile.embedding_count() + 1,
                timestamp: Utc::now(),
            }));

        info!(
            user_id = %candidate.user_id,
            profile_id = %candidate.profile_id,
            similarity = candidate.similarity,
            "Auto-enrolled new embedding"
        );

        Ok(self.finish(candidate, EnrollmentOutcome::Accepted))
    }

    fn is_rate_limited(&self, user_id: Uuid) -> bool {
        let Ok(last) = self.last_enroll.lock() else {
            return true;
        };
        match last.get(&user_id) {
            Some(at) => {
                let elapsed = (Utc::now() - *at)
                    .to_std()
                    .unwrap_or(Duration::ZERO);
                elapsed < self.config.min_interval
            }
            None => false,
        }
    }

    fn finish(&self, candidate: &AutoEnrollCandidate, outcome: EnrollmentOutcome) -> EnrollmentOutcome {
        counter!("auto_enroll_total", "result" => outcome.as_str()).increment(1);
        if outcome != EnrollmentOutcome::Accepted {
            debug!(
                user_id = %candidate.user_id,
                outcome = outcome.as_str(),
                "Auto-enroll candidate rejected"
            );
        }
        outcome
    }

    /// Drains the candidate queue until cancellation. Enrollment failures
    /// are logged and never crash the worker.
    pub async fn run_worker(
        self: Arc<Self>,
        mut rx: mpsc::Receiver<AutoEnrollCandidate>,
        cancel: CancellationToken,
    ) {
        info!("Auto-enrollment worker started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                candidate = rx.recv() => {
                    let Some(candidate) = candidate else { break };
                    if let Err(e) = self.try_enroll(&candidate).await {
                        warn!(
                            user_id = %candidate.user_id,
                            "Auto-enrollment failed: {}", e
                        );
                        counter!("auto_enroll_total", "result" => "error").increment(1);
                    }
                }
            }
        }
        info!("Auto-enrollment worker stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::services::InMemorySnapshotCache;
    use crate::domain::entities::FaceProfile;
    use crate::domain::repositories::RepositoryError;
    use crate::domain::value_objects::UserSummary;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubProfileRepo {
        profile: Mutex<Option<FaceProfile>>,
        appended: AtomicUsize,
    }

    impl StubProfileRepo {
        fn with(profile: FaceProfile) -> Self {
            Self {
                profile: Mutex::new(Some(profile)),
                appended: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl FaceProfileRepository for StubProfileRepo {
        async fn find_by_id(&self, _id: Uuid) -> RepoResult<Option<FaceProfile>> {
            Ok(self.profile.lock().map_err(|_| {
                RepositoryError::Serialization("poisoned".to_string())
            })?.clone())
        }

        async fn find_all_with_owners(&self) -> RepoResult<Vec<(FaceProfile, UserSummary)>> {
            Ok(vec![])
        }

        async fn save(&self, _profile: &FaceProfile) -> RepoResult<()> {
            Ok(())
        }

        async fn append_embedding(
            &self,
            _profile_id: Uuid,
            embedding: &FaceEmbedding,
        ) -> RepoResult<()> {
            self.appended.fetch_add(1, Ordering::SeqCst);
            if let Ok(mut profile) = self.profile.lock() {
                if let Some(p) = profile.as_mut() {
                    p.add_embedding(embedding.clone(), usize::MAX);
                }
            }
            Ok(())
        }

        async fn delete(&self, _id: Uuid) -> RepoResult<()> {
            Ok(())
        }

        async fn count(&self) -> RepoResult<i64> {
            Ok(1)
        }
    }

    fn unit(axis: usize) -> FaceEmbedding {
        let mut values = vec![0.0; 128];
        values[axis] = 1.0;
        FaceEmbedding::new(values)
    }

    /// Unit vector at `angle` radians inside the plane spanned by axes 0
    /// and 1, so cos(v, unit(0)) == cos(angle).
    fn rotated(angle: f32) -> FaceEmbedding {
        let mut values = vec![0.0; 128];
        values[0] = angle.cos();
        values[1] = angle.sin();
        FaceEmbedding::new(values)
    }

    fn service_with(profile: FaceProfile) -> (AutoEnrollmentService, Arc<StubProfileRepo>) {
        let repo = Arc::new(StubProfileRepo::with(profile));
        let service = AutoEnrollmentService::new(
            repo.clone(),
            Arc::new(FaceProfileSnapshotStore::new()),
            Arc::new(InMemorySnapshotCache::default()),
            Arc::new(EventBus::new()),
            AutoEnrollmentConfig::default(),
        );
        (service, repo)
    }

    fn candidate(profile: &FaceProfile, embedding: FaceEmbedding) -> AutoEnrollCandidate {
        AutoEnrollCandidate {
            user_id: profile.user_id(),
            profile_id: profile.id(),
            embedding,
            similarity: 0.9,
        }
    }

    #[tokio::test]
    async fn too_similar_candidate_is_rejected() {
        let profile = FaceProfile::new(Uuid::new_v4(), None, unit(0));
        let (service, repo) = service_with(profile.clone());

        // cos = 0.95 -> distance 0.05 < 0.08
        let outcome = service
            .try_enroll(&candidate(&profile, rotated(0.95f32.acos())))
            .await
            .unwrap();

        assert_eq!(outcome, EnrollmentOutcome::TooSimilar);
        assert_eq!(repo.appended.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn diverse_candidate_is_accepted() {
        let profile = FaceProfile::new(Uuid::new_v4(), None, unit(0));
        let (service, repo) = service_with(profile.clone());

        // cos = 0.80 -> distance 0.20 >= 0.08
        let outcome = service
            .try_enroll(&candidate(&profile, rotated(0.80f32.acos())))
            .await
            .unwrap();

        assert_eq!(outcome, EnrollmentOutcome::Accepted);
        assert_eq!(repo.appended.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn acceptance_requests_refresh_instead_of_splicing_snapshot() {
        let profile = FaceProfile::new(Uuid::new_v4(), None, unit(0));
        let repo = Arc::new(StubProfileRepo::with(profile.clone()));
        let store = Arc::new(FaceProfileSnapshotStore::new());
        let service = AutoEnrollmentService::new(
            repo,
            store.clone(),
            Arc::new(InMemorySnapshotCache::default()),
            Arc::new(EventBus::new()),
            AutoEnrollmentConfig::default(),
        );

        let outcome = service
            .try_enroll(&candidate(&profile, rotated(0.5f32.acos())))
            .await
            .unwrap();

        assert_eq!(outcome, EnrollmentOutcome::Accepted);
        // The running snapshot is untouched; only a refresh was requested.
        assert!(store.current().is_empty());
        assert!(store.take_refresh_request());
    }

    #[tokio::test]
    async fn second_enroll_within_interval_is_rate_limited() {
        let profile = FaceProfile::new(Uuid::new_v4(), None, unit(0));
        let (service, _repo) = service_with(profile.clone());

        let first = service
            .try_enroll(&candidate(&profile, unit(1)))
            .await
            .unwrap();
        assert_eq!(first, EnrollmentOutcome::Accepted);

        let second = service
            .try_enroll(&candidate(&profile, unit(2)))
            .await
            .unwrap();
        assert_eq!(second, EnrollmentOutcome::RateLimited);
    }

    #[tokio::test]
    async fn full_profile_rejects_new_embeddings() {
        let mut profile = FaceProfile::new(Uuid::new_v4(), None, unit(0));
        for axis in 1..10 {
            profile.add_embedding(unit(axis), 10);
        }
        let (service, _repo) = service_with(profile.clone());

        let outcome = service
            .try_enroll(&candidate(&profile, unit(11)))
            .await
            .unwrap();
        assert_eq!(outcome, EnrollmentOutcome::ProfileFull);
    }

    #[tokio::test]
    async fn missing_profile_is_reported() {
        let profile = FaceProfile::new(Uuid::new_v4(), None, unit(0));
        let repo = Arc::new(StubProfileRepo {
            profile: Mutex::new(None),
            appended: AtomicUsize::new(0),
        });
        let service = AutoEnrollmentService::new(
            repo,
            Arc::new(FaceProfileSnapshotStore::new()),
            Arc::new(InMemorySnapshotCache::default()),
            Arc::new(EventBus::new()),
            AutoEnrollmentConfig::default(),
        );

        let outcome = service
            .try_enroll(&candidate(&profile, unit(1)))
            .await
            .unwrap();
        assert_eq!(outcome, EnrollmentOutcome::ProfileMissing);
    }
}
