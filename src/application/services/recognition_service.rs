//! Recognition Service
//!
//! Orchestrates a verification: extract → policy → match → auto-enroll
//! hook. Invalid input and policy denial are sentinel no-match results,
//! never errors; only AI extraction can fail.

use std::sync::Arc;

use metrics::counter;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::application::services::{
    AutoEnrollCandidate, CameraPolicyResolver, FaceMatchResult, FaceMatcher,
    FaceProfileSnapshotStore,
};
use crate::domain::entities::RecognitionMode;
use crate::domain::value_objects::{FaceEmbedding, MIN_EMBEDDING_DIMENSION};
use crate::infrastructure::ai::{AiClientError, AiVisionClient};

/// Verification failure surfaced to the caller. Everything else is a
/// sentinel no-match result.
#[derive(Debug, thiserror::Error)]
pub enum RecognitionError {
    #[error("embedding extraction failed: {0}")]
    Extraction(#[from] AiClientError),
}

/// Confidence bucket derived from the reported similarity. Used for
/// observability only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfidenceBucket {
    None,
    Low,
    Medium,
    High,
}

impl ConfidenceBucket {
    /// Buckets a clamped similarity: High ≥ 0.85, Medium ≥ 0.65, Low > 0.
    pub fn from_similarity(similarity: f32) -> Self {
        if similarity >= 0.85 {
            ConfidenceBucket::High
        } else if similarity >= 0.65 {
            ConfidenceBucket::Medium
        } else if similarity > 0.0 {
            ConfidenceBucket::Low
        } else {
            ConfidenceBucket::None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceBucket::None => "none",
            ConfidenceBucket::Low => "low",
            ConfidenceBucket::Medium => "medium",
            ConfidenceBucket::High => "high",
        }
    }
}

/// Stateless verification orchestrator; safe for unlimited concurrent
/// callers.
pub struct RecognitionService {
    ai_client: Arc<dyn AiVisionClient>,
    policy_resolver: Arc<CameraPolicyResolver>,
    snapshot_store: Arc<FaceProfileSnapshotStore>,
    matcher: FaceMatcher,
    auto_enroll_tx: mpsc::Sender<AutoEnrollCandidate>,
}

impl RecognitionService {
    /// Creates a new recognition service.
    pub fn new(
        ai_client: Arc<dyn AiVisionClient>,
        policy_resolver: Arc<CameraPolicyResolver>,
        snapshot_store: Arc<FaceProfileSnapshotStore>,
        auto_enroll_tx: mpsc::Sender<AutoEnrollCandidate>,
    ) -> Self {
        Self {
            ai_client,
            policy_resolver,
            snapshot_store,
            matcher: FaceMatcher::new(),
            auto_enroll_tx,
        }
    }

    /// Verifies an image: extracts the best face embedding, then matches.
    pub async fn verify_image(
        &self,
        image: &[u8],
        camera_id: &str,
    ) -> Result<FaceMatchResult, RecognitionError> {
        if image.is_empty() {
            return Ok(self.record("invalid_input", FaceMatchResult::no_match()));
        }

        let extracted = self
            .ai_client
            .extract_embedding(image, Some(camera_id))
            .await?;

        let Some(face) = extracted.best_face() else {
            return Ok(self.record("no_face", FaceMatchResult::no_match()));
        };

        Ok(self.verify_embedding(&face.embedding, camera_id).await)
    }

    /// Verifies a probe embedding against the current snapshot under the
    /// camera's policy. Infallible: invalid input, policy denial and an
    /// empty snapshot all yield sentinel no-match results.
    pub async fn verify_embedding(&self, embedding: &[f32], camera_id: &str) -> FaceMatchResult {
        if embedding.len() < MIN_EMBEDDING_DIMENSION {
            return self.record("invalid_input", FaceMatchResult::no_match());
        }

        let policy = self.policy_resolver.resolve(camera_id).await;
        if policy.mode == RecognitionMode::Disabled {
            return self.record("policy_denied", FaceMatchResult::no_match());
        }

        let snapshot = self.snapshot_store.current();
        if snapshot.is_empty() {
            return self.record("empty_snapshot", FaceMatchResult::no_match());
        }

        let result = self.matcher.match_probe(embedding, &snapshot, policy.threshold);

        if policy.mode == RecognitionMode::ObserveOnly {
            if result.is_match {
                info!(
                    camera_id,
                    user_id = ?result.user_id,
                    similarity = result.similarity,
                    "Observe-only match suppressed"
                );
            }
            return self.record("observe_only", FaceMatchResult::below_threshold(result.similarity));
        }

        if result.is_match {
            self.schedule_auto_enroll(embedding, &result);
            return self.record("match", result);
        }

        self.record("no_match", result)
    }

    /// Hands a matched observation to the auto-enrollment worker without
    /// blocking the caller. A full queue drops the candidate.
    fn schedule_auto_enroll(&self, embedding: &[f32], result: &FaceMatchResult) {
        let (Some(user_id), Some(profile_id)) = (result.user_id, result.profile_id) else {
            return;
        };

        let candidate = AutoEnrollCandidate {
            user_id,
            profile_id,
            embedding: FaceEmbedding::new(embedding.to_vec()),
            similarity: result.similarity,
        };

        if let Err(mpsc::error::TrySendError::Full(_)) = self.auto_enroll_tx.try_send(candidate) {
            warn!(user_id = %user_id, "Auto-enroll queue full, dropping candidate");
            counter!("auto_enroll_total", "result" => "queue_full").increment(1);
        }
    }

    fn record(&self, outcome: &'static str, result: FaceMatchResult) -> FaceMatchResult {
        let bucket = ConfidenceBucket::from_similarity(result.similarity);
        counter!(
            "recognition_total",
            "outcome" => outcome,
            "confidence" => bucket.as_str()
        )
        .increment(1);
        debug!(outcome, similarity = result.similarity, "Verification completed");
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{AiCapabilities, Camera, RecognitionMode};
    use crate::domain::repositories::{CameraRepository, RepoResult};
    use crate::domain::value_objects::FaceProfileSnapshot;
    use crate::infrastructure::ai::{ExtractResponse, FrameStream};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::HashMap;
    use uuid::Uuid;

    struct StubCameraRepo {
        cameras: HashMap<i64, Camera>,
    }

    #[async_trait]
    impl CameraRepository for StubCameraRepo {
        async fn find_by_id(&self, id: i64) -> RepoResult<Option<Camera>> {
            Ok(self.cameras.get(&id).cloned())
        }

        async fn find_all(&self) -> RepoResult<Vec<Camera>> {
            Ok(self.cameras.values().cloned().collect())
        }

        async fn find_active(&self) -> RepoResult<Vec<Camera>> {
            Ok(vec![])
        }

        async fn save(&self, _camera: &Camera) -> RepoResult<()> {
            Ok(())
        }

        async fn update(&self, _camera: &Camera) -> RepoResult<()> {
            Ok(())
        }
    }

    struct StubAiClient;

    #[async_trait]
    impl AiVisionClient for StubAiClient {
        async fn extract_embedding(
            &self,
            _image: &[u8],
            _camera_id: Option<&str>,
        ) -> Result<ExtractResponse, AiClientError> {
            Err(AiClientError::Transport("not wired in tests".to_string()))
        }

        async fn open_camera_stream(
            &self,
            _camera_id: i64,
            _url: &str,
        ) -> Result<FrameStream, AiClientError> {
            Err(AiClientError::Transport("not wired in tests".to_string()))
        }
    }

    fn unit_x() -> Vec<f32> {
        let mut v = vec![0.0; 128];
        v[0] = 1.0;
        v
    }

    fn snapshot_of(embedding: Vec<f32>) -> FaceProfileSnapshot {
        FaceProfileSnapshot::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            "U1".to_string(),
            false,
            Utc::now(),
            vec![embedding],
        )
    }

    struct Fixture {
        service: RecognitionService,
        store: Arc<FaceProfileSnapshotStore>,
        auto_enroll_rx: mpsc::Receiver<AutoEnrollCandidate>,
    }

    fn fixture(cameras: Vec<Camera>) -> Fixture {
        let store = Arc::new(FaceProfileSnapshotStore::new());
        let (tx, rx) = mpsc::channel(8);
        let resolver = Arc::new(CameraPolicyResolver::new(
            Arc::new(StubCameraRepo {
                cameras: cameras.into_iter().map(|c| (c.id(), c)).collect(),
            }),
            0.65,
        ));
        let service = RecognitionService::new(Arc::new(StubAiClient), resolver, store.clone(), tx);
        Fixture {
            service,
            store,
            auto_enroll_rx: rx,
        }
    }

    fn camera(id: i64, mode: RecognitionMode, capabilities: AiCapabilities) -> Camera {
        let mut camera = Camera::new(id, format!("cam-{}", id), "rtsp://test".to_string());
        camera.set_recognition_mode(mode);
        camera.set_capabilities(capabilities);
        camera
    }

    #[tokio::test]
    async fn undersized_embedding_is_rejected_as_invalid_input() {
        let fx = fixture(vec![]);
        let result = fx.service.verify_embedding(&vec![1.0; 127], "3").await;
        assert_eq!(result, FaceMatchResult::no_match());
    }

    #[tokio::test]
    async fn embedding_of_exactly_min_dimension_is_accepted() {
        let fx = fixture(vec![]);
        fx.store.update_success(vec![snapshot_of(unit_x())], 1, 1);

        let result = fx.service.verify_embedding(&unit_x(), "3").await;
        assert!(result.is_match);
    }

    #[tokio::test]
    async fn disabled_camera_short_circuits_without_side_effects() {
        // Camera "7" carries only the Object capability; recognition is
        // forced to Disabled even though the snapshot would match exactly.
        let mut fx = fixture(vec![camera(7, RecognitionMode::Normal, AiCapabilities::OBJECT)]);
        fx.store.update_success(vec![snapshot_of(unit_x())], 1, 1);

        let result = fx.service.verify_embedding(&unit_x(), "7").await;

        assert_eq!(result, FaceMatchResult::no_match());
        assert!(fx.auto_enroll_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn exact_match_under_normal_mode_returns_triple() {
        let mut fx = fixture(vec![camera(3, RecognitionMode::Normal, AiCapabilities::FACE)]);
        let snapshot = snapshot_of(unit_x());
        let expected_user = snapshot.user_id;
        let expected_profile = snapshot.profile_id;
        fx.store.update_success(vec![snapshot], 1, 1);

        let result = fx.service.verify_embedding(&unit_x(), "3").await;

        assert!(result.is_match);
        assert_eq!(result.user_id, Some(expected_user));
        assert_eq!(result.profile_id, Some(expected_profile));
        assert!((result.similarity - 1.0).abs() < 1e-6);

        let candidate = fx.auto_enroll_rx.try_recv().unwrap();
        assert_eq!(candidate.user_id, expected_user);
    }

    #[tokio::test]
    async fn observe_only_suppresses_match_but_keeps_similarity() {
        let mut fx = fixture(vec![camera(5, RecognitionMode::ObserveOnly, AiCapabilities::FACE)]);
        fx.store.update_success(vec![snapshot_of(unit_x())], 1, 1);

        let result = fx.service.verify_embedding(&unit_x(), "5").await;

        assert!(!result.is_match);
        assert!(result.user_id.is_none());
        assert!((result.similarity - 1.0).abs() < 1e-6);
        assert!(fx.auto_enroll_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn empty_snapshot_yields_no_match() {
        let fx = fixture(vec![camera(3, RecognitionMode::Normal, AiCapabilities::FACE)]);
        let result = fx.service.verify_embedding(&unit_x(), "3").await;
        assert_eq!(result, FaceMatchResult::no_match());
    }

    #[tokio::test]
    async fn empty_image_is_an_invalid_input_sentinel() {
        let fx = fixture(vec![]);
        let result = fx.service.verify_image(&[], "3").await.unwrap();
        assert_eq!(result, FaceMatchResult::no_match());
    }

    #[rstest::rstest]
    #[case(0.9, ConfidenceBucket::High)]
    #[case(0.85, ConfidenceBucket::High)]
    #[case(0.7, ConfidenceBucket::Medium)]
    #[case(0.65, ConfidenceBucket::Medium)]
    #[case(0.2, ConfidenceBucket::Low)]
    #[case(0.0, ConfidenceBucket::None)]
    fn confidence_buckets_follow_the_documented_cutoffs(
        #[case] similarity: f32,
        #[case] expected: ConfidenceBucket,
    ) {
        assert_eq!(ConfidenceBucket::from_similarity(similarity), expected);
    }
}
