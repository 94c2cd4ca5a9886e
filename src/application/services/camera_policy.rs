//! Camera Policy Resolver
//!
//! Resolves the effective recognition policy for a camera: mode,
//! threshold and capability gating.

use std::sync::Arc;
use tracing::warn;

use crate::domain::entities::RecognitionMode;
use crate::domain::repositories::CameraRepository;

/// Threshold delta applied by Strict/Relaxed modes.
const MODE_THRESHOLD_DELTA: f32 = 0.05;

/// Resolved per-camera recognition policy.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraRecognitionPolicy {
    /// The camera the policy was resolved for; `None` when the id was
    /// unknown or unparseable.
    pub camera_id: Option<i64>,
    pub mode: RecognitionMode,
    pub threshold: f32,
}

/// Resolves recognition policy from the camera registry.
pub struct CameraPolicyResolver {
    camera_repo: Arc<dyn CameraRepository>,
    default_threshold: f32,
}

impl CameraPolicyResolver {
    /// Creates a new policy resolver.
    pub fn new(camera_repo: Arc<dyn CameraRepository>, default_threshold: f32) -> Self {
        Self {
            camera_repo,
            default_threshold,
        }
    }

    /// Resolves the policy for a camera id as received on the wire.
    ///
    /// Unknown or unparseable ids resolve to Normal mode with the default
    /// threshold. A camera without the Face capability is forced to
    /// Disabled. Registry lookup failures fail open to the default policy;
    /// a store blip on the frame hot path must not disable recognition.
    pub async fn resolve(&self, camera_id: &str) -> CameraRecognitionPolicy {
        let Ok(id) = camera_id.parse::<i64>() else {
            return self.default_policy(None);
        };

        let camera = match self.camera_repo.find_by_id(id).await {
            Ok(Some(camera)) => camera,
            Ok(None) => return self.default_policy(Some(id)),
            Err(e) => {
                warn!(camera_id = id, "Camera lookup failed, using default policy: {}", e);
                return self.default_policy(Some(id));
            }
        };

        let mut mode = camera.recognition_mode();
        if !camera.supports_face() {
            mode = RecognitionMode::Disabled;
        }

        let base = camera.threshold_override().unwrap_or(self.default_threshold);
        let threshold = match mode {
            RecognitionMode::Strict => (base + MODE_THRESHOLD_DELTA).min(1.0),
            RecognitionMode::Relaxed => (base - MODE_THRESHOLD_DELTA).max(0.0),
            _ => base,
        };

        CameraRecognitionPolicy {
            camera_id: Some(id),
            mode,
            threshold,
        }
    }

    fn default_policy(&self, camera_id: Option<i64>) -> CameraRecognitionPolicy {
        CameraRecognitionPolicy {
            camera_id,
            mode: RecognitionMode::Normal,
            threshold: self.default_threshold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{AiCapabilities, Camera};
    use crate::domain::repositories::{RepoResult, RepositoryError};
    use async_trait::async_trait;
    use std::collections::HashMap;

    struct StubCameraRepo {
        cameras: HashMap<i64, Camera>,
        fail: bool,
    }

    impl StubCameraRepo {
        fn with(cameras: Vec<Camera>) -> Self {
            Self {
                cameras: cameras.into_iter().map(|c| (c.id(), c)).collect(),
                fail: false,
            }
        }
    }

    #[async_trait]
    impl CameraRepository for StubCameraRepo {
        async fn find_by_id(&self, id: i64) -> RepoResult<Option<Camera>> {
            if self.fail {
                return Err(RepositoryError::Constraint("down".to_string()));
            }
            Ok(self.cameras.get(&id).cloned())
        }

        async fn find_all(&self) -> RepoResult<Vec<Camera>> {
            Ok(self.cameras.values().cloned().collect())
        }

        async fn find_active(&self) -> RepoResult<Vec<Camera>> {
            Ok(self.cameras.values().filter(|c| c.is_active()).cloned().collect())
        }

        async fn save(&self, _camera: &Camera) -> RepoResult<()> {
            Ok(())
        }

        async fn update(&self, _camera: &Camera) -> RepoResult<()> {
            Ok(())
        }
    }

    fn camera(id: i64, mode: RecognitionMode) -> Camera {
        let mut camera = Camera::new(id, format!("cam-{}", id), "rtsp://test".to_string());
        camera.set_recognition_mode(mode);
        camera
    }

    #[tokio::test]
    async fn unparseable_id_resolves_to_default_policy() {
        let resolver = CameraPolicyResolver::new(Arc::new(StubCameraRepo::with(vec![])), 0.65);
        let policy = resolver.resolve("gate-7").await;
        assert_eq!(policy.camera_id, None);
        assert_eq!(policy.mode, RecognitionMode::Normal);
        assert_eq!(policy.threshold, 0.65);
    }

    #[tokio::test]
    async fn unknown_camera_resolves_to_default_policy() {
        let resolver = CameraPolicyResolver::new(Arc::new(StubCameraRepo::with(vec![])), 0.65);
        let policy = resolver.resolve("99").await;
        assert_eq!(policy.camera_id, Some(99));
        assert_eq!(policy.mode, RecognitionMode::Normal);
    }

    #[tokio::test]
    async fn missing_face_capability_forces_disabled() {
        let mut cam = camera(7, RecognitionMode::Normal);
        cam.set_capabilities(AiCapabilities::OBJECT);
        let resolver = CameraPolicyResolver::new(Arc::new(StubCameraRepo::with(vec![cam])), 0.65);

        let policy = resolver.resolve("7").await;
        assert_eq!(policy.mode, RecognitionMode::Disabled);
    }

    #[tokio::test]
    async fn strict_mode_raises_threshold() {
        let resolver = CameraPolicyResolver::new(
            Arc::new(StubCameraRepo::with(vec![camera(1, RecognitionMode::Strict)])),
            0.65,
        );
        let policy = resolver.resolve("1").await;
        assert!((policy.threshold - 0.70).abs() < 1e-6);
    }

    #[tokio::test]
    async fn strict_threshold_is_capped_at_one() {
        let mut cam = camera(1, RecognitionMode::Strict);
        cam.set_threshold_override(Some(0.98));
        let resolver = CameraPolicyResolver::new(Arc::new(StubCameraRepo::with(vec![cam])), 0.65);

        let policy = resolver.resolve("1").await;
        assert_eq!(policy.threshold, 1.0);
    }

    #[tokio::test]
    async fn relaxed_mode_lowers_threshold_with_floor() {
        let mut cam = camera(2, RecognitionMode::Relaxed);
        cam.set_threshold_override(Some(0.03));
        let resolver = CameraPolicyResolver::new(Arc::new(StubCameraRepo::with(vec![cam])), 0.65);

        let policy = resolver.resolve("2").await;
        assert_eq!(policy.threshold, 0.0);
    }

    #[tokio::test]
    async fn threshold_override_replaces_default() {
        let mut cam = camera(3, RecognitionMode::Normal);
        cam.set_threshold_override(Some(0.8));
        let resolver = CameraPolicyResolver::new(Arc::new(StubCameraRepo::with(vec![cam])), 0.65);

        let policy = resolver.resolve("3").await;
        assert!((policy.threshold - 0.8).abs() < 1e-6);
    }

    #[tokio::test]
    async fn repository_error_fails_open_to_default() {
        let resolver = CameraPolicyResolver::new(
            Arc::new(StubCameraRepo {
                cameras: HashMap::new(),
                fail: true,
            }),
            0.65,
        );
        let policy = resolver.resolve("5").await;
        assert_eq!(policy.mode, RecognitionMode::Normal);
        assert_eq!(policy.threshold, 0.65);
    }
}
