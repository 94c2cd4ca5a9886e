//! Camera Entity
//!
//! A registered RTSP video source monitored for face recognition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// AI capability bitmask advertised per camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiCapabilities(u32);

impl AiCapabilities {
    pub const NONE: AiCapabilities = AiCapabilities(0);
    pub const FACE: AiCapabilities = AiCapabilities(1);
    pub const OBJECT: AiCapabilities = AiCapabilities(1 << 1);
    pub const BEHAVIOR: AiCapabilities = AiCapabilities(1 << 2);

    /// Creates a capability set from its raw bit representation.
    pub fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub fn bits(&self) -> u32 {
        self.0
    }

    /// Whether all bits of `other` are present in this set.
    pub fn contains(&self, other: AiCapabilities) -> bool {
        self.0 & other.0 == other.0
    }

    /// Union of two capability sets.
    pub fn with(&self, other: AiCapabilities) -> Self {
        Self(self.0 | other.0)
    }
}

/// Per-camera recognition policy mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RecognitionMode {
    /// Recognition does not run for this camera.
    Disabled,
    /// Recognition runs and is logged but matches are not reported.
    ObserveOnly,
    /// Standard matching with the effective threshold.
    Normal,
    /// Matching with the threshold raised by 0.05.
    Strict,
    /// Matching with the threshold lowered by 0.05.
    Relaxed,
}

impl Default for RecognitionMode {
    fn default() -> Self {
        Self::Normal
    }
}

/// A camera entity representing a monitored stream source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Camera {
    id: i64,
    name: String,
    stream_url: String,
    is_active: bool,
    capabilities: AiCapabilities,
    recognition_mode: RecognitionMode,
    threshold_override: Option<f32>,
    zone_id: Option<i64>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Camera {
    /// Creates a new camera registration.
    pub fn new(id: i64, name: String, stream_url: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            name,
            stream_url,
            is_active: true,
            capabilities: AiCapabilities::FACE,
            recognition_mode: RecognitionMode::Normal,
            threshold_override: None,
            zone_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Reconstructs a camera from database fields.
    #[allow(clippy::too_many_arguments)]
    pub fn from_db(
        id: i64,
        name: String,
        stream_url: String,
        is_active: bool,
        capabilities: AiCapabilities,
        recognition_mode: RecognitionMode,
        threshold_override: Option<f32>,
        zone_id: Option<i64>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            name,
            stream_url,
            is_active,
            capabilities,
            recognition_mode,
            threshold_override,
            zone_id,
            created_at,
            updated_at,
        }
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stream_url(&self) -> &str {
        &self.stream_url
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn capabilities(&self) -> AiCapabilities {
        self.capabilities
    }

    pub fn recognition_mode(&self) -> RecognitionMode {
        self.recognition_mode
    }

    pub fn threshold_override(&self) -> Option<f32> {
        self.threshold_override
    }

    pub fn zone_id(&self) -> Option<i64> {
        self.zone_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Whether the camera advertises face analysis capability.
    pub fn supports_face(&self) -> bool {
        self.capabilities.contains(AiCapabilities::FACE)
    }

    pub fn set_active(&mut self, active: bool) {
        self.is_active = active;
        self.updated_at = Utc::now();
    }

    pub fn set_recognition_mode(&mut self, mode: RecognitionMode) {
        self.recognition_mode = mode;
        self.updated_at = Utc::now();
    }

    pub fn set_capabilities(&mut self, capabilities: AiCapabilities) {
        self.capabilities = capabilities;
        self.updated_at = Utc::now();
    }

    pub fn set_threshold_override(&mut self, threshold: Option<f32>) {
        self.threshold_override = threshold.map(|t| t.clamp(0.0, 1.0));
        self.updated_at = Utc::now();
    }

    pub fn set_zone(&mut self, zone_id: Option<i64>) {
        self.zone_id = zone_id;
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_camera_supports_face_by_default() {
        let camera = Camera::new(1, "Lobby".to_string(), "rtsp://lobby".to_string());
        assert!(camera.supports_face());
    }

    #[test]
    fn capability_contains_checks_all_bits() {
        let caps = AiCapabilities::FACE.with(AiCapabilities::OBJECT);
        assert!(caps.contains(AiCapabilities::FACE));
        assert!(caps.contains(AiCapabilities::OBJECT));
        assert!(!caps.contains(AiCapabilities::BEHAVIOR));
    }

    #[test]
    fn object_only_camera_does_not_support_face() {
        let mut camera = Camera::new(7, "Yard".to_string(), "rtsp://yard".to_string());
        camera.set_capabilities(AiCapabilities::OBJECT);
        assert!(!camera.supports_face());
    }

    #[test]
    fn threshold_override_is_clamped_to_unit_interval() {
        let mut camera = Camera::new(3, "Gate".to_string(), "rtsp://gate".to_string());
        camera.set_threshold_override(Some(1.7));
        assert_eq!(camera.threshold_override(), Some(1.0));
    }
}
