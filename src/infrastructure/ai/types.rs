//! AI Service Wire Types
//!
//! Payloads exchanged with the external vision service: unary embedding
//! extraction and the per-camera frame stream.

use serde::{Deserialize, Serialize};

use crate::domain::value_objects::{BoundingBox, FaceQuality};

/// One face detected within a frame or an image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectedFace {
    pub bbox: BoundingBox,
    pub quality: FaceQuality,
    /// Embedding vector of the detected face.
    pub embedding: Vec<f32>,
}

/// One frame of detections received on a camera stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameResponse {
    pub camera_id: String,
    pub frame_id: u64,
    #[serde(default)]
    pub faces: Vec<DetectedFace>,
}

/// Response of the unary embedding extraction call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractResponse {
    pub success: bool,
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
    pub face_detected: bool,
    #[serde(default)]
    pub faces: Vec<DetectedFace>,
}

impl ExtractResponse {
    /// Returns the highest-quality detected face, if any.
    pub fn best_face(&self) -> Option<&DetectedFace> {
        self.faces.iter().max_by(|a, b| {
            a.quality
                .overall
                .partial_cmp(&b.quality.overall)
                .unwrap_or(std::cmp::Ordering::Equal)
        })
    }
}

/// Request body of the unary embedding extraction call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractRequest {
    /// Base64-encoded image bytes.
    pub image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub camera_id: Option<String>,
}

/// Request body opening a camera stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenStreamRequest {
    pub camera_id: String,
    pub url: String,
}
