//! Face Quality Value Object
//!
//! Quality scores reported by the AI service for each detected face.

use serde::{Deserialize, Serialize};

/// Quality assessment of a detected face crop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceQuality {
    /// Aggregate quality score in [0, 1].
    pub overall: f32,
    /// Sharpness score in [0, 1].
    pub sharpness: f32,
    /// Brightness score in [0, 1].
    pub brightness: f32,
    /// Face size in pixels (longest side of the crop).
    pub face_px: i32,
}

impl FaceQuality {
    /// Creates a new quality assessment.
    pub fn new(overall: f32, sharpness: f32, brightness: f32, face_px: i32) -> Self {
        Self {
            overall,
            sharpness,
            brightness,
            face_px,
        }
    }

    /// Whether the crop is good enough to consider for enrollment.
    pub fn is_enrollable(&self, min_overall: f32) -> bool {
        self.overall >= min_overall
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn high_quality_face_is_enrollable() {
        let quality = FaceQuality::new(0.9, 0.8, 0.7, 120);
        assert!(quality.is_enrollable(0.7));
    }

    #[test]
    fn low_quality_face_is_not_enrollable() {
        let quality = FaceQuality::new(0.4, 0.8, 0.7, 120);
        assert!(!quality.is_enrollable(0.7));
    }
}
