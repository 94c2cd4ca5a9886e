//! Face Embedding Value Object
//!
//! A dense float vector representing a face, produced by the external AI
//! service and stored as packed little-endian bytes.
//! Reference: https://arxiv.org/abs/1503.03832 (FaceNet)

use serde::{Deserialize, Serialize};

/// Minimum number of dimensions an embedding must carry to be matchable.
pub const MIN_EMBEDDING_DIMENSION: usize = 128;

/// A face embedding vector for facial recognition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceEmbedding {
    values: Vec<f32>,
}

impl FaceEmbedding {
    /// Creates an embedding from raw float values.
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    /// Decodes an embedding from packed little-endian float32 bytes.
    ///
    /// Inputs whose length is not a multiple of 4 decode to the empty
    /// embedding; callers treat empty as invalid.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        if bytes.len() % 4 != 0 {
            return Self { values: Vec::new() };
        }

        let values: Vec<f32> = bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();

        Self { values }
    }

    /// Encodes the embedding as packed little-endian float32 bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    /// Returns the embedding values.
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Number of dimensions.
    pub fn dimension(&self) -> usize {
        self.values.len()
    }

    /// An embedding with no values is invalid and never matches.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Calculates the cosine similarity to another embedding.
    ///
    /// Returns 0.0 on dimension mismatch or when either vector has zero
    /// norm. Range: [-1, 1].
    pub fn cosine_similarity(&self, other: &FaceEmbedding) -> f32 {
        cosine(&self.values, &other.values)
    }

    /// Normalizes the embedding to unit length (L2 normalization).
    pub fn normalize(&mut self) {
        let magnitude: f32 = self.values.iter().map(|x| x * x).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for v in &mut self.values {
                *v /= magnitude;
            }
        }
    }

    /// Returns a normalized copy of this embedding.
    pub fn normalized(&self) -> Self {
        let mut copy = self.clone();
        copy.normalize();
        copy
    }
}

/// Cosine similarity between two raw float slices.
///
/// Returns 0.0 on dimension mismatch or zero norm.
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let magnitude_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let magnitude_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        return 0.0;
    }

    dot_product / (magnitude_a * magnitude_b)
}

impl PartialEq for FaceEmbedding {
    fn eq(&self, other: &Self) -> bool {
        self.values.len() == other.values.len()
            && self
                .values
                .iter()
                .zip(other.values.iter())
                .all(|(a, b)| (a - b).abs() < f32::EPSILON)
    }
}
