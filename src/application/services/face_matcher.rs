//! Face Matcher Service
//!
//! Matches a probe embedding against the current profile snapshot using
//! cosine similarity.
//! Reference: https://arxiv.org/abs/1503.03832 (FaceNet)

use uuid::Uuid;

use crate::domain::value_objects::{cosine, FaceProfileSnapshot};

/// Result of a face matching operation.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceMatchResult {
    pub is_match: bool,
    pub user_id: Option<Uuid>,
    pub profile_id: Option<Uuid>,
    /// Best cosine similarity observed, clamped to [0, 1] for reporting.
    pub similarity: f32,
}

impl FaceMatchResult {
    /// The sentinel returned for invalid input, policy denial and empty
    /// snapshots.
    pub fn no_match() -> Self {
        Self {
            is_match: false,
            user_id: None,
            profile_id: None,
            similarity: 0.0,
        }
    }

    /// A non-matching result that preserves the observed similarity.
    pub fn below_threshold(similarity: f32) -> Self {
        Self {
            is_match: false,
            user_id: None,
            profile_id: None,
            similarity: similarity.clamp(0.0, 1.0),
        }
    }
}

/// Stateless cosine matcher over profile snapshots.
#[derive(Debug, Default, Clone, Copy)]
pub struct FaceMatcher;

impl FaceMatcher {
    pub fn new() -> Self {
        Self
    }

    /// Finds the best match for `probe` among `snapshots`.
    ///
    /// The probe is L2-normalized once; every profile embedding is scored
    /// with cosine similarity in deterministic iteration order. Equal
    /// similarities tie-break on `is_primary`, then earliest creation
    /// time, then smallest profile id. A best similarity at or above
    /// `threshold` is a match.
    pub fn match_probe(
        &self,
        probe: &[f32],
        snapshots: &[FaceProfileSnapshot],
        threshold: f32,
    ) -> FaceMatchResult {
        if probe.is_empty() || snapshots.is_empty() {
            return FaceMatchResult::no_match();
        }

        let norm: f32 = probe.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm == 0.0 {
            return FaceMatchResult::no_match();
        }
        let normalized: Vec<f32> = probe.iter().map(|x| x / norm).collect();

        let mut best: Option<(f32, &FaceProfileSnapshot)> = None;

        for snapshot in snapshots {
            for embedding in &snapshot.embeddings {
                let similarity = cosine(&normalized, embedding);

                best = match best {
                    None => Some((similarity, snapshot)),
                    Some((best_similarity, best_snapshot)) => {
                        if similarity > best_similarity
                            || (similarity == best_similarity
                                && Self::wins_tie(snapshot, best_snapshot))
                        {
                            Some((similarity, snapshot))
                        } else {
                            Some((best_similarity, best_snapshot))
                        }
                    }
                };
            }
        }

        match best {
            Some((similarity, snapshot)) if similarity >= threshold => FaceMatchResult {
                is_match: true,
                user_id: Some(snapshot.user_id),
                profile_id: Some(snapshot.profile_id),
                similarity: similarity.clamp(0.0, 1.0),
            },
            Some((similarity, _)) => FaceMatchResult::below_threshold(similarity),
            None => FaceMatchResult::no_match(),
        }
    }

    /// Tie-break for equal similarity: primary profile first, then the
    /// earliest-created, then the smallest id.
    fn wins_tie(candidate: &FaceProfileSnapshot, incumbent: &FaceProfileSnapshot) -> bool {
        if candidate.is_primary != incumbent.is_primary {
            return candidate.is_primary;
        }
        if candidate.created_at != incumbent.created_at {
            return candidate.created_at < incumbent.created_at;
        }
        candidate.profile_id < incumbent.profile_id
    }
}
