//! Face Profile Snapshot
//!
//! Immutable read-only projection of an enrolled profile used for
//! matching. Snapshots are produced in bulk by the profile loader and
//! replaced atomically; they carry no ownership references back into the
//! entity graph.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Owner projection attached to a loaded profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: Uuid,
    pub display_name: String,
}

impl UserSummary {
    pub fn new(id: Uuid, display_name: String) -> Self {
        Self { id, display_name }
    }
}

/// Flat, immutable view of one enrolled face profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceProfileSnapshot {
    pub profile_id: Uuid,
    pub user_id: Uuid,
    pub display_name: String,
    pub is_primary: bool,
    pub created_at: DateTime<Utc>,
    /// One or more L2-normalizable embedding vectors.
    pub embeddings: Vec<Vec<f32>>,
}

impl FaceProfileSnapshot {
    /// Creates a snapshot from its parts.
    pub fn new(
        profile_id: Uuid,
        user_id: Uuid,
        display_name: String,
        is_primary: bool,
        created_at: DateTime<Utc>,
        embeddings: Vec<Vec<f32>>,
    ) -> Self {
        Self {
            profile_id,
            user_id,
            display_name,
            is_primary,
            created_at,
            embeddings,
        }
    }

    /// Total embedding count carried by this snapshot.
    pub fn embedding_count(&self) -> usize {
        self.embeddings.len()
    }
}
