//! Face Profile Entity
//!
//! An enrolled face belonging to exactly one user. A profile owns a
//! bounded list of embeddings; per user at most one profile is primary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::value_objects::FaceEmbedding;

/// Default upper bound on embeddings per profile.
pub const DEFAULT_MAX_EMBEDDINGS_PER_PROFILE: usize = 10;

/// An enrolled face profile owning its embedding vectors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceProfile {
    id: Uuid,
    user_id: Uuid,
    description: Option<String>,
    is_primary: bool,
    embeddings: Vec<FaceEmbedding>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl FaceProfile {
    /// Creates a new profile from an initial enrollment embedding.
    pub fn new(user_id: Uuid, description: Option<String>, embedding: FaceEmbedding) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            description,
            is_primary: false,
            embeddings: vec![embedding],
            created_at: now,
            updated_at: now,
        }
    }

    /// Reconstructs a profile from database fields.
    pub fn from_db(
        id: Uuid,
        user_id: Uuid,
        description: Option<String>,
        is_primary: bool,
        embeddings: Vec<FaceEmbedding>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            user_id,
            description,
            is_primary,
            embeddings,
            created_at,
            updated_at,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn is_primary(&self) -> bool {
        self.is_primary
    }

    pub fn embeddings(&self) -> &[FaceEmbedding] {
        &self.embeddings
    }

    pub fn embedding_count(&self) -> usize {
        self.embeddings.len()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Marks this profile as the user's primary profile.
    pub fn set_primary(&mut self, primary: bool) {
        self.is_primary = primary;
        self.updated_at = Utc::now();
    }

    pub fn set_description(&mut self, description: Option<String>) {
        self.description = description;
        self.updated_at = Utc::now();
    }

    /// Appends a new embedding, enforcing the per-profile bound.
    ///
    /// Returns `false` without mutating when the profile is already at
    /// `max_embeddings`.
    pub fn add_embedding(&mut self, embedding: FaceEmbedding, max_embeddings: usize) -> bool {
        if self.embeddings.len() >= max_embeddings {
            return false;
        }
        self.embeddings.push(embedding);
        self.updated_at = Utc::now();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_embedding(value: f32) -> FaceEmbedding {
        FaceEmbedding::new(vec![value; 128])
    }

    #[test]
    fn new_profile_starts_with_one_embedding() {
        let profile = FaceProfile::new(Uuid::new_v4(), None, test_embedding(0.1));
        assert_eq!(profile.embedding_count(), 1);
    }

    #[test]
    fn new_profile_is_not_primary() {
        let profile = FaceProfile::new(Uuid::new_v4(), None, test_embedding(0.1));
        assert!(!profile.is_primary());
    }

    #[test]
    fn add_embedding_respects_the_bound() {
        let mut profile = FaceProfile::new(Uuid::new_v4(), None, test_embedding(0.1));
        assert!(profile.add_embedding(test_embedding(0.2), 2));
        assert!(!profile.add_embedding(test_embedding(0.3), 2));
        assert_eq!(profile.embedding_count(), 2);
    }
}
