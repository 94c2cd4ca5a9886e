//! Profile Loader
//!
//! Materializes matching snapshots from the persistent profile store.

use std::sync::Arc;
use tracing::debug;

use crate::domain::repositories::{FaceProfileRepository, RepoResult};
use crate::domain::value_objects::FaceProfileSnapshot;

/// Loads enrolled profiles and projects them into snapshot objects.
pub struct ProfileLoader {
    profile_repo: Arc<dyn FaceProfileRepository>,
}

impl ProfileLoader {
    /// Creates a new profile loader.
    pub fn new(profile_repo: Arc<dyn FaceProfileRepository>) -> Self {
        Self { profile_repo }
    }

    /// Loads every profile with its embeddings and owner summary.
    ///
    /// All-or-nothing: a transient store error surfaces as `Err` and the
    /// refresher keeps serving the previous snapshot. Output order is
    /// deterministic: creation time, then profile id.
    pub async fn load(&self) -> RepoResult<Vec<FaceProfileSnapshot>> {
        let profiles = self.profile_repo.find_all_with_owners().await?;

        let mut snapshots: Vec<FaceProfileSnapshot> = profiles
            .into_iter()
            .map(|(profile, owner)| {
                let embeddings = profile
                    .embeddings()
                    .iter()
                    .filter(|e| !e.is_empty())
                    .map(|e| e.values().to_vec())
                    .collect();

                FaceProfileSnapshot::new(
                    profile.id(),
                    profile.user_id(),
                    owner.display_name,
                    profile.is_primary(),
                    profile.created_at(),
                    embeddings,
                )
            })
            .collect();

        snapshots.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then(a.profile_id.cmp(&b.profile_id))
        });

        debug!("Loaded {} profile snapshots", snapshots.len());
        Ok(snapshots)
    }
}
