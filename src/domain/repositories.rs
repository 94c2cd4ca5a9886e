//! Repository Traits
//!
//! Abstractions for data persistence (Dependency Inversion Principle).

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::entities::{Camera, FaceProfile, Incident};
use crate::domain::value_objects::{FaceEmbedding, UserSummary};

/// Result type for repository operations.
pub type RepoResult<T> = Result<T, RepositoryError>;

/// Repository error types.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),
}

/// Face profile repository interface.
#[async_trait]
pub trait FaceProfileRepository: Send + Sync {
    /// Finds a profile with its embeddings by id.
    async fn find_by_id(&self, id: Uuid) -> RepoResult<Option<FaceProfile>>;

    /// Loads every profile with embeddings and its owner summary.
    ///
    /// Must be all-or-nothing: transient failures surface as an error, never
    /// as a partial population.
    async fn find_all_with_owners(&self) -> RepoResult<Vec<(FaceProfile, UserSummary)>>;

    /// Saves a new profile with its initial embeddings.
    async fn save(&self, profile: &FaceProfile) -> RepoResult<()>;

    /// Appends one embedding to an existing profile.
    async fn append_embedding(&self, profile_id: Uuid, embedding: &FaceEmbedding)
        -> RepoResult<()>;

    /// Deletes a profile and its embeddings.
    async fn delete(&self, id: Uuid) -> RepoResult<()>;

    /// Counts enrolled profiles.
    async fn count(&self) -> RepoResult<i64>;
}

/// Camera repository interface.
#[async_trait]
pub trait CameraRepository: Send + Sync {
    /// Finds a camera by id.
    async fn find_by_id(&self, id: i64) -> RepoResult<Option<Camera>>;

    /// Finds all cameras.
    async fn find_all(&self) -> RepoResult<Vec<Camera>>;

    /// Finds cameras flagged for active monitoring.
    async fn find_active(&self) -> RepoResult<Vec<Camera>>;

    /// Saves a new camera.
    async fn save(&self, camera: &Camera) -> RepoResult<()>;

    /// Updates an existing camera.
    async fn update(&self, camera: &Camera) -> RepoResult<()>;
}

/// Incident repository interface.
#[async_trait]
pub trait IncidentRepository: Send + Sync {
    /// Inserts a new incident, returning it with its assigned id.
    async fn insert(&self, incident: &Incident) -> RepoResult<Incident>;

    /// Finds an incident by id.
    async fn find_by_id(&self, id: i64) -> RepoResult<Option<Incident>>;

    /// Finds a non-Closed incident carrying the given dedupe key.
    async fn find_open_by_dedupe_key(&self, dedupe_key: &str) -> RepoResult<Option<Incident>>;

    /// Finds the incident recorded for a client idempotency key.
    async fn find_by_idempotency_key(&self, idempotency_key: &str)
        -> RepoResult<Option<Incident>>;

    /// Persists status/assignment mutations of an existing incident.
    async fn update(&self, incident: &Incident) -> RepoResult<()>;
}
