//! Face Profile Repository Implementation

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::entities::FaceProfile;
use crate::domain::repositories::{FaceProfileRepository, RepoResult};
use crate::domain::value_objects::{FaceEmbedding, UserSummary};
use crate::infrastructure::database::models::{FaceProfileRow, ProfileEmbeddingRow};

/// PostgreSQL face profile repository.
pub struct PgFaceProfileRepository {
    pool: PgPool,
}

impl PgFaceProfileRepository {
    /// Creates a new profile repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn rows_to_profile(
        row: FaceProfileRow,
        embeddings: Vec<FaceEmbedding>,
    ) -> (FaceProfile, UserSummary) {
        let owner = UserSummary::new(row.user_id, row.display_name.clone());
        let profile = FaceProfile::from_db(
            row.id,
            row.user_id,
            row.description,
            row.is_primary,
            embeddings,
            row.created_at,
            row.updated_at,
        );
        (profile, owner)
    }
}

#[async_trait]
impl FaceProfileRepository for PgFaceProfileRepository {
    async fn find_by_id(&self, id: Uuid) -> RepoResult<Option<FaceProfile>> {
        let row: Option<FaceProfileRow> = sqlx::query_as(
            r#"
            SELECT
                p.id, p.user_id, p.description, p.is_primary,
                p.created_at, p.updated_at, u.display_name
            FROM face_profiles p
            JOIN users u ON u.id = p.user_id
            WHERE p.id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let embedding_rows: Vec<ProfileEmbeddingRow> = sqlx::query_as(
            r#"
            SELECT profile_id, embedding
            FROM face_profile_embeddings
            WHERE profile_id = $1
            ORDER BY id
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        let embeddings = embedding_rows
            .into_iter()
            .map(|r| FaceEmbedding::from_bytes(&r.embedding))
            .collect();

        Ok(Some(Self::rows_to_profile(row, embeddings).0))
    }

    async fn find_all_with_owners(&self) -> RepoResult<Vec<(FaceProfile, UserSummary)>> {
        let profile_rows: Vec<FaceProfileRow> = sqlx::query_as(
            r#"
            SELECT
                p.id, p.user_id, p.description, p.is_primary,
                p.created_at, p.updated_at, u.display_name
            FROM face_profiles p
            JOIN users u ON u.id = p.user_id
            ORDER BY p.created_at, p.id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let embedding_rows: Vec<ProfileEmbeddingRow> = sqlx::query_as(
            r#"
            SELECT profile_id, embedding
            FROM face_profile_embeddings
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut by_profile: HashMap<Uuid, Vec<FaceEmbedding>> = HashMap::new();
        for row in embedding_rows {
            by_profile
                .entry(row.profile_id)
                .or_default()
                .push(FaceEmbedding::from_bytes(&row.embedding));
        }

        Ok(profile_rows
            .into_iter()
            .map(|row| {
                let embeddings = by_profile.remove(&row.id).unwrap_or_default();
                Self::rows_to_profile(row, embeddings)
            })
            .collect())
    }

    async fn save(&self, profile: &FaceProfile) -> RepoResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO face_profiles (id, user_id, description, is_primary, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(profile.id())
        .bind(profile.user_id())
        .bind(profile.description())
        .bind(profile.is_primary())
        .bind(profile.created_at())
        .bind(profile.updated_at())
        .execute(&mut *tx)
        .await?;

        for embedding in profile.embeddings() {
            sqlx::query(
                r#"
                INSERT INTO face_profile_embeddings (profile_id, embedding, created_at)
                VALUES ($1, $2, $3)
                "#,
            )
            .bind(profile.id())
            .bind(embedding.to_bytes())
            .bind(profile.created_at())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn append_embedding(
        &self,
        profile_id: Uuid,
        embedding: &FaceEmbedding,
    ) -> RepoResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO face_profile_embeddings (profile_id, embedding, created_at)
            VALUES ($1, $2, NOW())
            "#,
        )
        .bind(profile_id)
        .bind(embedding.to_bytes())
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE face_profiles SET updated_at = NOW() WHERE id = $1")
            .bind(profile_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> RepoResult<()> {
        sqlx::query("DELETE FROM face_profiles WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn count(&self) -> RepoResult<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM face_profiles")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0)
    }
}
