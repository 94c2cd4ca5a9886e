//! Camera Repository Implementation

use async_trait::async_trait;
use sqlx::PgPool;

use crate::domain::entities::{AiCapabilities, Camera};
use crate::domain::repositories::{CameraRepository, RepoResult};
use crate::infrastructure::database::models::CameraRow;

/// PostgreSQL camera repository.
pub struct PgCameraRepository {
    pool: PgPool,
}

impl PgCameraRepository {
    /// Creates a new camera repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_camera(row: CameraRow) -> Camera {
        Camera::from_db(
            row.id,
            row.name,
            row.stream_url,
            row.is_active,
            AiCapabilities::from_bits(row.capabilities as u32),
            row.recognition_mode,
            row.threshold_override,
            row.zone_id,
            row.created_at,
            row.updated_at,
        )
    }
}

const CAMERA_COLUMNS: &str = r#"
    id, name, stream_url, is_active, capabilities,
    recognition_mode, threshold_override, zone_id, created_at, updated_at
"#;

#[async_trait]
impl CameraRepository for PgCameraRepository {
    async fn find_by_id(&self, id: i64) -> RepoResult<Option<Camera>> {
        let row: Option<CameraRow> = sqlx::query_as(&format!(
            "SELECT {CAMERA_COLUMNS} FROM cameras WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Self::row_to_camera))
    }

    async fn find_all(&self) -> RepoResult<Vec<Camera>> {
        let rows: Vec<CameraRow> =
            sqlx::query_as(&format!("SELECT {CAMERA_COLUMNS} FROM cameras ORDER BY id"))
                .fetch_all(&self.pool)
                .await?;

        Ok(rows.into_iter().map(Self::row_to_camera).collect())
    }

    async fn find_active(&self) -> RepoResult<Vec<Camera>> {
        let rows: Vec<CameraRow> = sqlx::query_as(&format!(
            "SELECT {CAMERA_COLUMNS} FROM cameras WHERE is_active = TRUE ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Self::row_to_camera).collect())
    }

    async fn save(&self, camera: &Camera) -> RepoResult<()> {
        sqlx::query(
            r#"
            INSERT INTO cameras (
                id, name, stream_url, is_active, capabilities,
                recognition_mode, threshold_override, zone_id, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(camera.id())
        .bind(camera.name())
        .bind(camera.stream_url())
        .bind(camera.is_active())
        .bind(camera.capabilities().bits() as i32)
        .bind(camera.recognition_mode())
        .bind(camera.threshold_override())
        .bind(camera.zone_id())
        .bind(camera.created_at())
        .bind(camera.updated_at())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update(&self, camera: &Camera) -> RepoResult<()> {
        sqlx::query(
            r#"
            UPDATE cameras SET
                name = $2,
                stream_url = $3,
                is_active = $4,
                capabilities = $5,
                recognition_mode = $6,
                threshold_override = $7,
                zone_id = $8,
                updated_at = $9
            WHERE id = $1
            "#,
        )
        .bind(camera.id())
        .bind(camera.name())
        .bind(camera.stream_url())
        .bind(camera.is_active())
        .bind(camera.capabilities().bits() as i32)
        .bind(camera.recognition_mode())
        .bind(camera.threshold_override())
        .bind(camera.zone_id())
        .bind(camera.updated_at())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
