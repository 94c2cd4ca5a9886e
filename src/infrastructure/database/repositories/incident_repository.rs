//! Incident Repository Implementation

use async_trait::async_trait;
use sqlx::PgPool;

use crate::domain::entities::{Incident, IncidentStatus};
use crate::domain::repositories::{IncidentRepository, RepoResult};
use crate::infrastructure::database::models::IncidentRow;

/// PostgreSQL incident repository.
pub struct PgIncidentRepository {
    pool: PgPool,
}

impl PgIncidentRepository {
    /// Creates a new incident repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_incident(row: IncidentRow) -> Incident {
        Incident::from_db(
            row.id,
            row.title,
            row.description,
            row.incident_type,
            row.source,
            row.severity,
            row.status,
            row.operator_id,
            row.location,
            row.assignee_id,
            row.dedupe_key,
            row.idempotency_key,
            row.created_at,
            row.resolved_at,
        )
    }
}

const INCIDENT_COLUMNS: &str = r#"
    id, title, description, incident_type, source, severity, status,
    operator_id, location, assignee_id, dedupe_key, idempotency_key,
    created_at, resolved_at
"#;

#[async_trait]
impl IncidentRepository for PgIncidentRepository {
    async fn insert(&self, incident: &Incident) -> RepoResult<Incident> {
        let row: IncidentRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO incidents (
                title, description, incident_type, source, severity, status,
                operator_id, location, assignee_id, dedupe_key, idempotency_key,
                created_at, resolved_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING {INCIDENT_COLUMNS}
            "#
        ))
        .bind(incident.title())
        .bind(incident.description())
        .bind(incident.incident_type())
        .bind(incident.source())
        .bind(incident.severity())
        .bind(incident.status())
        .bind(incident.operator_id())
        .bind(incident.location())
        .bind(incident.assignee_id())
        .bind(incident.dedupe_key())
        .bind(incident.idempotency_key())
        .bind(incident.created_at())
        .bind(incident.resolved_at())
        .fetch_one(&self.pool)
        .await?;

        Ok(Self::row_to_incident(row))
    }

    async fn find_by_id(&self, id: i64) -> RepoResult<Option<Incident>> {
        let row: Option<IncidentRow> = sqlx::query_as(&format!(
            "SELECT {INCIDENT_COLUMNS} FROM incidents WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Self::row_to_incident))
    }

    async fn find_open_by_dedupe_key(&self, dedupe_key: &str) -> RepoResult<Option<Incident>> {
        let row: Option<IncidentRow> = sqlx::query_as(&format!(
            r#"
            SELECT {INCIDENT_COLUMNS}
            FROM incidents
            WHERE dedupe_key = $1 AND status <> $2
            ORDER BY created_at DESC
            LIMIT 1
            "#
        ))
        .bind(dedupe_key)
        .bind(IncidentStatus::Closed)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Self::row_to_incident))
    }

    async fn find_by_idempotency_key(&self, idempotency_key: &str) -> RepoResult<Option<Incident>> {
        let row: Option<IncidentRow> = sqlx::query_as(&format!(
            r#"
            SELECT {INCIDENT_COLUMNS}
            FROM incidents
            WHERE idempotency_key = $1
            ORDER BY created_at
            LIMIT 1
            "#
        ))
        .bind(idempotency_key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Self::row_to_incident))
    }

    async fn update(&self, incident: &Incident) -> RepoResult<()> {
        sqlx::query(
            r#"
            UPDATE incidents SET
                status = $2,
                assignee_id = $3,
                resolved_at = $4
            WHERE id = $1
            "#,
        )
        .bind(incident.id())
        .bind(incident.status())
        .bind(incident.assignee_id())
        .bind(incident.resolved_at())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
