//! Database Row Models
//!
//! SQLx-compatible structs for database row mapping.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use crate::domain::entities::{
    IncidentSeverity, IncidentSource, IncidentStatus, IncidentType, RecognitionMode,
};

/// Face profile database row (embeddings live in their own table).
#[derive(Debug, FromRow)]
pub struct FaceProfileRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub description: Option<String>,
    pub is_primary: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Owner display name joined from users.
    pub display_name: String,
}

/// Profile embedding database row.
#[derive(Debug, FromRow)]
pub struct ProfileEmbeddingRow {
    pub profile_id: Uuid,
    /// Packed little-endian float32 bytes.
    pub embedding: Vec<u8>,
}

/// Camera database row.
#[derive(Debug, FromRow)]
pub struct CameraRow {
    pub id: i64,
    pub name: String,
    pub stream_url: String,
    pub is_active: bool,
    pub capabilities: i32,
    pub recognition_mode: RecognitionMode,
    pub threshold_override: Option<f32>,
    pub zone_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Incident database row.
#[derive(Debug, FromRow)]
pub struct IncidentRow {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub incident_type: IncidentType,
    pub source: IncidentSource,
    pub severity: IncidentSeverity,
    pub status: IncidentStatus,
    pub operator_id: Option<Uuid>,
    pub location: Option<String>,
    pub assignee_id: Option<Uuid>,
    pub dedupe_key: String,
    pub idempotency_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}
