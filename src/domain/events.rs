//! Domain Events
//!
//! Events that represent significant occurrences in the domain.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::entities::{IncidentSeverity, IncidentStatus, IncidentType};

/// A domain event that can be broadcast to subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    /// A probe embedding matched an enrolled profile.
    FaceMatched(FaceMatchedEvent),
    /// An embedding was appended to a profile by auto-enrollment.
    ProfileAutoEnrolled(ProfileAutoEnrolledEvent),
    /// A new profile snapshot was published.
    SnapshotRefreshed(SnapshotRefreshedEvent),
    /// An incident was created.
    IncidentCreated(IncidentCreatedEvent),
    /// An incident moved to a new lifecycle status.
    IncidentStatusChanged(IncidentStatusChangedEvent),
    /// A camera stream session started.
    CameraStreamStarted(CameraStreamEvent),
    /// A camera stream session stopped cleanly.
    CameraStreamStopped(CameraStreamEvent),
    /// A camera stream attempt failed and will be retried.
    CameraStreamFailed(CameraStreamFailedEvent),
    /// A camera exhausted its retry budget and was disabled.
    CameraRetriesExhausted(CameraRetriesExhaustedEvent),
}

/// Event emitted when a probe matches an enrolled profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceMatchedEvent {
    pub camera_id: i64,
    pub frame_id: u64,
    pub user_id: Uuid,
    pub profile_id: Uuid,
    pub similarity: f32,
    pub timestamp: DateTime<Utc>,
}

/// Event emitted when auto-enrollment accepts a new embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileAutoEnrolledEvent {
    pub user_id: Uuid,
    pub profile_id: Uuid,
    pub embedding_count: usize,
    pub timestamp: DateTime<Utc>,
}

/// Event emitted when the refresher publishes a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotRefreshedEvent {
    pub version: u64,
    pub profile_count: usize,
    pub source: String,
    pub duration_ms: u64,
    pub timestamp: DateTime<Utc>,
}

/// Event emitted when an incident is created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentCreatedEvent {
    pub incident_id: i64,
    pub incident_type: IncidentType,
    pub severity: IncidentSeverity,
    pub timestamp: DateTime<Utc>,
}

/// Event emitted when an incident changes status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentStatusChangedEvent {
    pub incident_id: i64,
    pub from: IncidentStatus,
    pub to: IncidentStatus,
    pub timestamp: DateTime<Utc>,
}

/// Event emitted when a camera stream session starts or stops.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraStreamEvent {
    pub camera_id: i64,
    pub timestamp: DateTime<Utc>,
}

/// Event emitted when a camera stream attempt fails.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraStreamFailedEvent {
    pub camera_id: i64,
    pub attempt: u32,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

/// Event emitted when a camera exhausts its retry budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraRetriesExhaustedEvent {
    pub camera_id: i64,
    pub attempts: u32,
    pub timestamp: DateTime<Utc>,
}

impl DomainEvent {
    /// Returns the event timestamp.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            DomainEvent::FaceMatched(e) => e.timestamp,
            DomainEvent::ProfileAutoEnrolled(e) => e.timestamp,
            DomainEvent::SnapshotRefreshed(e) => e.timestamp,
            DomainEvent::IncidentCreated(e) => e.timestamp,
            DomainEvent::IncidentStatusChanged(e) => e.timestamp,
            DomainEvent::CameraStreamStarted(e) => e.timestamp,
            DomainEvent::CameraStreamStopped(e) => e.timestamp,
            DomainEvent::CameraStreamFailed(e) => e.timestamp,
            DomainEvent::CameraRetriesExhausted(e) => e.timestamp,
        }
    }

    /// Returns the event type name.
    pub fn event_type(&self) -> &'static str {
        match self {
            DomainEvent::FaceMatched(_) => "face_matched",
            DomainEvent::ProfileAutoEnrolled(_) => "profile_auto_enrolled",
            DomainEvent::SnapshotRefreshed(_) => "snapshot_refreshed",
            DomainEvent::IncidentCreated(_) => "incident_created",
            DomainEvent::IncidentStatusChanged(_) => "incident_status_changed",
            DomainEvent::CameraStreamStarted(_) => "camera_stream_started",
            DomainEvent::CameraStreamStopped(_) => "camera_stream_stopped",
            DomainEvent::CameraStreamFailed(_) => "camera_stream_failed",
            DomainEvent::CameraRetriesExhausted(_) => "camera_retries_exhausted",
        }
    }
}
