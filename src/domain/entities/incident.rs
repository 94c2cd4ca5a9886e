//! Incident Entity
//!
//! A security incident raised by detection or manual entry. Incidents
//! move forward through a fixed lifecycle and are collapsed by a
//! deterministic dedupe key while non-Closed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of incident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum IncidentType {
    FaceMatch,
    Intrusion,
    Tamper,
    CameraOffline,
    Manual,
}

impl std::fmt::Display for IncidentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            IncidentType::FaceMatch => "face_match",
            IncidentType::Intrusion => "intrusion",
            IncidentType::Tamper => "tamper",
            IncidentType::CameraOffline => "camera_offline",
            IncidentType::Manual => "manual",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for IncidentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "face_match" => Ok(IncidentType::FaceMatch),
            "intrusion" => Ok(IncidentType::Intrusion),
            "tamper" => Ok(IncidentType::Tamper),
            "camera_offline" => Ok(IncidentType::CameraOffline),
            "manual" => Ok(IncidentType::Manual),
            _ => Err(format!("Invalid incident type: {}", s)),
        }
    }
}

/// Origin of an incident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum IncidentSource {
    Camera,
    Sensor,
    Operator,
    System,
}

impl std::fmt::Display for IncidentSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            IncidentSource::Camera => "camera",
            IncidentSource::Sensor => "sensor",
            IncidentSource::Operator => "operator",
            IncidentSource::System => "system",
        };
        write!(f, "{}", s)
    }
}

/// Incident severity level.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum IncidentSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for IncidentSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            IncidentSeverity::Low => "low",
            IncidentSeverity::Medium => "medium",
            IncidentSeverity::High => "high",
            IncidentSeverity::Critical => "critical",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for IncidentSeverity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(IncidentSeverity::Low),
            "medium" => Ok(IncidentSeverity::Medium),
            "high" => Ok(IncidentSeverity::High),
            "critical" => Ok(IncidentSeverity::Critical),
            _ => Err(format!("Invalid severity: {}", s)),
        }
    }
}

/// Incident lifecycle status. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum IncidentStatus {
    Open,
    Assigned,
    InProgress,
    Resolved,
    Closed,
}

impl IncidentStatus {
    /// Position in the lifecycle; transitions must strictly increase it.
    fn rank(&self) -> u8 {
        match self {
            IncidentStatus::Open => 0,
            IncidentStatus::Assigned => 1,
            IncidentStatus::InProgress => 2,
            IncidentStatus::Resolved => 3,
            IncidentStatus::Closed => 4,
        }
    }

    /// Whether moving from `self` to `next` is a forward step.
    pub fn can_transition_to(&self, next: IncidentStatus) -> bool {
        next.rank() > self.rank()
    }
}

impl std::fmt::Display for IncidentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            IncidentStatus::Open => "open",
            IncidentStatus::Assigned => "assigned",
            IncidentStatus::InProgress => "in_progress",
            IncidentStatus::Resolved => "resolved",
            IncidentStatus::Closed => "closed",
        };
        write!(f, "{}", s)
    }
}

/// A security incident.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Incident {
    id: i64,
    title: String,
    description: Option<String>,
    incident_type: IncidentType,
    source: IncidentSource,
    severity: IncidentSeverity,
    status: IncidentStatus,
    operator_id: Option<Uuid>,
    location: Option<String>,
    assignee_id: Option<Uuid>,
    dedupe_key: String,
    idempotency_key: Option<String>,
    created_at: DateTime<Utc>,
    resolved_at: Option<DateTime<Utc>>,
}

impl Incident {
    /// Creates a new unpersisted incident (id assigned by the store).
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        title: String,
        description: Option<String>,
        incident_type: IncidentType,
        source: IncidentSource,
        severity: IncidentSeverity,
        status: IncidentStatus,
        operator_id: Option<Uuid>,
        location: Option<String>,
        assignee_id: Option<Uuid>,
        dedupe_key: String,
        idempotency_key: Option<String>,
    ) -> Self {
        Self {
            id: 0,
            title,
            description,
            incident_type,
            source,
            severity,
            status,
            operator_id,
            location,
            assignee_id,
            dedupe_key,
            idempotency_key,
            created_at: Utc::now(),
            resolved_at: None,
        }
    }

    /// Reconstructs an incident from database fields.
    #[allow(clippy::too_many_arguments)]
    pub fn from_db(
        id: i64,
        title: String,
        description: Option<String>,
        incident_type: IncidentType,
        source: IncidentSource,
        severity: IncidentSeverity,
        status: IncidentStatus,
        operator_id: Option<Uuid>,
        location: Option<String>,
        assignee_id: Option<Uuid>,
        dedupe_key: String,
        idempotency_key: Option<String>,
        created_at: DateTime<Utc>,
        resolved_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id,
            title,
            description,
            incident_type,
            source,
            severity,
            status,
            operator_id,
            location,
            assignee_id,
            dedupe_key,
            idempotency_key,
            created_at,
            resolved_at,
        }
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn incident_type(&self) -> IncidentType {
        self.incident_type
    }

    pub fn source(&self) -> IncidentSource {
        self.source
    }

    pub fn severity(&self) -> IncidentSeverity {
        self.severity
    }

    pub fn status(&self) -> IncidentStatus {
        self.status
    }

    pub fn operator_id(&self) -> Option<Uuid> {
        self.operator_id
    }

    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    pub fn assignee_id(&self) -> Option<Uuid> {
        self.assignee_id
    }

    pub fn dedupe_key(&self) -> &str {
        &self.dedupe_key
    }

    pub fn idempotency_key(&self) -> Option<&str> {
        self.idempotency_key.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn resolved_at(&self) -> Option<DateTime<Utc>> {
        self.resolved_at
    }

    /// Applies a forward lifecycle transition.
    ///
    /// Returns `false` without mutating when the transition does not move
    /// forward. Reaching `Resolved` stamps `resolved_at`.
    pub fn transition_to(&mut self, next: IncidentStatus) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        self.status = next;
        if next == IncidentStatus::Resolved {
            self.resolved_at = Some(Utc::now());
        }
        true
    }

    pub fn assign_to(&mut self, assignee_id: Uuid) {
        self.assignee_id = Some(assignee_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_incident() -> Incident {
        Incident::new(
            "Face match".to_string(),
            None,
            IncidentType::FaceMatch,
            IncidentSource::Camera,
            IncidentSeverity::High,
            IncidentStatus::Open,
            None,
            Some("ZoneA".to_string()),
            None,
            "face_match:camera:-:ZoneA:12345".to_string(),
            None,
        )
    }

    #[test]
    fn forward_transition_is_accepted() {
        let mut incident = open_incident();
        assert!(incident.transition_to(IncidentStatus::Assigned));
        assert_eq!(incident.status(), IncidentStatus::Assigned);
    }

    #[test]
    fn forward_jump_is_accepted() {
        let mut incident = open_incident();
        assert!(incident.transition_to(IncidentStatus::Resolved));
        assert!(incident.resolved_at().is_some());
    }

    #[test]
    fn backward_transition_is_rejected() {
        let mut incident = open_incident();
        assert!(incident.transition_to(IncidentStatus::InProgress));
        assert!(!incident.transition_to(IncidentStatus::Open));
        assert_eq!(incident.status(), IncidentStatus::InProgress);
    }

    #[test]
    fn self_transition_is_rejected() {
        let mut incident = open_incident();
        assert!(!incident.transition_to(IncidentStatus::Open));
    }

    #[test]
    fn severity_orders_from_low_to_critical() {
        assert!(IncidentSeverity::Low < IncidentSeverity::Critical);
        assert!(IncidentSeverity::Medium < IncidentSeverity::High);
    }
}
