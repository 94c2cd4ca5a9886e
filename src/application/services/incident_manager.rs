//! Incident Manager
//!
//! Severity assignment, deterministic dedupe keys, idempotent creation
//! and the forward-only lifecycle over incidents.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use metrics::counter;
use tracing::info;
use uuid::Uuid;

use crate::application::services::EventBus;
use crate::domain::entities::{
    Incident, IncidentSeverity, IncidentSource, IncidentStatus, IncidentType,
};
use crate::domain::events::{DomainEvent, IncidentCreatedEvent, IncidentStatusChangedEvent};
use crate::domain::repositories::{IncidentRepository, RepositoryError};

/// Incident operation failures.
#[derive(Debug, thiserror::Error)]
pub enum IncidentError {
    #[error("incident {0} not found")]
    NotFound(i64),

    #[error("duplicate incident for dedupe key {dedupe_key}")]
    Duplicate { dedupe_key: String },

    #[error("invalid transition {from} -> {to}")]
    InvalidTransition {
        from: IncidentStatus,
        to: IncidentStatus,
    },

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Request to open an incident.
#[derive(Debug, Clone)]
pub struct NewIncident {
    pub title: String,
    pub description: Option<String>,
    pub incident_type: IncidentType,
    pub source: IncidentSource,
    pub operator_id: Option<Uuid>,
    pub location: Option<String>,
    pub assignee_id: Option<Uuid>,
    pub idempotency_key: Option<String>,
    /// When the triggering observation happened; feeds the dedupe bucket.
    pub occurred_at: DateTime<Utc>,
}

/// Manages incident creation and lifecycle.
pub struct IncidentManager {
    incident_repo: Arc<dyn IncidentRepository>,
    event_bus: Arc<EventBus>,
    severity_overrides: HashMap<IncidentType, IncidentSeverity>,
}

impl IncidentManager {
    /// Creates a new incident manager. `severity_overrides` come from
    /// deployment configuration and shadow the compiled defaults.
    pub fn new(
        incident_repo: Arc<dyn IncidentRepository>,
        event_bus: Arc<EventBus>,
        severity_overrides: HashMap<IncidentType, IncidentSeverity>,
    ) -> Self {
        Self {
            incident_repo,
            event_bus,
            severity_overrides,
        }
    }

    /// Maps an incident type to its severity.
    pub fn resolve_severity(&self, incident_type: IncidentType) -> IncidentSeverity {
        if let Some(severity) = self.severity_overrides.get(&incident_type) {
            return *severity;
        }
        match incident_type {
            IncidentType::FaceMatch => IncidentSeverity::High,
            IncidentType::Intrusion => IncidentSeverity::Critical,
            IncidentType::Tamper => IncidentSeverity::High,
            IncidentType::CameraOffline => IncidentSeverity::Medium,
            IncidentType::Manual => IncidentSeverity::Low,
        }
    }

    /// Initial lifecycle status: automated sources open as `Open`;
    /// operator-originated incidents with an assignee start `Assigned`.
    pub fn initial_status(&self, source: IncidentSource, assignee_id: Option<Uuid>) -> IncidentStatus {
        match source {
            IncidentSource::Operator if assignee_id.is_some() => IncidentStatus::Assigned,
            _ => IncidentStatus::Open,
        }
    }

    /// Deterministic dedupe key over type, source, operator, coarse
    /// location and a 60-second time bucket.
    pub fn build_dedupe_key(
        incident_type: IncidentType,
        source: IncidentSource,
        operator_id: Option<Uuid>,
        location: Option<&str>,
        at: DateTime<Utc>,
    ) -> String {
        format!(
            "{}:{}:{}:{}:{}",
            incident_type,
            source,
            operator_id.map_or_else(|| "-".to_string(), |id| id.to_string()),
            location.unwrap_or("-"),
            at.timestamp().div_euclid(60),
        )
    }

    /// Creates an incident.
    ///
    /// A replayed idempotency key returns the originally created incident.
    /// A dedupe-key collision with any non-Closed incident is a
    /// [`IncidentError::Duplicate`] conflict.
    pub async fn create(&self, new: NewIncident) -> Result<Incident, IncidentError> {
        if let Some(key) = &new.idempotency_key {
            if let Some(existing) = self.incident_repo.find_by_idempotency_key(key).await? {
                info!(incident_id = existing.id(), "Idempotent replay, returning original");
                return Ok(existing);
            }
        }

        let dedupe_key = Self::build_dedupe_key(
            new.incident_type,
            new.source,
            new.operator_id,
            new.location.as_deref(),
            new.occurred_at,
        );

        if self
            .incident_repo
            .find_open_by_dedupe_key(&dedupe_key)
            .await?
            .is_some()
        {
            counter!("incidents_deduplicated_total").increment(1);
            return Err(IncidentError::Duplicate { dedupe_key });
        }

        let severity = self.resolve_severity(new.incident_type);
        let status = self.initial_status(new.source, new.assignee_id);

        let incident = Incident::new(
            new.title,
            new.description,
            new.incident_type,
            new.source,
            severity,
            status,
            new.operator_id,
            new.location,
            new.assignee_id,
            dedupe_key,
            new.idempotency_key,
        );

        let created = self.incident_repo.insert(&incident).await?;

        counter!("incidents_created_total", "severity" => severity.to_string()).increment(1);
        self.event_bus
            .publish(DomainEvent::IncidentCreated(IncidentCreatedEvent {
                incident_id: created.id(),
                incident_type: created.incident_type(),
                severity: created.severity(),
                timestamp: Utc::now(),
            }));

        info!(
            incident_id = created.id(),
            severity = %created.severity(),
            "Incident created"
        );
        Ok(created)
    }

    /// Applies a forward lifecycle transition and persists it.
    pub async fn transition(
        &self,
        incident_id: i64,
        next: IncidentStatus,
    ) -> Result<Incident, IncidentError> {
        let mut incident = self
            .incident_repo
            .find_by_id(incident_id)
            .await?
            .ok_or(IncidentError::NotFound(incident_id))?;

        let from = incident.status();
        if !incident.transition_to(next) {
            return Err(IncidentError::InvalidTransition { from, to: next });
        }

        self.incident_repo.update(&incident).await?;

        self.event_bus
            .publish(DomainEvent::IncidentStatusChanged(IncidentStatusChangedEvent {
                incident_id,
                from,
                to: next,
                timestamp: Utc::now(),
            }));

        Ok(incident)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::repositories::RepoResult;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::Mutex;

    /// In-memory incident store mirroring the partial-unique dedupe index.
    struct InMemoryIncidentRepo {
        incidents: Mutex<Vec<Incident>>,
    }

    impl InMemoryIncidentRepo {
        fn new() -> Self {
            Self {
                incidents: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl IncidentRepository for InMemoryIncidentRepo {
        async fn insert(&self, incident: &Incident) -> RepoResult<Incident> {
            let mut incidents = self
                .incidents
                .lock()
                .map_err(|_| RepositoryError::Serialization("poisoned".to_string()))?;
            let id = incidents.len() as i64 + 1;
            let created = Incident::from_db(
                id,
                incident.title().to_string(),
                incident.description().map(|s| s.to_string()),
                incident.incident_type(),
                incident.source(),
                incident.severity(),
                incident.status(),
                incident.operator_id(),
                incident.location().map(|s| s.to_string()),
                incident.assignee_id(),
                incident.dedupe_key().to_string(),
                incident.idempotency_key().map(|s| s.to_string()),
                incident.created_at(),
                incident.resolved_at(),
            );
            incidents.push(created.clone());
            Ok(created)
        }

        async fn find_by_id(&self, id: i64) -> RepoResult<Option<Incident>> {
            Ok(self
                .incidents
                .lock()
                .map_err(|_| RepositoryError::Serialization("poisoned".to_string()))?
                .iter()
                .find(|i| i.id() == id)
                .cloned())
        }

        async fn find_open_by_dedupe_key(&self, dedupe_key: &str) -> RepoResult<Option<Incident>> {
            Ok(self
                .incidents
                .lock()
                .map_err(|_| RepositoryError::Serialization("poisoned".to_string()))?
                .iter()
                .find(|i| i.dedupe_key() == dedupe_key && i.status() != IncidentStatus::Closed)
                .cloned())
        }

        async fn find_by_idempotency_key(
            &self,
            idempotency_key: &str,
        ) -> RepoResult<Option<Incident>> {
            Ok(self
                .incidents
                .lock()
                .map_err(|_| RepositoryError::Serialization("poisoned".to_string()))?
                .iter()
                .find(|i| i.idempotency_key() == Some(idempotency_key))
                .cloned())
        }

        async fn update(&self, incident: &Incident) -> RepoResult<()> {
            let mut incidents = self
                .incidents
                .lock()
                .map_err(|_| RepositoryError::Serialization("poisoned".to_string()))?;
            if let Some(stored) = incidents.iter_mut().find(|i| i.id() == incident.id()) {
                *stored = incident.clone();
            }
            Ok(())
        }
    }

    fn manager() -> IncidentManager {
        IncidentManager::new(
            Arc::new(InMemoryIncidentRepo::new()),
            Arc::new(EventBus::new()),
            HashMap::new(),
        )
    }

    fn face_match_incident(bucket_time: DateTime<Utc>) -> NewIncident {
        NewIncident {
            title: "Face match in ZoneA".to_string(),
            description: None,
            incident_type: IncidentType::FaceMatch,
            source: IncidentSource::Camera,
            operator_id: Some(Uuid::from_u128(1)),
            location: Some("ZoneA".to_string()),
            assignee_id: None,
            idempotency_key: None,
            occurred_at: bucket_time,
        }
    }

    #[test]
    fn dedupe_key_is_deterministic_within_a_minute_bucket() {
        let base = Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 5).unwrap();
        let later = Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 55).unwrap();
        let next_bucket = Utc.with_ymd_and_hms(2026, 3, 1, 10, 1, 5).unwrap();

        let key = |at| {
            IncidentManager::build_dedupe_key(
                IncidentType::FaceMatch,
                IncidentSource::Camera,
                None,
                Some("ZoneA"),
                at,
            )
        };

        assert_eq!(key(base), key(later));
        assert_ne!(key(base), key(next_bucket));
    }

    #[test]
    fn default_severity_table_is_applied() {
        let manager = manager();
        assert_eq!(
            manager.resolve_severity(IncidentType::FaceMatch),
            IncidentSeverity::High
        );
        assert_eq!(
            manager.resolve_severity(IncidentType::Intrusion),
            IncidentSeverity::Critical
        );
        assert_eq!(
            manager.resolve_severity(IncidentType::Manual),
            IncidentSeverity::Low
        );
    }

    #[test]
    fn severity_overrides_shadow_defaults() {
        let manager = IncidentManager::new(
            Arc::new(InMemoryIncidentRepo::new()),
            Arc::new(EventBus::new()),
            HashMap::from([(IncidentType::FaceMatch, IncidentSeverity::Critical)]),
        );
        assert_eq!(
            manager.resolve_severity(IncidentType::FaceMatch),
            IncidentSeverity::Critical
        );
    }

    #[test]
    fn operator_incident_with_assignee_starts_assigned() {
        let manager = manager();
        assert_eq!(
            manager.initial_status(IncidentSource::Operator, Some(Uuid::new_v4())),
            IncidentStatus::Assigned
        );
        assert_eq!(
            manager.initial_status(IncidentSource::Operator, None),
            IncidentStatus::Open
        );
        assert_eq!(
            manager.initial_status(IncidentSource::Camera, Some(Uuid::new_v4())),
            IncidentStatus::Open
        );
    }

    #[tokio::test]
    async fn duplicate_dedupe_key_is_rejected_until_closed() {
        let manager = manager();
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 5).unwrap();

        let first = manager.create(face_match_incident(at)).await.unwrap();

        let second = manager.create(face_match_incident(at)).await;
        assert!(matches!(second, Err(IncidentError::Duplicate { .. })));

        manager
            .transition(first.id(), IncidentStatus::Closed)
            .await
            .unwrap();

        let third = manager.create(face_match_incident(at)).await;
        assert!(third.is_ok());
    }

    #[tokio::test]
    async fn idempotency_key_replay_returns_the_original() {
        let manager = manager();
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 5).unwrap();

        let mut request = face_match_incident(at);
        request.idempotency_key = Some("req-123".to_string());

        let first = manager.create(request.clone()).await.unwrap();
        let replay = manager.create(request).await.unwrap();

        assert_eq!(first.id(), replay.id());
        assert_eq!(first.dedupe_key(), replay.dedupe_key());
    }

    #[tokio::test]
    async fn backward_transition_is_rejected() {
        let manager = manager();
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 5).unwrap();
        let incident = manager.create(face_match_incident(at)).await.unwrap();

        manager
            .transition(incident.id(), IncidentStatus::InProgress)
            .await
            .unwrap();

        let back = manager
            .transition(incident.id(), IncidentStatus::Assigned)
            .await;
        assert!(matches!(back, Err(IncidentError::InvalidTransition { .. })));
    }

    #[tokio::test]
    async fn resolving_stamps_resolution_time() {
        let manager = manager();
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 5).unwrap();
        let incident = manager.create(face_match_incident(at)).await.unwrap();

        let resolved = manager
            .transition(incident.id(), IncidentStatus::Resolved)
            .await
            .unwrap();
        assert!(resolved.resolved_at().is_some());
    }

    #[tokio::test]
    async fn transition_of_unknown_incident_is_not_found() {
        let manager = manager();
        let result = manager.transition(999, IncidentStatus::Closed).await;
        assert!(matches!(result, Err(IncidentError::NotFound(999))));
    }
}
