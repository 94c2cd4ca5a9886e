//! Runtime Composition
//!
//! Explicit construction of the whole core with injected dependencies,
//! plus the background tasks and graceful shutdown. No module-level
//! mutable state exists anywhere in the crate; everything is wired here.

use std::sync::Arc;

use anyhow::Result;
use sqlx::PgPool;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::application::services::{
    AutoEnrollCandidate, AutoEnrollmentService, CameraPolicyResolver, EventBus,
    FaceProfileSnapshotStore, IncidentError, IncidentManager, InMemorySnapshotCache, NewIncident,
    NoopSnapshotCache, ProfileLoader, RecognitionService, SnapshotCache, SnapshotRefresher,
    TopologyService, AUTO_ENROLL_QUEUE_CAPACITY,
};
use crate::domain::entities::{IncidentSource, IncidentType};
use crate::domain::events::{DomainEvent, FaceMatchedEvent};
use crate::domain::repositories::CameraRepository;
use crate::infrastructure::ai::{AiVisionClient, HttpAiVisionClient};
use crate::infrastructure::cache::RedisSnapshotCache;
use crate::infrastructure::camera::CameraSupervisor;
use crate::infrastructure::config::{AppConfig, CacheMode};
use crate::infrastructure::database::{
    create_pool, run_migrations, PgCameraRepository, PgFaceProfileRepository,
    PgIncidentRepository,
};

/// The assembled core.
pub struct Runtime {
    config: AppConfig,
    pub pool: PgPool,
    pub event_bus: Arc<EventBus>,
    pub snapshot_store: Arc<FaceProfileSnapshotStore>,
    pub recognition: Arc<RecognitionService>,
    pub supervisor: Arc<CameraSupervisor>,
    pub incident_manager: Arc<IncidentManager>,
    pub topology: Arc<TopologyService>,
    camera_repo: Arc<dyn CameraRepository>,
    refresher: Arc<SnapshotRefresher>,
    auto_enroll: Arc<AutoEnrollmentService>,
    auto_enroll_rx: mpsc::Receiver<AutoEnrollCandidate>,
    cancel: CancellationToken,
}

impl Runtime {
    /// Builds the runtime from configuration.
    pub async fn new(config: AppConfig) -> Result<Self> {
        let pool = create_pool(&config.database_url).await?;
        run_migrations(&pool).await?;

        let profile_repo = Arc::new(PgFaceProfileRepository::new(pool.clone()));
        let camera_repo: Arc<dyn CameraRepository> =
            Arc::new(PgCameraRepository::new(pool.clone()));
        let incident_repo = Arc::new(PgIncidentRepository::new(pool.clone()));

        let snapshot_cache: Arc<dyn SnapshotCache> = match config.cache_mode {
            CacheMode::Off => Arc::new(NoopSnapshotCache),
            CacheMode::Memory => Arc::new(InMemorySnapshotCache::new(
                config.profile_cache.distributed_ttl,
                config.profile_cache.lock_ttl,
            )),
            CacheMode::Redis => {
                let redis_url = config
                    .redis_url
                    .as_deref()
                    .ok_or_else(|| anyhow::anyhow!("REDIS_URL required for redis cache mode"))?;
                Arc::new(RedisSnapshotCache::new(
                    redis_url,
                    config.profile_cache.distributed_ttl,
                    config.profile_cache.lock_ttl,
                )?)
            }
        };

        let event_bus = Arc::new(EventBus::new());
        let snapshot_store = Arc::new(FaceProfileSnapshotStore::new());
        let loader = Arc::new(ProfileLoader::new(profile_repo.clone()));
        let refresher = Arc::new(SnapshotRefresher::new(
            snapshot_store.clone(),
            snapshot_cache.clone(),
            loader,
            event_bus.clone(),
            config.profile_cache.clone(),
        ));

        let ai_client: Arc<dyn AiVisionClient> = Arc::new(HttpAiVisionClient::new(
            config.ai_service_url.clone(),
            config.ai_request_timeout,
        ));

        let (auto_enroll_tx, auto_enroll_rx) = mpsc::channel(AUTO_ENROLL_QUEUE_CAPACITY);
        let auto_enroll = Arc::new(AutoEnrollmentService::new(
            profile_repo,
            snapshot_store.clone(),
            snapshot_cache,
            event_bus.clone(),
            config.auto_enrollment.clone(),
        ));

        let policy_resolver = Arc::new(CameraPolicyResolver::new(
            camera_repo.clone(),
            config.similarity_threshold,
        ));
        let recognition = Arc::new(RecognitionService::new(
            ai_client.clone(),
            policy_resolver,
            snapshot_store.clone(),
            auto_enroll_tx,
        ));

        let supervisor = Arc::new(CameraSupervisor::new(
            ai_client,
            recognition.clone(),
            event_bus.clone(),
            config.supervisor.clone(),
        ));

        let incident_manager = Arc::new(IncidentManager::new(
            incident_repo,
            event_bus.clone(),
            config.severity_overrides.clone(),
        ));

        let topology = Arc::new(TopologyService::new(config.topology.clone()));

        Ok(Self {
            config,
            pool,
            event_bus,
            snapshot_store,
            recognition,
            supervisor,
            incident_manager,
            topology,
            camera_repo,
            refresher,
            auto_enroll,
            auto_enroll_rx,
            cancel: CancellationToken::new(),
        })
    }

    /// Runs the core until SIGINT, then shuts down gracefully.
    pub async fn run(self) -> Result<()> {
        info!(
            "Starting facewatch core (cache mode: {:?})",
            self.config.cache_mode
        );

        let refresher_task = tokio::spawn(
            self.refresher.clone().run(self.cancel.child_token()),
        );
        let enroll_task = tokio::spawn(
            self.auto_enroll
                .clone()
                .run_worker(self.auto_enroll_rx, self.cancel.child_token()),
        );
        let bridge_task = tokio::spawn(incident_bridge(
            self.event_bus.clone(),
            self.incident_manager.clone(),
            self.topology.clone(),
            self.cancel.child_token(),
        ));

        match self.camera_repo.find_all().await {
            Ok(cameras) => {
                self.topology.load_from_cameras(&cameras);
                let mut started = 0;
                for camera in cameras.iter().filter(|c| c.is_active()) {
                    if self.supervisor.start(camera.id(), camera.stream_url()) {
                        started += 1;
                    }
                }
                info!(started, total = cameras.len(), "Camera monitoring bootstrapped");
            }
            Err(e) => warn!("Could not load cameras at startup: {}", e),
        }

        tokio::signal::ctrl_c().await?;
        info!("Shutdown signal received");

        self.cancel.cancel();
        self.supervisor.shutdown().await;
        join_quietly(refresher_task, "refresher").await;
        join_quietly(enroll_task, "auto-enroll worker").await;
        join_quietly(bridge_task, "incident bridge").await;

        info!("Facewatch core stopped");
        Ok(())
    }
}

async fn join_quietly(task: JoinHandle<()>, name: &str) {
    if let Err(e) = task.await {
        warn!("Background task {} ended abnormally: {}", name, e);
    }
}

/// Bridges face matches from the camera supervisors into incidents.
///
/// This is the externalized incident hook: the supervisor publishes
/// events and stays free of incident dependencies.
async fn incident_bridge(
    event_bus: Arc<EventBus>,
    incident_manager: Arc<IncidentManager>,
    topology: Arc<TopologyService>,
    cancel: CancellationToken,
) {
    let mut events = event_bus.subscribe();
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = events.recv() => event,
        };
        let Some(event) = event else { break };

        if let DomainEvent::FaceMatched(matched) = event.as_ref() {
            open_face_match_incident(&incident_manager, &topology, matched).await;
        }
    }
    debug!("Incident bridge stopped");
}

async fn open_face_match_incident(
    incident_manager: &IncidentManager,
    topology: &TopologyService,
    matched: &FaceMatchedEvent,
) {
    let location = topology
        .zone_of(matched.camera_id)
        .map(|zone| format!("zone-{}", zone))
        .unwrap_or_else(|| format!("camera-{}", matched.camera_id));

    let result = incident_manager
        .create(NewIncident {
            title: format!("Face match on camera {}", matched.camera_id),
            description: Some(format!(
                "User {} recognized with similarity {:.2}",
                matched.user_id, matched.similarity
            )),
            incident_type: IncidentType::FaceMatch,
            source: IncidentSource::Camera,
            operator_id: None,
            location: Some(location),
            assignee_id: None,
            idempotency_key: None,
            occurred_at: matched.timestamp,
        })
        .await;

    match result {
        Ok(incident) => debug!(incident_id = incident.id(), "Face match incident opened"),
        Err(IncidentError::Duplicate { dedupe_key }) => {
            debug!(dedupe_key, "Face match incident deduplicated")
        }
        Err(e) => warn!("Face match incident creation failed: {}", e),
    }
}
