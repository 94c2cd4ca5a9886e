//! Camera Supervisor
//!
//! One long-lived worker per active camera: consumes the AI detection
//! stream, runs recognition on every detected face and recovers from
//! stream failures with bounded exponential backoff. Retry exhaustion
//! disables the camera until it is manually restarted.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use metrics::counter;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::application::services::{EventBus, RecognitionService};
use crate::domain::events::{
    CameraRetriesExhaustedEvent, CameraStreamEvent, CameraStreamFailedEvent, DomainEvent,
    FaceMatchedEvent,
};
use crate::infrastructure::ai::{AiClientError, AiVisionClient};

/// Faceless frames between heartbeat observations.
const HEARTBEAT_FRAME_INTERVAL: u64 = 100;

/// Configuration for camera stream supervision.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Attempts before a camera is considered disabled.
    pub max_retry_attempts: u32,
    /// First backoff step; doubles per attempt.
    pub base_retry_delay: Duration,
    /// Backoff ceiling.
    pub max_retry_delay: Duration,
    /// Bound on waiting for a worker to exit in `stop`.
    pub stop_timeout: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            max_retry_attempts: 10,
            base_retry_delay: Duration::from_secs(5),
            max_retry_delay: Duration::from_secs(120),
            stop_timeout: Duration::from_secs(15),
        }
    }
}

/// Introspection view of one running session.
#[derive(Debug, Clone)]
pub struct CameraSessionStatus {
    pub camera_id: i64,
    pub stream_url: String,
    pub started_at: DateTime<Utc>,
    pub retry_count: u32,
}

struct CameraSession {
    stream_url: String,
    started_at: DateTime<Utc>,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
    retry_count: Arc<AtomicU32>,
}

type SessionTable = Arc<Mutex<HashMap<i64, CameraSession>>>;

/// Supervises one worker task per monitored camera.
pub struct CameraSupervisor {
    sessions: SessionTable,
    ai_client: Arc<dyn AiVisionClient>,
    recognition: Arc<RecognitionService>,
    event_bus: Arc<EventBus>,
    config: SupervisorConfig,
}

impl CameraSupervisor {
    /// Creates a new supervisor.
    pub fn new(
        ai_client: Arc<dyn AiVisionClient>,
        recognition: Arc<RecognitionService>,
        event_bus: Arc<EventBus>,
        config: SupervisorConfig,
    ) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            ai_client,
            recognition,
            event_bus,
            config,
        }
    }

    /// Starts monitoring a camera. Registration is add-if-absent: a second
    /// start for a running camera returns `false` and spawns nothing.
    pub fn start(&self, camera_id: i64, stream_url: &str) -> bool {
        let Ok(mut sessions) = self.sessions.lock() else {
            return false;
        };
        if sessions.contains_key(&camera_id) {
            debug!(camera_id, "Camera already monitored, ignoring start");
            return false;
        }

        let cancel = CancellationToken::new();
        let retry_count = Arc::new(AtomicU32::new(0));

        let handle = tokio::spawn(supervise(
            camera_id,
            stream_url.to_string(),
            cancel.clone(),
            retry_count.clone(),
            self.sessions.clone(),
            self.ai_client.clone(),
            self.recognition.clone(),
            self.event_bus.clone(),
            self.config.clone(),
        ));

        sessions.insert(
            camera_id,
            CameraSession {
                stream_url: stream_url.to_string(),
                started_at: Utc::now(),
                cancel,
                handle,
                retry_count,
            },
        );

        info!(camera_id, stream_url, "Camera monitoring started");
        self.event_bus
            .publish(DomainEvent::CameraStreamStarted(CameraStreamEvent {
                camera_id,
                timestamp: Utc::now(),
            }));
        true
    }

    /// Stops monitoring a camera. Waits a bounded time for the worker to
    /// exit; a worker that overruns keeps its pending cancellation and is
    /// only logged.
    pub async fn stop(&self, camera_id: i64) -> bool {
        let session = {
            let Ok(mut sessions) = self.sessions.lock() else {
                return false;
            };
            sessions.remove(&camera_id)
        };
        let Some(session) = session else {
            return false;
        };

        session.cancel.cancel();
        match tokio::time::timeout(self.config.stop_timeout, session.handle).await {
            Ok(_) => info!(camera_id, "Camera monitoring stopped"),
            Err(_) => warn!(
                camera_id,
                "Camera worker did not exit within the stop timeout, cancellation pending"
            ),
        }

        self.event_bus
            .publish(DomainEvent::CameraStreamStopped(CameraStreamEvent {
                camera_id,
                timestamp: Utc::now(),
            }));
        true
    }

    /// Snapshot of all running sessions, sorted by camera id.
    pub fn active_sessions(&self) -> Vec<CameraSessionStatus> {
        let Ok(sessions) = self.sessions.lock() else {
            return Vec::new();
        };
        let mut statuses: Vec<CameraSessionStatus> = sessions
            .iter()
            .map(|(camera_id, session)| CameraSessionStatus {
                camera_id: *camera_id,
                stream_url: session.stream_url.clone(),
                started_at: session.started_at,
                retry_count: session.retry_count.load(Ordering::Relaxed),
            })
            .collect();
        statuses.sort_by_key(|s| s.camera_id);
        statuses
    }

    /// Cancels every session and awaits all workers.
    pub async fn shutdown(&self) {
        let drained: Vec<(i64, CameraSession)> = {
            let Ok(mut sessions) = self.sessions.lock() else {
                return;
            };
            sessions.drain().collect()
        };
        if drained.is_empty() {
            return;
        }

        info!("Stopping {} camera sessions", drained.len());
        for (_, session) in &drained {
            session.cancel.cancel();
        }
        for (camera_id, session) in drained {
            if tokio::time::timeout(self.config.stop_timeout, session.handle)
                .await
                .is_err()
            {
                warn!(camera_id, "Camera worker leaked past shutdown timeout");
            }
        }
    }
}

/// Per-camera supervision loop with bounded exponential backoff.
#[allow(clippy::too_many_arguments)]
async fn supervise(
    camera_id: i64,
    stream_url: String,
    cancel: CancellationToken,
    retry_count: Arc<AtomicU32>,
    sessions: SessionTable,
    ai_client: Arc<dyn AiVisionClient>,
    recognition: Arc<RecognitionService>,
    event_bus: Arc<EventBus>,
    config: SupervisorConfig,
) {
    let mut attempt: u32 = 0;

    while !cancel.is_cancelled() {
        attempt += 1;
        retry_count.store(attempt, Ordering::Relaxed);

        match run_stream_once(
            camera_id,
            &stream_url,
            &cancel,
            &ai_client,
            &recognition,
            &event_bus,
        )
        .await
        {
            Ok(StreamEnd::Cancelled) => break,
            Ok(StreamEnd::Eof) => {
                debug!(camera_id, attempt, "Camera stream ended");
            }
            Err(e) => {
                warn!(camera_id, attempt, "Camera stream failed: {}", e);
                counter!("camera_stream_failures_total", "camera_id" => camera_id.to_string())
                    .increment(1);
                event_bus.publish(DomainEvent::CameraStreamFailed(CameraStreamFailedEvent {
                    camera_id,
                    attempt,
                    error: e.to_string(),
                    timestamp: Utc::now(),
                }));
            }
        }

        if cancel.is_cancelled() {
            break;
        }

        if attempt >= config.max_retry_attempts {
            error!(
                camera_id,
                attempts = attempt,
                "Camera retry budget exhausted, disabling until restarted"
            );
            event_bus.publish(DomainEvent::CameraRetriesExhausted(
                CameraRetriesExhaustedEvent {
                    camera_id,
                    attempts: attempt,
                    timestamp: Utc::now(),
                },
            ));
            if let Ok(mut sessions) = sessions.lock() {
                sessions.remove(&camera_id);
            }
            return;
        }

        let delay = backoff_delay(&config, attempt);
        debug!(camera_id, attempt, delay_secs = delay.as_secs(), "Backing off");
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    debug!(camera_id, "Camera supervision loop exited");
}

/// min(base * 2^attempt, max)
fn backoff_delay(config: &SupervisorConfig, attempt: u32) -> Duration {
    let factor = 1u64 << attempt.min(20);
    config
        .base_retry_delay
        .checked_mul(factor as u32)
        .map(|d| d.min(config.max_retry_delay))
        .unwrap_or(config.max_retry_delay)
}

enum StreamEnd {
    Eof,
    Cancelled,
}

/// Opens the detection stream and processes frames until EOF, error or
/// cancellation. Frames are handled in receive order.
async fn run_stream_once(
    camera_id: i64,
    stream_url: &str,
    cancel: &CancellationToken,
    ai_client: &Arc<dyn AiVisionClient>,
    recognition: &Arc<RecognitionService>,
    event_bus: &Arc<EventBus>,
) -> Result<StreamEnd, AiClientError> {
    let mut stream = ai_client.open_camera_stream(camera_id, stream_url).await?;
    let mut faceless_frames: u64 = 0;

    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => return Ok(StreamEnd::Cancelled),
            frame = stream.next() => frame,
        };

        let frame = match frame {
            None => return Ok(StreamEnd::Eof),
            Some(Err(e)) => return Err(e),
            Some(Ok(frame)) => frame,
        };

        if frame.faces.is_empty() {
            faceless_frames += 1;
            if faceless_frames % HEARTBEAT_FRAME_INTERVAL == 0 {
                debug!(camera_id, frame_id = frame.frame_id, "Camera stream heartbeat");
                counter!("camera_stream_heartbeats_total", "camera_id" => camera_id.to_string())
                    .increment(1);
            }
            continue;
        }
        faceless_frames = 0;

        for face in &frame.faces {
            let result = recognition
                .verify_embedding(&face.embedding, &frame.camera_id)
                .await;

            if result.is_match {
                info!(
                    camera_id,
                    frame_id = frame.frame_id,
                    user_id = ?result.user_id,
                    similarity = result.similarity,
                    "Face matched on stream"
                );
                if let (Some(user_id), Some(profile_id)) = (result.user_id, result.profile_id) {
                    event_bus.publish(DomainEvent::FaceMatched(FaceMatchedEvent {
                        camera_id,
                        frame_id: frame.frame_id,
                        user_id,
                        profile_id,
                        similarity: result.similarity,
                        timestamp: Utc::now(),
                    }));
                }
            } else {
                debug!(
                    camera_id,
                    frame_id = frame.frame_id,
                    similarity = result.similarity,
                    "Face observed without match"
                );
            }
        }
    }
}
