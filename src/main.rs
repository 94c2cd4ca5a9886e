//! Facewatch Backend - Face Recognition & Camera Monitoring Core
//!
//! Runtime subsystem of the physical-security platform: per-camera
//! stream supervision, the shared face-profile snapshot cache, the
//! recognition/matching pipeline and the incident manager.
//!
//! # Architecture
//!
//! This application follows Clean Architecture principles:
//! - **Domain**: Core business entities and rules
//! - **Application**: Services orchestrating the recognition core
//! - **Infrastructure**: External interfaces (DB, Redis, AI service)
//!
//! # References
//!
//! - Clean Architecture: https://blog.cleancoder.com/uncle-bob/2012/08/13/the-clean-architecture.html

mod application;
mod domain;
mod infrastructure;

use anyhow::Result;
use infrastructure::{config::AppConfig, runtime::Runtime};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    info!("Starting Facewatch Backend v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::load()?;
    let runtime = Runtime::new(config).await?;

    runtime.run().await
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "facewatch_backend=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
