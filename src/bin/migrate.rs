//! Standalone Migration Runner
//!
//! Applies pending database migrations and exits.

use anyhow::Result;
use facewatch_backend::database::{create_pool, run_migrations};
use facewatch_backend::AppConfig;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let config = AppConfig::load()?;
    let pool = create_pool(&config.database_url).await?;
    run_migrations(&pool).await?;

    info!("Database is up to date");
    Ok(())
}
