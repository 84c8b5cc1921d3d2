use identity_core::error::AppError;
use identity_core::observability::logging::init_tracing;
use identity_service::config::IdentityConfig;
use identity_service::services::Database;
use identity_service::{db, services};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Load configuration - fail fast if invalid
    let config = IdentityConfig::from_env()?;

    init_tracing(&config.common.service_name, &config.common.log_level);

    services::metrics::init_metrics();

    tracing::info!(
        service = %config.common.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        "Starting identity store"
    );

    let pool = db::create_pool(&config.database)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

    db::run_migrations(&pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;

    let database = Database::new(pool);
    database.health_check().await?;

    tracing::info!("Identity schema ready");

    Ok(())
}
