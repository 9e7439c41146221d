use std::time::Duration;

use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;
use tracing::info;

use crate::config::AppConfig;
use crate::errors::ServiceError;
use crate::migrator::Migrator;

/// Type alias for a database connection pool
pub type DbPool = DatabaseConnection;

/// Establishes a connection pool using the application configuration.
pub async fn establish_connection(cfg: &AppConfig) -> Result<DbPool, ServiceError> {
    let mut options = ConnectOptions::new(cfg.database_url.clone());
    options
        .max_connections(10)
        .min_connections(1)
        .connect_timeout(Duration::from_secs(30))
        .acquire_timeout(Duration::from_secs(8))
        .idle_timeout(Duration::from_secs(600))
        .sqlx_logging(cfg.is_development());

    let pool = Database::connect(options).await?;
    info!("database connection established");
    Ok(pool)
}

/// Applies all pending migrations.
pub async fn run_migrations(pool: &DbPool) -> Result<(), ServiceError> {
    Migrator::up(pool, None).await?;
    info!("database migrations applied");
    Ok(())
}
