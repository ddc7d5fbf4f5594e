//! Database connection and pool management.

use std::path::Path;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::{Connection, PgPool};

use crate::config::DbConfig;
use crate::error::StartupError;
use crate::migrate::{MigrateError, MigrationOutcome, Migrator, SchemaState};

/// Upper bound on the startup liveness check.
pub const LIVENESS_TIMEOUT: Duration = Duration::from_secs(5);

/// Creates a database connection pool.
///
/// The pool is created lazily, so this only fails when the connection string
/// itself is unusable. Use [`verify_liveness`] to prove the server answers.
pub fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(LIVENESS_TIMEOUT)
        .connect_lazy(database_url)
}

/// Round-trips a ping on a pooled connection, bounded by `timeout`.
pub async fn verify_liveness(pool: &PgPool, timeout: Duration) -> Result<(), StartupError> {
    let ping = async {
        let mut conn = pool.acquire().await?;
        conn.ping().await
    };

    match tokio::time::timeout(timeout, ping).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(StartupError::ConnectionLiveness(e)),
        Err(_) => Err(StartupError::LivenessTimeout(timeout)),
    }
}

/// Opens a pool for `config` and verifies it is live.
///
/// On a failed liveness check the pool is closed before returning.
pub async fn connect(config: &DbConfig) -> Result<PgPool, StartupError> {
    let pool = create_pool(&config.dsn()).map_err(StartupError::ConnectionOpen)?;

    if let Err(e) = verify_liveness(&pool, LIVENESS_TIMEOUT).await {
        pool.close().await;
        return Err(e);
    }

    tracing::info!(target_db = %config.display_target(), "Connected to database");
    Ok(pool)
}

/// Runs all pending migrations from `migrations_dir` and logs the outcome.
pub async fn run_migrations(
    pool: &PgPool,
    migrations_dir: &Path,
) -> Result<MigrationOutcome, MigrateError> {
    let outcome = Migrator::new(migrations_dir).apply_all(pool).await?;
    log_outcome(&outcome);
    Ok(outcome)
}

fn log_outcome(outcome: &MigrationOutcome) {
    match outcome {
        MigrationOutcome::Skipped => {
            tracing::info!("No migration files found, skipping migrations");
        }
        MigrationOutcome::Completed { state, applied } => match state {
            SchemaState::Dirty(version) => {
                tracing::warn!("Database is in dirty state at version {}", version);
            }
            SchemaState::Clean(version) => {
                tracing::info!(
                    applied = applied.len(),
                    "Migrations completed. Current version: {}",
                    version
                );
            }
            SchemaState::Unversioned => {
                tracing::info!("No migrations applied yet");
            }
        },
    }
}
