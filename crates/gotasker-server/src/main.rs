// GoTasker - task-management API server

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use sqlx::PgPool;

use gotasker_server::store::PgTaskStore;
use gotasker_server::{create_router, db, AppConfig, Migrator};

/// GoTasker - task-management API
#[derive(Debug, Parser)]
#[command(name = "gotasker")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run migrations and start the HTTP server (default)
    Serve,
    /// Apply pending migrations and exit
    Migrate,
    /// Print the tracked schema version
    Version,
    /// Overwrite the tracked schema version without running scripts
    Force {
        /// Version to record as clean; -1 clears the tracked state
        #[arg(allow_negative_numbers = true, value_parser = clap::value_parser!(i64).range(-1..))]
        version: i64,
    },
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli.command.unwrap_or(Commands::Serve)).await {
        tracing::error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run(command: Commands) -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("Failed to load configuration")?;
    let pool = db::connect(&config.database)
        .await
        .context("Failed to connect to database")?;

    let result = match command {
        Commands::Serve => handle_serve(&config, &pool).await,
        Commands::Migrate => handle_migrate(&config, &pool).await,
        Commands::Version => handle_version(&config, &pool).await,
        Commands::Force { version } => handle_force(&config, &pool, version).await,
    };

    pool.close().await;
    result
}

async fn handle_serve(config: &AppConfig, pool: &PgPool) -> anyhow::Result<()> {
    handle_migrate(config, pool).await?;

    let app = create_router(Arc::new(PgTaskStore::new(pool.clone())));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!("Starting GoTasker server on port {}", config.server.port);
    tracing::info!("Health check: http://localhost:{}/health", config.server.port);
    tracing::info!("API base: http://localhost:{}/api/v1", config.server.port);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Failed to start server")?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn handle_migrate(config: &AppConfig, pool: &PgPool) -> anyhow::Result<()> {
    db::run_migrations(pool, &config.migrations_dir)
        .await
        .context("Failed to run migrations")?;
    Ok(())
}

async fn handle_version(config: &AppConfig, pool: &PgPool) -> anyhow::Result<()> {
    let state = Migrator::new(&config.migrations_dir)
        .version(pool)
        .await
        .context("Failed to read migration state")?;
    println!("{}", state);
    Ok(())
}

async fn handle_force(config: &AppConfig, pool: &PgPool, version: i64) -> anyhow::Result<()> {
    let version = (version >= 0).then_some(version);
    Migrator::new(&config.migrations_dir)
        .force(pool, version)
        .await
        .context("Failed to force migration state")?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
