//! GoTasker Server - task-management API
//!
//! This crate provides the REST API server for GoTasker together with the
//! startup plumbing it depends on: environment configuration, the database
//! pool, and the directory-driven schema migrator.

pub mod config;
pub mod db;
pub mod error;
pub mod migrate;
pub mod models;
pub mod routes;
pub mod store;

pub use config::AppConfig;
pub use error::{AppError, StartupError};
pub use migrate::{MigrationOutcome, Migrator, SchemaState};
pub use routes::create_router;
