//! Task persistence behind a trait so handlers can run without a database.

mod memory;
mod postgres;

pub use memory::MemoryTaskStore;
pub use postgres::PgTaskStore;

use async_trait::async_trait;

use crate::models::{NewTask, Task, TaskUpdate};

/// Storage operations for tasks.
///
/// Lookups by id return `None` (or `false` for deletes) when the task does not
/// exist. Every mutation refreshes `updated_at`.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// All tasks ordered by id.
    async fn list(&self) -> Result<Vec<Task>, sqlx::Error>;

    async fn get(&self, id: i64) -> Result<Option<Task>, sqlx::Error>;

    async fn create(&self, new_task: NewTask) -> Result<Task, sqlx::Error>;

    async fn update(&self, id: i64, update: TaskUpdate) -> Result<Option<Task>, sqlx::Error>;

    /// Marks a task complete. The first completion time is kept.
    async fn complete(&self, id: i64) -> Result<Option<Task>, sqlx::Error>;

    async fn delete(&self, id: i64) -> Result<bool, sqlx::Error>;
}
