//! Task model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A task record as stored in the `tasks` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Task {
    /// Storage-assigned identifier.
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    /// When the task was completed (null while open).
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Data required to create a new task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
}

/// Partial update; `None` fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
}

impl Task {
    /// Returns true once the task has been completed.
    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }

    /// Returns the URL path for this task.
    pub fn url_path(&self) -> String {
        format!("/api/v1/tasks/{}", self.id)
    }
}
