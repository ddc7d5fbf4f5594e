use async_trait::async_trait;
use sqlx::PgPool;

use super::TaskStore;
use crate::models::{NewTask, Task, TaskUpdate};

/// PostgreSQL-backed task store.
#[derive(Debug, Clone)]
pub struct PgTaskStore {
    pool: PgPool,
}

impl PgTaskStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TaskStore for PgTaskStore {
    async fn list(&self) -> Result<Vec<Task>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM tasks ORDER BY id")
            .fetch_all(&self.pool)
            .await
    }

    async fn get(&self, id: i64) -> Result<Option<Task>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM tasks WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn create(&self, new_task: NewTask) -> Result<Task, sqlx::Error> {
        sqlx::query_as(
            r#"
            INSERT INTO tasks (title, description, created_at, updated_at)
            VALUES ($1, $2, NOW(), NOW())
            RETURNING *
            "#,
        )
        .bind(&new_task.title)
        .bind(&new_task.description)
        .fetch_one(&self.pool)
        .await
    }

    async fn update(&self, id: i64, update: TaskUpdate) -> Result<Option<Task>, sqlx::Error> {
        sqlx::query_as(
            r#"
            UPDATE tasks
            SET title = COALESCE($2, title),
                description = COALESCE($3, description),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&update.title)
        .bind(&update.description)
        .fetch_optional(&self.pool)
        .await
    }

    async fn complete(&self, id: i64) -> Result<Option<Task>, sqlx::Error> {
        sqlx::query_as(
            r#"
            UPDATE tasks
            SET completed_at = COALESCE(completed_at, NOW()),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn delete(&self, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
