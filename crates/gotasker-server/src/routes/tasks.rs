//! Task endpoints.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::{NewTask, Task, TaskUpdate};
use crate::store::TaskStore;

/// Maximum title length in characters.
const MAX_TITLE_LENGTH: usize = 255;

type Store = Arc<dyn TaskStore>;

/// Request body for creating a task.
#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    pub title: String,
    pub description: Option<String>,
}

/// Request body for updating a task.
#[derive(Debug, Deserialize)]
pub struct UpdateTaskRequest {
    pub title: Option<String>,
    pub description: Option<String>,
}

/// Response for listing tasks.
#[derive(Debug, Serialize)]
pub struct ListTasksResponse {
    pub tasks: Vec<Task>,
}

/// Creates the tasks router.
pub fn router(store: Store) -> Router {
    Router::new()
        .route("/", get(list_tasks).post(create_task))
        .route(
            "/{id}",
            get(get_task).put(update_task).delete(delete_task),
        )
        .route("/{id}/complete", post(complete_task))
        .with_state(store)
}

/// GET /api/v1/tasks
async fn list_tasks(State(store): State<Store>) -> Result<Json<ListTasksResponse>, AppError> {
    let tasks = store.list().await?;
    Ok(Json(ListTasksResponse { tasks }))
}

/// POST /api/v1/tasks
///
/// Returns 201 with the stored task and a `Location` header.
async fn create_task(
    State(store): State<Store>,
    Json(req): Json<CreateTaskRequest>,
) -> Result<impl IntoResponse, AppError> {
    let new_task = NewTask {
        title: validate_title(&req.title)?,
        description: req.description,
    };

    let task = store.create(new_task).await?;
    tracing::debug!(id = task.id, "Task created");

    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, task.url_path())],
        Json(task),
    ))
}

/// GET /api/v1/tasks/{id}
async fn get_task(
    State(store): State<Store>,
    Path(id): Path<i64>,
) -> Result<Json<Task>, AppError> {
    store.get(id).await?.map(Json).ok_or_else(|| not_found(id))
}

/// PUT /api/v1/tasks/{id}
async fn update_task(
    State(store): State<Store>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateTaskRequest>,
) -> Result<Json<Task>, AppError> {
    let update = TaskUpdate {
        title: req.title.as_deref().map(validate_title).transpose()?,
        description: req.description,
    };

    store
        .update(id, update)
        .await?
        .map(Json)
        .ok_or_else(|| not_found(id))
}

/// POST /api/v1/tasks/{id}/complete
async fn complete_task(
    State(store): State<Store>,
    Path(id): Path<i64>,
) -> Result<Json<Task>, AppError> {
    store.complete(id).await?.map(Json).ok_or_else(|| not_found(id))
}

/// DELETE /api/v1/tasks/{id}
async fn delete_task(
    State(store): State<Store>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    if store.delete(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found(id))
    }
}

/// Trims the title and rejects blank or oversized values.
fn validate_title(title: &str) -> Result<String, AppError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(AppError::BadRequest("title is required".to_string()));
    }
    if title.chars().count() > MAX_TITLE_LENGTH {
        return Err(AppError::BadRequest(format!(
            "title exceeds maximum length of {} characters",
            MAX_TITLE_LENGTH
        )));
    }
    Ok(title.to_string())
}

fn not_found(id: i64) -> AppError {
    AppError::NotFound(format!("Task {} not found", id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_title_trims() {
        assert_eq!(validate_title("  Buy milk \n").unwrap(), "Buy milk");
    }

    #[test]
    fn test_validate_title_rejects_blank() {
        assert!(matches!(validate_title(""), Err(AppError::BadRequest(_))));
        assert!(matches!(validate_title("   "), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn test_validate_title_length_limit() {
        assert!(validate_title(&"a".repeat(MAX_TITLE_LENGTH)).is_ok());
        assert!(validate_title(&"a".repeat(MAX_TITLE_LENGTH + 1)).is_err());
    }

    #[test]
    fn test_not_found_message() {
        assert_eq!(not_found(4).to_string(), "Not found: Task 4 not found");
    }
}
