use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::TaskStore;
use crate::models::{NewTask, Task, TaskUpdate};

/// In-process task store. Contents are lost on restart.
#[derive(Debug, Default)]
pub struct MemoryTaskStore {
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    next_id: i64,
    tasks: BTreeMap<i64, Task>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn list(&self) -> Result<Vec<Task>, sqlx::Error> {
        Ok(self.inner.read().await.tasks.values().cloned().collect())
    }

    async fn get(&self, id: i64) -> Result<Option<Task>, sqlx::Error> {
        Ok(self.inner.read().await.tasks.get(&id).cloned())
    }

    async fn create(&self, new_task: NewTask) -> Result<Task, sqlx::Error> {
        let mut inner = self.inner.write().await;
        inner.next_id += 1;

        let now = Utc::now();
        let task = Task {
            id: inner.next_id,
            title: new_task.title,
            description: new_task.description,
            completed_at: None,
            created_at: now,
            updated_at: now,
        };
        inner.tasks.insert(task.id, task.clone());
        Ok(task)
    }

    async fn update(&self, id: i64, update: TaskUpdate) -> Result<Option<Task>, sqlx::Error> {
        let mut inner = self.inner.write().await;
        let Some(task) = inner.tasks.get_mut(&id) else {
            return Ok(None);
        };

        if let Some(title) = update.title {
            task.title = title;
        }
        if let Some(description) = update.description {
            task.description = Some(description);
        }
        task.updated_at = Utc::now();
        Ok(Some(task.clone()))
    }

    async fn complete(&self, id: i64) -> Result<Option<Task>, sqlx::Error> {
        let mut inner = self.inner.write().await;
        let Some(task) = inner.tasks.get_mut(&id) else {
            return Ok(None);
        };

        let now = Utc::now();
        task.completed_at.get_or_insert(now);
        task.updated_at = now;
        Ok(Some(task.clone()))
    }

    async fn delete(&self, id: i64) -> Result<bool, sqlx::Error> {
        Ok(self.inner.write().await.tasks.remove(&id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_task(title: &str) -> NewTask {
        NewTask {
            title: title.to_string(),
            description: None,
        }
    }

    #[tokio::test]
    async fn test_ids_are_assigned_sequentially() {
        let store = MemoryTaskStore::new();
        let a = store.create(new_task("a")).await.unwrap();
        let b = store.create(new_task("b")).await.unwrap();
        assert_eq!(a.id, 1);
        assert_eq!(b.id, 2);
    }

    #[tokio::test]
    async fn test_ids_are_not_reused_after_delete() {
        let store = MemoryTaskStore::new();
        let a = store.create(new_task("a")).await.unwrap();
        assert!(store.delete(a.id).await.unwrap());
        let b = store.create(new_task("b")).await.unwrap();
        assert_eq!(b.id, 2);
    }

    #[tokio::test]
    async fn test_list_is_ordered_by_id() {
        let store = MemoryTaskStore::new();
        for title in ["x", "y", "z"] {
            store.create(new_task(title)).await.unwrap();
        }
        let ids: Vec<i64> = store.list().await.unwrap().iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_update_leaves_missing_fields_untouched() {
        let store = MemoryTaskStore::new();
        let created = store
            .create(NewTask {
                title: "old".to_string(),
                description: Some("keep me".to_string()),
            })
            .await
            .unwrap();

        let updated = store
            .update(
                created.id,
                TaskUpdate {
                    title: Some("new".to_string()),
                    description: None,
                },
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(updated.title, "new");
        assert_eq!(updated.description.as_deref(), Some("keep me"));
        assert!(updated.updated_at >= created.updated_at);
    }

    #[tokio::test]
    async fn test_complete_keeps_first_timestamp() {
        let store = MemoryTaskStore::new();
        let task = store.create(new_task("a")).await.unwrap();

        let first = store.complete(task.id).await.unwrap().unwrap();
        let second = store.complete(task.id).await.unwrap().unwrap();
        assert!(first.is_completed());
        assert_eq!(first.completed_at, second.completed_at);
    }

    #[tokio::test]
    async fn test_missing_ids() {
        let store = MemoryTaskStore::new();
        assert!(store.get(99).await.unwrap().is_none());
        assert!(store.update(99, TaskUpdate::default()).await.unwrap().is_none());
        assert!(store.complete(99).await.unwrap().is_none());
        assert!(!store.delete(99).await.unwrap());
    }
}
