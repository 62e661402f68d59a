use std::time::Duration;

use sqlx::SqlitePool;

use crate::{
    cache::{keys, CacheBackend},
    error::ApiError,
    model::Todo,
    schema::{NewTodo, TodoPatch},
    store::TodoStore,
};

const NOT_FOUND: &str = "Todo not found";

/// Owner-scoped todo operations with a read-through list cache.
///
/// Reads of the full list go through the cache; single-row reads always hit
/// the store. Every successful mutation wipes the owner's cache namespace
/// before returning, so a list issued after the mutation completes sees it.
#[derive(Clone)]
pub struct TodoService {
    store: TodoStore,
    cache: CacheBackend,
    ttl: Duration,
}

impl TodoService {
    pub fn new(db: SqlitePool, cache: CacheBackend, ttl: Duration) -> Self {
        Self {
            store: TodoStore::new(db),
            cache,
            ttl,
        }
    }

    pub async fn list(&self, owner: i64) -> Result<Vec<Todo>, ApiError> {
        let key = keys::todo_list(owner);
        if let Some(todos) = self.cache.get::<Vec<Todo>>(&key).await {
            return Ok(todos);
        }

        let todos = self.store.list(owner).await?;
        self.cache.set(&key, &todos, self.ttl).await;
        Ok(todos)
    }

    pub async fn get(&self, owner: i64, id: i64) -> Result<Todo, ApiError> {
        self.store
            .find(owner, id)
            .await?
            .ok_or_else(|| ApiError::not_found(NOT_FOUND))
    }

    pub async fn create(&self, owner: i64, todo: NewTodo) -> Result<Todo, ApiError> {
        let id = self.store.insert(owner, &todo).await?;
        self.cache.delete_all_for_user(owner).await;
        tracing::debug!(owner, id, "todo created");

        // Re-read so server-side defaults (timestamps, flags) are reflected
        self.store
            .find(owner, id)
            .await?
            .ok_or_else(|| ApiError::internal(format!("todo {id} vanished after insert")))
    }

    pub async fn update(&self, owner: i64, id: i64, patch: TodoPatch) -> Result<Todo, ApiError> {
        if !self.store.exists(owner, id).await? {
            return Err(ApiError::not_found(NOT_FOUND));
        }
        if patch.is_empty() {
            return Err(ApiError::bad_request("No valid fields to update"));
        }

        let updated = self.store.update(owner, id, &patch).await?;
        self.cache.delete_all_for_user(owner).await;
        if updated == 0 {
            // Deleted between the ownership check and the write
            return Err(ApiError::not_found(NOT_FOUND));
        }
        tracing::debug!(owner, id, "todo updated");

        self.get(owner, id).await
    }

    pub async fn delete(&self, owner: i64, id: i64) -> Result<(), ApiError> {
        if self.store.delete(owner, id).await? == 0 {
            return Err(ApiError::not_found(NOT_FOUND));
        }
        self.cache.delete_all_for_user(owner).await;
        tracing::debug!(owner, id, "todo deleted");
        Ok(())
    }
}
