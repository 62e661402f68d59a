//! SQL access for users and their todos.
//!
//! Every todo query is scoped by `user_id` as well as `id`; a row owned by
//! someone else behaves exactly like a missing row.

use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use crate::{
    model::{Todo, User},
    schema::{NewTodo, TodoPatch},
};

const TODO_COLUMNS: &str = "id, title, description, is_completed, created_at, updated_at";
const NOW: &str = "strftime('%Y-%m-%dT%H:%M:%fZ', 'now')";

#[derive(Clone)]
pub struct UserStore {
    db: SqlitePool,
}

impl UserStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            "SELECT id, email, password_hash, created_at FROM users WHERE email = ?",
        )
        .bind(email)
        .fetch_optional(&self.db)
        .await
    }

    pub async fn create(&self, email: &str, password_hash: &str) -> Result<User, sqlx::Error> {
        sqlx::query_as::<_, User>(
            "INSERT INTO users (email, password_hash) VALUES (?, ?) \
             RETURNING id, email, password_hash, created_at",
        )
        .bind(email)
        .bind(password_hash)
        .fetch_one(&self.db)
        .await
    }
}

#[derive(Clone)]
pub struct TodoStore {
    db: SqlitePool,
}

impl TodoStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    // Newest first; ids break ties between rows created in the same instant
    pub async fn list(&self, owner: i64) -> Result<Vec<Todo>, sqlx::Error> {
        sqlx::query_as::<_, Todo>(&format!(
            "SELECT {TODO_COLUMNS} FROM todos WHERE user_id = ? ORDER BY created_at DESC, id DESC"
        ))
        .bind(owner)
        .fetch_all(&self.db)
        .await
    }

    pub async fn find(&self, owner: i64, id: i64) -> Result<Option<Todo>, sqlx::Error> {
        sqlx::query_as::<_, Todo>(&format!(
            "SELECT {TODO_COLUMNS} FROM todos WHERE id = ? AND user_id = ?"
        ))
        .bind(id)
        .bind(owner)
        .fetch_optional(&self.db)
        .await
    }

    pub async fn exists(&self, owner: i64, id: i64) -> Result<bool, sqlx::Error> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT id FROM todos WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(owner)
            .fetch_optional(&self.db)
            .await?;
        Ok(row.is_some())
    }

    /// Inserts a todo and returns its id.
    pub async fn insert(&self, owner: i64, todo: &NewTodo) -> Result<i64, sqlx::Error> {
        let result =
            sqlx::query("INSERT INTO todos (user_id, title, description) VALUES (?, ?, ?)")
                .bind(owner)
                .bind(&todo.title)
                .bind(&todo.description)
                .execute(&self.db)
                .await?;
        Ok(result.last_insert_rowid())
    }

    /// Writes only the fields present in `patch` and refreshes `updated_at`.
    /// Returns the number of rows touched (0 or 1).
    pub async fn update(&self, owner: i64, id: i64, patch: &TodoPatch) -> Result<u64, sqlx::Error> {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE todos SET ");
        {
            let mut set = builder.separated(", ");
            if let Some(title) = &patch.title {
                set.push("title = ").push_bind_unseparated(title.clone());
            }
            if let Some(description) = &patch.description {
                set.push("description = ").push_bind_unseparated(description.clone());
            }
            if let Some(is_completed) = patch.is_completed {
                set.push("is_completed = ").push_bind_unseparated(is_completed);
            }
            set.push(format!("updated_at = {NOW}"));
        }
        builder
            .push(" WHERE id = ")
            .push_bind(id)
            .push(" AND user_id = ")
            .push_bind(owner);

        let result = builder.build().execute(&self.db).await?;
        Ok(result.rows_affected())
    }

    pub async fn delete(&self, owner: i64, id: i64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM todos WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(owner)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected())
    }
}
