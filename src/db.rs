use sqlx::{migrate::MigrateDatabase, sqlite::SqlitePoolOptions, Pool, Sqlite, SqlitePool};

const SCHEMA: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        email TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL,
        created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
    );"#,
    r#"CREATE TABLE IF NOT EXISTS todos (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        title TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        is_completed BOOLEAN NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
        updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
    );"#,
    "CREATE INDEX IF NOT EXISTS idx_todos_user_created ON todos (user_id, created_at);",
];

/// Opens the store pool, creating the database file first if needed.
///
/// An in-memory database lives only as long as its connection, so it is
/// pinned to a single connection that never idles out.
pub async fn connect(url: &str, max_connections: u32) -> Result<Pool<Sqlite>, sqlx::Error> {
    if !Sqlite::database_exists(url).await.unwrap_or(false) {
        tracing::info!(url, "creating database");
        Sqlite::create_database(url).await?;
    }

    let in_memory = url.contains(":memory:");
    let options = if in_memory {
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new().max_connections(max_connections)
    };

    let pool = options.connect(url).await?;
    tracing::info!(url, in_memory, "connected to database");
    Ok(pool)
}

pub async fn init_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    for statement in SCHEMA {
        sqlx::query(*statement).execute(pool).await?;
    }
    tracing::debug!("database schema ready");
    Ok(())
}

#[cfg(test)]
pub(crate) async fn test_pool() -> SqlitePool {
    let pool = connect("sqlite::memory:", 1).await.unwrap();
    init_schema(&pool).await.unwrap();
    pool
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn schema_init_is_idempotent() {
        let pool = test_pool().await;
        init_schema(&pool).await.unwrap();

        let tables: Vec<(String,)> =
            sqlx::query_as("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
                .fetch_all(&pool)
                .await
                .unwrap();
        let names: Vec<_> = tables.into_iter().map(|(name,)| name).collect();
        assert!(names.contains(&"users".to_string()));
        assert!(names.contains(&"todos".to_string()));
    }

    #[tokio::test]
    async fn deleting_a_user_cascades_to_todos() {
        let pool = test_pool().await;
        let user_id = sqlx::query("INSERT INTO users (email, password_hash) VALUES (?, ?)")
            .bind("a@example.com")
            .bind("hash")
            .execute(&pool)
            .await
            .unwrap()
            .last_insert_rowid();
        sqlx::query("INSERT INTO todos (user_id, title) VALUES (?, ?)")
            .bind(user_id)
            .bind("x")
            .execute(&pool)
            .await
            .unwrap();

        sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(user_id)
            .execute(&pool)
            .await
            .unwrap();

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM todos")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }
}
