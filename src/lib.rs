//! Multi-user to-do REST backend.
//!
//! Todos live in SQLite (via `sqlx`) and each user's full list is cached,
//! in Redis or in-process, behind a fail-open [`cache::CacheBackend`].
//! All todo routes require a bearer token issued by `/api/auth/*`.

pub mod auth;
pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod handler;
pub mod middleware;
pub mod model;
pub mod route;
pub mod schema;
pub mod service;
pub mod store;

use std::sync::Arc;

use axum::Router;
use sqlx::SqlitePool;
use thiserror::Error;

use crate::{
    auth::TokenKeys,
    cache::{CacheBackend, CacheError},
    config::{Config, ConfigError},
    service::TodoService,
    store::UserStore,
};

// Struct representing the application state, shared by every handler
pub struct AppState {
    pub config: Config,
    pub db: SqlitePool,
    pub cache: CacheBackend,
    pub users: UserStore,
    pub todos: TodoService,
    pub tokens: TokenKeys,
}

impl AppState {
    pub fn new(config: Config, db: SqlitePool, cache: CacheBackend) -> Self {
        Self {
            users: UserStore::new(db.clone()),
            todos: TodoService::new(db.clone(), cache.clone(), config.cache_ttl),
            tokens: TokenKeys::new(&config.jwt_secret, config.jwt_ttl),
            config,
            db,
            cache,
        }
    }
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database initialization failed: {0}")]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Picks the cache backend for `config`. Redis is pinged once; a failed
/// ping is logged and the backend is kept, since cache errors degrade to
/// misses rather than failing requests.
pub async fn create_cache_backend(config: &Config) -> Result<CacheBackend, CacheError> {
    let Some(url) = config.redis_url.as_deref() else {
        tracing::info!("no Redis URL configured, using local cache");
        return Ok(CacheBackend::new_local());
    };

    let cache = CacheBackend::new_redis(url)?;
    match cache.ping().await {
        Ok(()) => tracing::info!("connected to Redis"),
        Err(e) => tracing::warn!(error = %e, "Redis unreachable, continuing without cache hits"),
    }
    Ok(cache)
}

/// Connects the store, prepares the schema and cache, and returns the
/// fully layered router.
pub async fn build_app(config: Config) -> Result<Router, StartupError> {
    let pool = db::connect(&config.database_url, config.database_max_connections).await?;
    db::init_schema(&pool).await?;
    let cache = create_cache_backend(&config).await?;

    let app_state = Arc::new(AppState::new(config, pool, cache));
    Ok(route::create_router(app_state)?)
}
