//! Fail-open cache for per-user todo lists.
//!
//! Two backends share one API:
//!
//! - **Local**: an in-process `DashMap` with per-entry expiry. Used when no
//!   Redis URL is configured, and in tests.
//! - **Redis**: a `deadpool-redis` pool; values are JSON bytes stored with
//!   `SETEX`.
//!
//! The public methods never return errors. A failed read is a miss and a
//! failed write or delete is a no-op; both are logged at `warn`. The store
//! stays the only source of truth.

pub mod keys;

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use dashmap::DashMap;
use deadpool_redis::{Config as RedisPoolConfig, Pool, Runtime};
use redis::AsyncCommands;
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

const SCAN_BATCH: usize = 100;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("failed to create Redis pool: {0}")]
    CreatePool(#[from] deadpool_redis::CreatePoolError),
    #[error("failed to get Redis connection: {0}")]
    Pool(#[from] deadpool_redis::PoolError),
    #[error("Redis command failed: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("cache value could not be (de)serialized: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A locally cached value and the instant it stops being served.
#[derive(Clone, Debug)]
pub struct CachedEntry {
    data: Arc<Vec<u8>>,
    expires_at: Instant,
}

impl CachedEntry {
    fn new(data: Vec<u8>, ttl: Duration) -> Self {
        Self {
            data: Arc::new(data),
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

#[derive(Clone)]
pub enum CacheBackend {
    Local(Arc<DashMap<String, CachedEntry>>),
    Redis(Pool),
}

impl CacheBackend {
    pub fn new_local() -> Self {
        CacheBackend::Local(Arc::new(DashMap::new()))
    }

    /// Builds a Redis-backed cache. The pool connects lazily, so an
    /// unreachable server only shows up as warnings on first use.
    pub fn new_redis(url: &str) -> Result<Self, CacheError> {
        let pool = RedisPoolConfig::from_url(url).create_pool(Some(Runtime::Tokio1))?;
        Ok(CacheBackend::Redis(pool))
    }

    pub fn mode(&self) -> &'static str {
        match self {
            CacheBackend::Local(_) => "local",
            CacheBackend::Redis(_) => "redis",
        }
    }

    /// Round-trips a PING; the local backend always answers.
    pub async fn ping(&self) -> Result<(), CacheError> {
        match self {
            CacheBackend::Local(_) => Ok(()),
            CacheBackend::Redis(pool) => {
                let mut conn = pool.get().await?;
                let _: String = redis::cmd("PING").query_async(&mut conn).await?;
                Ok(())
            }
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.try_get(key).await {
            Ok(Some(value)) => {
                tracing::debug!(key, mode = self.mode(), "cache hit");
                Some(value)
            }
            Ok(None) => {
                tracing::debug!(key, mode = self.mode(), "cache miss");
                None
            }
            Err(e) => {
                tracing::warn!(key, error = %e, "cache get failed, treating as miss");
                None
            }
        }
    }

    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        if let Err(e) = self.try_set(key, value, ttl).await {
            tracing::warn!(key, error = %e, "cache set failed");
        }
    }

    pub async fn delete(&self, key: &str) {
        if let Err(e) = self.try_delete(key).await {
            tracing::warn!(key, error = %e, "cache delete failed");
        }
    }

    /// Drops every entry namespaced under `user_id`.
    pub async fn delete_all_for_user(&self, user_id: i64) {
        let pattern = keys::user_pattern(user_id);
        match self.try_delete_matching(&pattern).await {
            Ok(removed) => tracing::debug!(user_id, removed, "user cache invalidated"),
            Err(e) => tracing::warn!(user_id, error = %e, "user cache invalidation failed"),
        }
    }

    async fn try_get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CacheError> {
        let bytes = match self {
            CacheBackend::Local(map) => {
                let hit = map.get(key).map(|entry| entry.clone());
                match hit {
                    Some(entry) if entry.is_expired() => {
                        map.remove(key);
                        None
                    }
                    Some(entry) => Some(entry.data.as_ref().clone()),
                    None => None,
                }
            }
            CacheBackend::Redis(pool) => {
                let mut conn = pool.get().await?;
                conn.get::<_, Option<Vec<u8>>>(key).await?
            }
        };
        match bytes {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn try_set<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let bytes = serde_json::to_vec(value)?;
        match self {
            CacheBackend::Local(map) => {
                map.insert(key.to_string(), CachedEntry::new(bytes, ttl));
            }
            CacheBackend::Redis(pool) => {
                let mut conn = pool.get().await?;
                // SETEX rejects a zero expiry
                let ttl_secs = ttl.as_secs().max(1);
                conn.set_ex::<_, _, ()>(key, bytes, ttl_secs).await?;
            }
        }
        Ok(())
    }

    async fn try_delete(&self, key: &str) -> Result<(), CacheError> {
        match self {
            CacheBackend::Local(map) => {
                map.remove(key);
            }
            CacheBackend::Redis(pool) => {
                let mut conn = pool.get().await?;
                conn.del::<_, ()>(key).await?;
            }
        }
        Ok(())
    }

    async fn try_delete_matching(&self, pattern: &str) -> Result<usize, CacheError> {
        match self {
            CacheBackend::Local(map) => {
                let before = map.len();
                map.retain(|key, _| !keys::matches(pattern, key));
                Ok(before.saturating_sub(map.len()))
            }
            CacheBackend::Redis(pool) => {
                let mut conn = pool.get().await?;
                let mut matched: Vec<String> = Vec::new();
                let mut cursor: u64 = 0;
                loop {
                    let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                        .arg(cursor)
                        .arg("MATCH")
                        .arg(pattern)
                        .arg("COUNT")
                        .arg(SCAN_BATCH)
                        .query_async(&mut conn)
                        .await?;
                    matched.extend(batch);
                    if next == 0 {
                        break;
                    }
                    cursor = next;
                }
                if !matched.is_empty() {
                    conn.del::<_, ()>(&matched).await?;
                }
                Ok(matched.len())
            }
        }
    }
}
