use std::{net::SocketAddr, time::Duration};

use axum::http::HeaderValue;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} has an invalid value: {value:?}")]
    Invalid { name: &'static str, value: String },
}

// Application configuration, read once at startup
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub development: bool,
    pub database_url: String,
    pub database_max_connections: u32,
    pub redis_url: Option<String>,
    pub cache_ttl: Duration,
    pub jwt_secret: String,
    pub jwt_ttl: Duration,
    pub password_hash_iterations: u32,
    pub cors_origin: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let redis_url = get("REDIS_URL").or_else(|| {
            get("REDIS_HOST").map(|host| {
                let port = get("REDIS_PORT").unwrap_or_else(|| "6379".to_string());
                format!("redis://{host}:{port}")
            })
        });

        let password_hash_iterations: u32 = parse_or(&get, "PASSWORD_HASH_ITERATIONS", 100_000)?;
        if password_hash_iterations == 0 {
            return Err(ConfigError::Invalid {
                name: "PASSWORD_HASH_ITERATIONS",
                value: "0".to_string(),
            });
        }

        let config = Self {
            host: get("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or(&get, "PORT", 5001)?,
            development: get("APP_ENV")
                .map(|env| env.eq_ignore_ascii_case("development"))
                .unwrap_or(false),
            database_url: get("DATABASE_URL").unwrap_or_else(|| "sqlite://todo.db".to_string()),
            database_max_connections: parse_or(&get, "DATABASE_MAX_CONNECTIONS", 10)?,
            redis_url,
            cache_ttl: Duration::from_secs(parse_or(&get, "CACHE_TTL_SECS", 3600)?),
            jwt_secret: get("JWT_SECRET").ok_or(ConfigError::Missing("JWT_SECRET"))?,
            jwt_ttl: Duration::from_secs(parse_or(&get, "JWT_EXPIRES_IN_SECS", 86_400)?),
            password_hash_iterations,
            cors_origin: get("CORS_ORIGIN").unwrap_or_else(|| "http://localhost:3000".to_string()),
        };
        config.cors_origin_header()?;
        Ok(config)
    }

    /// The single origin allowed by CORS. Credentials are allowed too, so a
    /// wildcard cannot be used.
    pub fn cors_origin_header(&self) -> Result<HeaderValue, ConfigError> {
        let invalid = || ConfigError::Invalid {
            name: "CORS_ORIGIN",
            value: self.cors_origin.clone(),
        };
        let origin = self.cors_origin.trim();
        if origin.contains('*') {
            return Err(invalid());
        }
        origin.parse::<HeaderValue>().map_err(|_| invalid())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let value = format!("{}:{}", self.host, self.port);
        value
            .parse()
            .map_err(|_| ConfigError::Invalid { name: "HOST", value })
    }
}

fn parse_or<T, G>(get: &G, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(name) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        None => Ok(default),
    }
}
