use std::{env, fmt::Display, str::FromStr};

use crate::{constants::DEFAULT_PAGE_SIZE, error::ServiceError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub jwt_secret: String,
    pub page_size: i64,
    pub max_connections: u32,
}

impl Config {
    pub fn load() -> Result<Self, ServiceError> {
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Builds the configuration from any variable source. Only the session
    /// secret has no default.
    pub fn from_vars<F>(lookup: F) -> Result<Self, ServiceError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let jwt_secret = lookup("JWT_SECRET")
            .filter(|secret| !secret.is_empty())
            .ok_or_else(|| ServiceError::Internal(String::from("JWT_SECRET is not set")))?;

        Ok(Self {
            database_url: try_load(&lookup, "DATABASE_URL", "postgres://localhost/foodgram")?,
            redis_url: try_load(&lookup, "REDIS_URL", "redis://127.0.0.1/")?,
            jwt_secret,
            page_size: try_load(&lookup, "PAGE_SIZE", &DEFAULT_PAGE_SIZE.to_string())?,
            max_connections: try_load(&lookup, "DB_MAX_CONNECTIONS", "5")?,
        })
    }
}

fn try_load<F, T>(lookup: &F, key: &str, default: &str) -> Result<T, ServiceError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    lookup(key)
        .unwrap_or_else(|| {
            log::warn!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e| ServiceError::Internal(format!("Invalid {key} value: {e}")))
}
