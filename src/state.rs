use std::sync::Arc;

use redis::aio::MultiplexedConnection;
use sqlx::{postgres::PgPoolOptions, Pool, Postgres};

use crate::{
    config::Config,
    error::{CacheError, ServiceError},
    jwt::{session_key, SessionKey},
};

/// Handles shared by every request.
#[derive(Clone)]
pub struct AppState {
    pub pool: Pool<Postgres>,
    pub cache: MultiplexedConnection,
    pub config: Arc<Config>,
    pub session_key: SessionKey,
}

impl AppState {
    pub async fn connect(config: Config) -> Result<Self, ServiceError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.database_url)
            .await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(sqlx::Error::from)?;
        log::info!("Database migrations applied");

        let client = redis::Client::open(config.redis_url.as_str()).map_err(CacheError::from)?;
        let cache = client
            .get_multiplexed_async_connection()
            .await
            .map_err(CacheError::from)?;

        let session_key = session_key(&config.jwt_secret)?;

        Ok(Self {
            pool,
            cache,
            config: Arc::new(config),
            session_key,
        })
    }
}
