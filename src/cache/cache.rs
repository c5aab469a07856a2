use std::future::Future;

use redis::{aio::MultiplexedConnection, AsyncCommands, FromRedisValue, ToRedisArgs};
use redis_macros::{FromRedisValue, ToRedisArgs};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CacheError, ServiceError};

// Caching - keys

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum CacheKeyType {
    Tags,
    Ingredients,
}

impl CacheKeyType {
    pub fn new<T: ToString>(self, key: T) -> CacheKey {
        CacheKey {
            kind: self,
            value: key.to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheKey {
    kind: CacheKeyType,
    value: String,
}

impl CacheKey {
    pub fn lifetime(&self) -> CacheLifetime {
        match self.kind {
            CacheKeyType::Tags => CacheLifetime::BindTagCache,
            CacheKeyType::Ingredients => CacheLifetime::BindIngredientCache,
        }
    }
}

impl ToString for CacheKey {
    fn to_string(&self) -> String {
        match self.kind {
            CacheKeyType::Tags => format!("tags-{}", self.value),
            CacheKeyType::Ingredients => format!("ingredients-{}", self.value),
        }
    }
}

// Cache - binds

/// Every cached value remembers the bind key of its family at the time it
/// was stored. Rotating the bind key invalidates the whole family at once.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum CacheLifetime {
    BindTagCache,
    BindIngredientCache,
}

impl CacheLifetime {
    fn bind_key(&self) -> &'static str {
        match self {
            CacheLifetime::BindTagCache => "tag-cache-key",
            CacheLifetime::BindIngredientCache => "ingredient-cache-key",
        }
    }

    pub async fn get_cache_bind(
        &self,
        cache: &mut MultiplexedConnection,
    ) -> Result<Option<String>, ServiceError> {
        get_cache_value::<&str, String>(self.bind_key(), cache).await
    }

    /// Called after tag or ingredient writes.
    pub async fn rotate(&self, cache: &mut MultiplexedConnection) -> Result<(), ServiceError> {
        let bind = Uuid::new_v4().to_string();
        log::trace!("> Rotating {} to {bind}", self.bind_key());

        set_cache_value(self.bind_key(), bind, cache).await
    }
}

#[derive(Serialize, Deserialize, FromRedisValue, ToRedisArgs, Clone)]
pub struct RedisValue<T: Serialize + Send + Sync + Clone> {
    pub value: T,
    _lifetime: CacheLifetime,
    _bind: Option<String>,
}

impl<T: Serialize + Send + Sync + Clone + for<'a> Deserialize<'a>> RedisValue<T> {
    fn new(value: T, lifetime: CacheLifetime, bind: Option<String>) -> Self {
        Self {
            value,
            _lifetime: lifetime,
            _bind: bind,
        }
    }

    fn is_bound_to(&self, bind: &Option<String>) -> bool {
        self._bind == *bind
    }

    /// Serves `key` from redis while its bind is current, otherwise runs
    /// `callback` and stores the result. Redis failures fall back to the
    /// callback.
    ///
    /// The bind is read before `callback` runs, so a rotation that lands
    /// during the fetch leaves the stored value already stale.
    pub async fn get_or<F, Fut>(
        key: CacheKey,
        cache: &mut MultiplexedConnection,
        callback: F,
    ) -> Result<T, ServiceError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        let lifetime = key.lifetime();
        let bind = match lifetime.get_cache_bind(cache).await {
            Ok(bind) => bind,
            Err(e) => {
                log::error!("> Failed to read bind of {}: {e}", key.to_string());
                return callback().await;
            }
        };

        let cached = match get_cache_value::<String, RedisValue<T>>(key.to_string(), cache).await
        {
            Ok(value) => value,
            Err(e) => {
                log::error!("> Failed to read cached value {}: {e}", key.to_string());
                if let Err(e) = delete_cache_value(key.to_string(), cache).await {
                    log::error!("> Failed to delete cached value! {e}");
                }
                None
            }
        };

        if let Some(value) = cached {
            if value.is_bound_to(&bind) {
                log::trace!("> Found {:?}", key.to_string());
                return Ok(value.value);
            }
            log::trace!("> Invalidated {:?}", key.to_string());
        }

        log::trace!("> Fetching {:?}", key.to_string());
        let value = callback().await?;

        let stored = RedisValue::new(value.clone(), lifetime, bind);
        if let Err(e) = set_cache_value(key.to_string(), stored, cache).await {
            log::error!("> Failed to cache {}: {e}", key.to_string());
        }

        Ok(value)
    }
}

// Cache - raw handlers

pub async fn set_cache_value<K: ToRedisArgs + Send + Sync, V: ToRedisArgs + Send + Sync>(
    key: K,
    value: V,
    cache: &mut MultiplexedConnection,
) -> Result<(), ServiceError> {
    let _: () = cache
        .set(key, value)
        .await
        .map_err(|e| CacheError::from(e))?;

    Ok(())
}

pub async fn delete_cache_value<K: ToRedisArgs + Send + Sync>(
    key: K,
    cache: &mut MultiplexedConnection,
) -> Result<(), ServiceError> {
    let _: () = cache.del(key).await.map_err(|e| CacheError::from(e))?;

    Ok(())
}

pub async fn get_cache_value<K: ToRedisArgs + Send + Sync, V: FromRedisValue>(
    key: K,
    cache: &mut MultiplexedConnection,
) -> Result<Option<V>, ServiceError> {
    let value: Option<V> = cache.get(key).await.map_err(|e| CacheError::from(e))?;

    Ok(value)
}
