//! Redis-backed cache client.

use async_trait::async_trait;
use redis::{AsyncCommands, Client as RedisClient, aio::MultiplexedConnection};
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use tracing::{info, instrument};

use crate::domain::{AppError, CacheClient, CacheError};

/// Cache client over a single multiplexed Redis connection.
///
/// The connection is cheap to clone; each call works on its own clone so
/// concurrent refreshes never wait on each other here.
pub struct RedisCacheClient {
    conn: MultiplexedConnection,
}

impl RedisCacheClient {
    pub async fn connect(url: &SecretString) -> Result<Self, AppError> {
        info!("Connecting to Redis...");
        let client = RedisClient::open(url.expose_secret())
            .map_err(|e| AppError::Cache(CacheError::Connection(e.to_string())))?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| AppError::Cache(CacheError::Connection(e.to_string())))?;
        info!("Connected to Redis");
        Ok(Self { conn })
    }
}

fn command_error(e: redis::RedisError) -> AppError {
    if e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() {
        AppError::Cache(CacheError::Connection(e.to_string()))
    } else {
        AppError::Cache(CacheError::Command(e.to_string()))
    }
}

#[async_trait]
impl CacheClient for RedisCacheClient {
    async fn health_check(&self) -> Result<(), AppError> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(command_error)?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, AppError> {
        let mut conn = self.conn.clone();
        conn.get(key).await.map_err(command_error)
    }

    #[instrument(skip(self, value), fields(bytes = value.len()))]
    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<(), AppError> {
        let mut conn = self.conn.clone();
        match ttl {
            Some(ttl) => conn
                .set_ex::<_, _, ()>(key, value, ttl.as_secs().max(1))
                .await
                .map_err(command_error),
            None => conn
                .set::<_, _, ()>(key, value)
                .await
                .map_err(command_error),
        }
    }

    #[instrument(skip(self))]
    async fn exists(&self, key: &str) -> Result<bool, AppError> {
        let mut conn = self.conn.clone();
        conn.exists(key).await.map_err(command_error)
    }

    #[instrument(skip(self))]
    async fn delete(&self, key: &str) -> Result<bool, AppError> {
        let mut conn = self.conn.clone();
        let removed: i64 = conn.del(key).await.map_err(command_error)?;
        Ok(removed > 0)
    }
}
