use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use redis::{AsyncConnectionConfig, Cmd, FromRedisValue, aio::MultiplexedConnection};
use tokio::sync::RwLock;
use tracing::{info, warn};

/// 共享存储错误
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("shared store unavailable: {0}")]
    Unavailable(String),
    #[error("unable to encode record: {0}")]
    Encode(#[from] serde_json::Error),
}

/// 共享键值存储，按集合(hash)和字段读写 JSON 字符串
#[async_trait]
pub trait SharedStore: Send + Sync {
    async fn hget(&self, collection: &str, field: &str) -> Result<Option<String>, StoreError>;

    async fn hset(&self, collection: &str, field: &str, value: &str) -> Result<(), StoreError>;

    /// 删除不存在的字段不算错误
    async fn hdel(&self, collection: &str, field: &str) -> Result<(), StoreError>;

    async fn hexists(&self, collection: &str, field: &str) -> Result<bool, StoreError>;

    async fn hgetall(&self, collection: &str) -> Result<HashMap<String, String>, StoreError>;
}

struct Link {
    generation: u64,
    conn: MultiplexedConnection,
}

/// Redis 实现。连接断开后下一条命令会重连并重试一次
pub struct RedisStore {
    client: redis::Client,
    config: AsyncConnectionConfig,
    link: RwLock<Link>,
}

impl RedisStore {
    /// 建立连接并 PING 一次，连接失败直接返回错误
    pub async fn connect(
        url: &str,
        connect_timeout: Duration,
        response_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let config = AsyncConnectionConfig::new()
            .set_connection_timeout(connect_timeout)
            .set_response_timeout(response_timeout);

        let mut conn = client
            .get_multiplexed_async_connection_with_config(&config)
            .await?;

        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        tracing::debug!("Redis answered {} to PING", pong);

        Ok(Self {
            client,
            config,
            link: RwLock::new(Link {
                generation: 0,
                conn,
            }),
        })
    }

    async fn current(&self) -> (u64, MultiplexedConnection) {
        let link = self.link.read().await;
        (link.generation, link.conn.clone())
    }

    /// 只有 `seen` 仍是当前连接时才重连，并发失败的请求共用同一条新连接
    async fn reconnect(&self, seen: u64) -> Result<MultiplexedConnection, StoreError> {
        let mut link = self.link.write().await;
        if link.generation != seen {
            return Ok(link.conn.clone());
        }

        let conn = self
            .client
            .get_multiplexed_async_connection_with_config(&self.config)
            .await?;
        link.generation += 1;
        link.conn = conn.clone();
        info!("Reconnected to Redis (connection #{})", link.generation);
        Ok(conn)
    }

    async fn query<T: FromRedisValue>(&self, cmd: &Cmd) -> Result<T, StoreError> {
        let (generation, mut conn) = self.current().await;
        match cmd.query_async(&mut conn).await {
            Err(e) if e.is_io_error() => {
                warn!("Redis connection failed: {}, reconnecting", e);
                let mut conn = self.reconnect(generation).await?;
                Ok(cmd.query_async(&mut conn).await?)
            }
            result => Ok(result?),
        }
    }
}

#[async_trait]
impl SharedStore for RedisStore {
    async fn hget(&self, collection: &str, field: &str) -> Result<Option<String>, StoreError> {
        self.query(&Cmd::hget(collection, field)).await
    }

    async fn hset(&self, collection: &str, field: &str, value: &str) -> Result<(), StoreError> {
        let _: () = self.query(&Cmd::hset(collection, field, value)).await?;
        Ok(())
    }

    async fn hdel(&self, collection: &str, field: &str) -> Result<(), StoreError> {
        let _: () = self.query(&Cmd::hdel(collection, field)).await?;
        Ok(())
    }

    async fn hexists(&self, collection: &str, field: &str) -> Result<bool, StoreError> {
        self.query(&Cmd::hexists(collection, field)).await
    }

    async fn hgetall(&self, collection: &str) -> Result<HashMap<String, String>, StoreError> {
        self.query(&Cmd::hgetall(collection)).await
    }
}
