//! Redis

use crate::store::QueueStore;
use crate::DispatchError;
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::time::Duration;
use tracing::{debug, info};

/// Queue store backed by Redis lists.
///
/// Lists outlive the processes that use them but not a Redis restart
/// (unless the server itself persists).
#[derive(Clone)]
pub struct RedisStore {
    conn: MultiplexedConnection,
}

impl RedisStore {
    /// Connect to the Redis server at `url`
    pub async fn connect(url: &str) -> crate::Result<Self> {
        let client = redis::Client::open(url).map_err(unavailable)?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(unavailable)?;
        info!("Connected to Redis at {}", url);
        Ok(Self { conn })
    }
}

fn unavailable(err: redis::RedisError) -> DispatchError {
    DispatchError::StoreUnavailable(err.to_string())
}

#[async_trait]
impl QueueStore for RedisStore {
    async fn push(&self, queue: &str, entry: String) -> crate::Result<usize> {
        let mut conn = self.conn.clone();
        let len: usize = conn.lpush(queue, entry).await.map_err(unavailable)?;
        debug!("Pushed entry to {} (length {})", queue, len);
        Ok(len)
    }

    async fn pop(&self, queue: &str, timeout: Duration) -> crate::Result<Option<String>> {
        let mut conn = self.conn.clone();
        if timeout.is_zero() {
            // BRPOP treats 0 as "block forever"
            return conn.rpop(queue, None).await.map_err(unavailable);
        }
        let popped: Option<(String, String)> = conn
            .brpop(queue, timeout.as_secs_f64())
            .await
            .map_err(unavailable)?;
        Ok(popped.map(|(_, entry)| entry))
    }

    async fn len(&self, queue: &str) -> crate::Result<usize> {
        let mut conn = self.conn.clone();
        conn.llen(queue).await.map_err(unavailable)
    }

    async fn range(&self, queue: &str, start: usize, count: usize) -> crate::Result<Vec<String>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.clone();
        let stop = (start + count - 1) as isize;
        conn.lrange(queue, start as isize, stop)
            .await
            .map_err(unavailable)
    }

    async fn ping(&self) -> bool {
        let mut conn = self.conn.clone();
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .is_ok()
    }
}
