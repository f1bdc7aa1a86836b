use crate::error::StoreError;
use crate::store::{OrderedStore, PopOutcome};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use std::fmt;

/// Redis sorted-set implementation of [`OrderedStore`].
///
/// Regular commands share one multiplexed [`ConnectionManager`]. The
/// conditional pop opens its own connection because `WATCH` is scoped to the
/// connection that issued it.
#[derive(Clone)]
pub struct RedisStore {
    client: Client,
    manager: ConnectionManager,
}

impl fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStore").finish_non_exhaustive()
    }
}

impl RedisStore {
    pub async fn connect(redis_url: &str) -> Result<Self, StoreError> {
        let client = Client::open(redis_url).map_err(|e| {
            StoreError::Unavailable(format!("Failed to create Redis client: {}", e))
        })?;
        let manager = ConnectionManager::new(client.clone())
            .await
            .map_err(|e| StoreError::Unavailable(format!("Failed to connect to Redis: {}", e)))?;

        Ok(Self { client, manager })
    }
}

#[async_trait]
impl OrderedStore for RedisStore {
    async fn insert(&self, key: &str, member: &str, score: f64) -> Result<(), StoreError> {
        let mut conn = self.manager.clone();
        let _: i64 = conn.zadd(key, member, score).await?;
        Ok(())
    }

    async fn remove(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let mut conn = self.manager.clone();
        let removed: i64 = conn.zrem(key, member).await?;
        Ok(removed > 0)
    }

    async fn rank(&self, key: &str, member: &str) -> Result<Option<u64>, StoreError> {
        let mut conn = self.manager.clone();
        let rank: Option<u64> = conn.zrank(key, member).await?;
        Ok(rank)
    }

    async fn cardinality(&self, key: &str) -> Result<u64, StoreError> {
        let mut conn = self.manager.clone();
        let count: u64 = conn.zcard(key).await?;
        Ok(count)
    }

    async fn range(&self, key: &str, start: u64, stop: u64) -> Result<Vec<String>, StoreError> {
        let mut conn = self.manager.clone();
        let members: Vec<String> = conn
            .zrange(key, start as isize, stop as isize)
            .await?;
        Ok(members)
    }

    async fn pop_lowest(&self, key: &str) -> Result<PopOutcome, StoreError> {
        let mut conn = self.client.get_async_connection().await?;

        redis::cmd("WATCH")
            .arg(key)
            .query_async::<_, ()>(&mut conn)
            .await?;

        let head: Vec<String> = conn.zrange(key, 0, 0).await?;
        let Some(member) = head.into_iter().next() else {
            redis::cmd("UNWATCH")
                .query_async::<_, ()>(&mut conn)
                .await?;
            return Ok(PopOutcome::Empty);
        };

        // EXEC replies nil when the watched key changed after WATCH.
        let applied: Option<(i64,)> = redis::pipe()
            .atomic()
            .zrem(key, &member)
            .query_async(&mut conn)
            .await?;

        Ok(match applied {
            Some(_) => PopOutcome::Popped(member),
            None => PopOutcome::Conflict,
        })
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.manager.clone();
        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .map_err(|e| StoreError::Unavailable(format!("Ping failed: {}", e)))?;
        Ok(())
    }
}
