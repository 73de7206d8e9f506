use crate::services::traits::{IdempotencyError, IdempotencyStore};
use async_trait::async_trait;
use moka::Expiry;
use redis::aio::ConnectionManager;
use std::time::{Duration, Instant};

const IN_FLIGHT: &str = "processing";
const PROCESSED: &str = "processed";

/// Shared idempotency store backed by Redis
///
/// Claims are a single `SET key processing NX PX ttl`, so concurrent
/// deliveries on different instances race on one atomic command.
pub struct RedisIdempotencyStore {
    redis: ConnectionManager,
}

impl RedisIdempotencyStore {
    pub async fn new(redis_url: &str) -> Result<Self, IdempotencyError> {
        let client = redis::Client::open(redis_url)?;
        let redis = ConnectionManager::new(client).await?;
        Ok(Self { redis })
    }
}

fn ttl_millis(ttl: Duration) -> u64 {
    (ttl.as_millis() as u64).max(1)
}

#[async_trait]
impl IdempotencyStore for RedisIdempotencyStore {
    async fn try_claim(&self, key: &str, ttl: Duration) -> Result<bool, IdempotencyError> {
        let mut conn = self.redis.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(IN_FLIGHT)
            .arg("NX")
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .await?;

        tracing::trace!("Idempotency claim {}: {}", key, reply.is_some());
        Ok(reply.is_some())
    }

    async fn mark_processed(&self, key: &str, ttl: Duration) -> Result<(), IdempotencyError> {
        let mut conn = self.redis.clone();
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(PROCESSED)
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn release(&self, key: &str) -> Result<(), IdempotencyError> {
        let mut conn = self.redis.clone();
        let _: () = redis::cmd("DEL").arg(key).query_async(&mut conn).await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MarkState {
    InFlight,
    Processed,
}

#[derive(Debug, Clone)]
struct Mark {
    state: MarkState,
    ttl: Duration,
}

struct MarkExpiry;

impl Expiry<String, Mark> for MarkExpiry {
    fn expire_after_create(&self, _key: &String, value: &Mark, _created_at: Instant) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &Mark,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// In-process idempotency store for single-instance deployments
///
/// Marks leave the store only when their own TTL runs out. There is no size
/// bound: evicting a processed mark early would let its event run twice.
/// `capacity` only pre-sizes the table.
pub struct MemoryIdempotencyStore {
    marks: moka::future::Cache<String, Mark>,
}

impl MemoryIdempotencyStore {
    pub fn new(capacity: u64) -> Self {
        let marks = moka::future::Cache::builder()
            .initial_capacity(usize::try_from(capacity).unwrap_or(usize::MAX))
            .expire_after(MarkExpiry)
            .build();
        Self { marks }
    }

    async fn state(&self, key: &str) -> Option<MarkState> {
        self.marks.get(key).await.map(|m| m.state)
    }
}

#[async_trait]
impl IdempotencyStore for MemoryIdempotencyStore {
    async fn try_claim(&self, key: &str, ttl: Duration) -> Result<bool, IdempotencyError> {
        let entry = self
            .marks
            .entry(key.to_string())
            .or_insert(Mark {
                state: MarkState::InFlight,
                ttl,
            })
            .await;
        Ok(entry.is_fresh())
    }

    async fn mark_processed(&self, key: &str, ttl: Duration) -> Result<(), IdempotencyError> {
        self.marks
            .insert(
                key.to_string(),
                Mark {
                    state: MarkState::Processed,
                    ttl,
                },
            )
            .await;
        Ok(())
    }

    async fn release(&self, key: &str) -> Result<(), IdempotencyError> {
        self.marks.invalidate(key).await;
        Ok(())
    }
}

/// Idempotency key builder
pub struct IdempotencyKey;

impl IdempotencyKey {
    /// Key for an inbound event. Only the sender's stable event id goes in:
    /// anything time-derived would let a redelivery through.
    pub fn event(event_id: &str) -> String {
        format!("lume:event:{}", event_id)
    }
}
