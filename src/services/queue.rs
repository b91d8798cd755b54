use async_trait::async_trait;
use redis::AsyncCommands;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use uuid::Uuid;

/// Named FIFO lists of job ids. The queue only signals a worker that a job
/// row is ready; the row itself carries the input.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Append a job id to the tail of `queue`.
    async fn push(&self, queue: &str, job_id: Uuid) -> Result<(), QueueError>;

    /// Take the head of `queue` without blocking.
    async fn pop(&self, queue: &str) -> Result<Option<Uuid>, QueueError>;

    async fn depth(&self, queue: &str) -> Result<u64, QueueError>;

    /// Check connectivity (for health checks).
    async fn health_check(&self) -> Result<(), QueueError>;
}

/// Redis-backed queue: RPUSH to enqueue, LPOP to dequeue.
pub struct RedisQueue {
    client: redis::Client,
}

impl RedisQueue {
    pub fn new(redis_url: &str) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url).map_err(QueueError::Redis)?;
        Ok(Self { client })
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, QueueError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(QueueError::Redis)
    }
}

#[async_trait]
impl JobQueue for RedisQueue {
    async fn push(&self, queue: &str, job_id: Uuid) -> Result<(), QueueError> {
        let mut conn = self.connection().await?;
        conn.rpush::<_, _, ()>(queue, job_id.to_string())
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }

    async fn pop(&self, queue: &str) -> Result<Option<Uuid>, QueueError> {
        let mut conn = self.connection().await?;
        let entry: Option<String> = conn.lpop(queue, None).await.map_err(QueueError::Redis)?;
        entry.map(|raw| parse_entry(&raw)).transpose()
    }

    async fn depth(&self, queue: &str) -> Result<u64, QueueError> {
        let mut conn = self.connection().await?;
        let depth: u64 = conn.llen(queue).await.map_err(QueueError::Redis)?;
        Ok(depth)
    }

    async fn health_check(&self) -> Result<(), QueueError> {
        let mut conn = self.connection().await?;
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }
}

fn parse_entry(raw: &str) -> Result<Uuid, QueueError> {
    Uuid::parse_str(raw).map_err(|_| QueueError::InvalidEntry(raw.to_string()))
}

/// In-process queue for tests and local runs. Can be switched offline to
/// exercise delivery failures.
#[derive(Default)]
pub struct MemoryQueue {
    lists: Mutex<HashMap<String, VecDeque<Uuid>>>,
    offline: AtomicBool,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Snapshot of a queue's contents, head first.
    pub async fn entries(&self, queue: &str) -> Vec<Uuid> {
        let lists = self.lists.lock().await;
        lists
            .get(queue)
            .map(|list| list.iter().copied().collect())
            .unwrap_or_default()
    }

    fn ensure_online(&self) -> Result<(), QueueError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(QueueError::Unavailable)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl JobQueue for MemoryQueue {
    async fn push(&self, queue: &str, job_id: Uuid) -> Result<(), QueueError> {
        self.ensure_online()?;
        self.lists
            .lock()
            .await
            .entry(queue.to_string())
            .or_default()
            .push_back(job_id);
        Ok(())
    }

    async fn pop(&self, queue: &str) -> Result<Option<Uuid>, QueueError> {
        self.ensure_online()?;
        Ok(self
            .lists
            .lock()
            .await
            .get_mut(queue)
            .and_then(VecDeque::pop_front))
    }

    async fn depth(&self, queue: &str) -> Result<u64, QueueError> {
        self.ensure_online()?;
        Ok(self
            .lists
            .lock()
            .await
            .get(queue)
            .map_or(0, |list| list.len() as u64))
    }

    async fn health_check(&self) -> Result<(), QueueError> {
        self.ensure_online()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Queue entry is not a job id: {0}")]
    InvalidEntry(String),

    #[error("Queue unavailable")]
    Unavailable,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_queue_is_fifo_per_name() {
        let queue = MemoryQueue::new();
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

        queue.push("voice_clone", a).await.unwrap();
        queue.push("rag_ingest", b).await.unwrap();
        queue.push("voice_clone", c).await.unwrap();

        assert_eq!(queue.depth("voice_clone").await.unwrap(), 2);
        assert_eq!(queue.pop("voice_clone").await.unwrap(), Some(a));
        assert_eq!(queue.pop("voice_clone").await.unwrap(), Some(c));
        assert_eq!(queue.pop("voice_clone").await.unwrap(), None);
        assert_eq!(queue.pop("rag_ingest").await.unwrap(), Some(b));
    }

    #[tokio::test]
    async fn offline_queue_rejects_pushes() {
        let queue = MemoryQueue::new();
        queue.set_offline(true);
        assert!(matches!(
            queue.push("voice_clone", Uuid::new_v4()).await,
            Err(QueueError::Unavailable)
        ));
        assert!(queue.health_check().await.is_err());
        queue.set_offline(false);
        assert!(queue.health_check().await.is_ok());
    }

    #[test]
    fn non_uuid_entries_are_rejected() {
        assert!(matches!(
            parse_entry("job_123"),
            Err(QueueError::InvalidEntry(_))
        ));
    }
}
