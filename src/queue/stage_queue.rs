//! Redis-based stage queue with reliable dequeue and delayed retry.
//!
//! Each stage queue uses four Redis keys:
//!
//! - `{name}`: main list where messages are enqueued
//! - `{name}:processing`: messages being processed (for crash recovery)
//! - `{name}:delayed`: sorted set of messages scheduled for retry, scored by
//!   their due time in epoch milliseconds
//! - `{name}:dead_letter`: messages that exhausted their attempt budget
//!
//! Messages are atomically moved from the main list to the processing list
//! via BRPOPLPUSH. A failed handler requeues the message into the delayed
//! set with a stage-specific delay; due messages are promoted back onto the
//! main list before each dequeue.

use std::marker::PhantomData;
use std::time::Duration;

use chrono::Utc;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use super::envelope::Envelope;
use super::{MessageSink, QueueError};

/// Maximum number of delayed messages promoted per dequeue cycle.
const PROMOTE_BATCH: isize = 100;

/// Redis-backed queue for one pipeline stage.
pub struct StageQueue<T> {
    /// Redis connection manager (handles reconnection automatically).
    redis: ConnectionManager,
    /// Name of the main list.
    queue_name: String,
    /// Name of the processing list.
    processing_queue: String,
    /// Name of the delayed sorted set.
    delayed_queue: String,
    /// Name of the dead letter list.
    dead_letter_queue: String,
    /// Attempt budget applied to newly enqueued messages.
    default_max_attempts: u32,
    _payload: PhantomData<fn() -> T>,
}

impl<T> StageQueue<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Connects to Redis and creates a new stage queue.
    pub async fn connect(redis_url: &str, queue_name: &str) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| QueueError::ConnectionFailed(e.to_string()))?;

        let redis = ConnectionManager::new(client)
            .await
            .map_err(|e| QueueError::ConnectionFailed(e.to_string()))?;

        Ok(Self::from_connection(redis, queue_name))
    }

    /// Creates a stage queue from an existing connection manager.
    ///
    /// Useful when sharing a connection pool across the pipeline's queues.
    pub fn from_connection(redis: ConnectionManager, queue_name: &str) -> Self {
        Self {
            redis,
            queue_name: queue_name.to_string(),
            processing_queue: format!("{}:processing", queue_name),
            delayed_queue: format!("{}:delayed", queue_name),
            dead_letter_queue: format!("{}:dead_letter", queue_name),
            default_max_attempts: super::DEFAULT_MAX_ATTEMPTS,
            _payload: PhantomData,
        }
    }

    /// Sets the attempt budget for newly enqueued messages.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.default_max_attempts = max_attempts;
        self
    }

    /// Enqueues a message envelope.
    ///
    /// Envelopes are added to the left of the list (LPUSH) and dequeued from
    /// the right in FIFO order.
    pub async fn enqueue(&self, envelope: Envelope<T>) -> Result<(), QueueError> {
        let serialized = serde_json::to_string(&envelope)?;
        let mut conn = self.redis.clone();
        conn.lpush::<_, _, ()>(&self.queue_name, serialized).await?;
        Ok(())
    }

    /// Schedules a message envelope for delivery after `delay`.
    pub async fn enqueue_delayed(
        &self,
        envelope: Envelope<T>,
        delay: Duration,
    ) -> Result<(), QueueError> {
        let serialized = serde_json::to_string(&envelope)?;
        let due_at = Utc::now().timestamp_millis() + delay.as_millis() as i64;

        let mut conn = self.redis.clone();
        conn.zadd::<_, _, _, ()>(&self.delayed_queue, serialized, due_at)
            .await?;
        Ok(())
    }

    /// Dequeues the next message, blocking until one is available or timeout.
    ///
    /// Messages whose retry delay has elapsed are promoted onto the main
    /// list first, then BRPOPLPUSH atomically moves the next message to the
    /// processing list so it can be recovered if the worker crashes.
    pub async fn dequeue(&self, timeout: Duration) -> Result<Option<Envelope<T>>, QueueError> {
        self.promote_due().await?;

        let mut conn = self.redis.clone();
        let timeout_secs = timeout.as_secs().max(1) as usize;

        let result: Option<String> = redis::cmd("BRPOPLPUSH")
            .arg(&self.queue_name)
            .arg(&self.processing_queue)
            .arg(timeout_secs)
            .query_async(&mut conn)
            .await?;

        match result {
            Some(data) => {
                let envelope: Envelope<T> = serde_json::from_str(&data)?;
                Ok(Some(envelope))
            }
            None => Ok(None),
        }
    }

    /// Acknowledges a message, removing it from the processing list.
    ///
    /// Called only after the stage handler has fully succeeded, so a crash
    /// before this point leaves the message recoverable.
    pub async fn ack(&self, envelope: &Envelope<T>) -> Result<(), QueueError> {
        self.remove_from_processing(envelope.id).await
    }

    /// Requeues a message for retry after `delay`.
    ///
    /// The envelope's attempt counter should already be incremented for the
    /// delivery that failed.
    pub async fn retry(&self, envelope: Envelope<T>, delay: Duration) -> Result<(), QueueError> {
        self.remove_from_processing(envelope.id).await?;
        self.enqueue_delayed(envelope, delay).await
    }

    /// Moves a message to the dead letter list after exhausting its budget.
    pub async fn dead_letter(&self, envelope: Envelope<T>, error: &str) -> Result<(), QueueError> {
        self.remove_from_processing(envelope.id).await?;

        let entry = serde_json::json!({
            "message": envelope,
            "error": error,
            "movedAt": Utc::now().to_rfc3339(),
        });
        let serialized = serde_json::to_string(&entry)?;

        let mut conn = self.redis.clone();
        conn.lpush::<_, _, ()>(&self.dead_letter_queue, serialized)
            .await?;
        Ok(())
    }

    /// Promotes delayed messages whose due time has passed onto the main
    /// list. Returns the number promoted.
    pub async fn promote_due(&self) -> Result<usize, QueueError> {
        let mut conn = self.redis.clone();
        let now = Utc::now().timestamp_millis();

        let due: Vec<String> = conn
            .zrangebyscore_limit(&self.delayed_queue, "-inf", now, 0, PROMOTE_BATCH)
            .await?;

        let mut promoted = 0;
        for raw in due {
            // Atomic remove-and-push so a concurrent promoter cannot deliver
            // the same message twice.
            let mut pipe = redis::pipe();
            pipe.atomic()
                .zrem(&self.delayed_queue, &raw)
                .rpush(&self.queue_name, &raw);
            let (removed, _len): (i64, i64) = pipe.query_async(&mut conn).await?;
            if removed > 0 {
                promoted += 1;
            }
        }

        Ok(promoted)
    }

    /// Recovers messages stuck in the processing list.
    ///
    /// Called on worker startup to requeue messages from workers that
    /// crashed mid-delivery. Returns the number recovered.
    pub async fn recover_processing(&self) -> Result<usize, QueueError> {
        let mut conn = self.redis.clone();
        let mut recovered = 0;

        let entries: Vec<String> = conn.lrange(&self.processing_queue, 0, -1).await?;

        for raw in entries {
            if let Ok(mut envelope) = serde_json::from_str::<Envelope<T>>(&raw) {
                envelope.increment_attempts();

                if envelope.should_retry() {
                    let serialized = serde_json::to_string(&envelope)?;

                    let mut pipe = redis::pipe();
                    pipe.atomic()
                        .lrem(&self.processing_queue, 1, &raw)
                        .rpush(&self.queue_name, &serialized);
                    pipe.query_async::<_, ()>(&mut conn).await?;

                    recovered += 1;
                } else {
                    self.dead_letter(envelope, "Recovered from processing list after max attempts")
                        .await?;
                }
            }
        }

        Ok(recovered)
    }

    /// Returns the number of messages waiting on the main list.
    pub async fn len(&self) -> Result<usize, QueueError> {
        let mut conn = self.redis.clone();
        let len: usize = conn.llen(&self.queue_name).await?;
        Ok(len)
    }

    /// Returns the number of messages currently being processed.
    pub async fn processing_len(&self) -> Result<usize, QueueError> {
        let mut conn = self.redis.clone();
        let len: usize = conn.llen(&self.processing_queue).await?;
        Ok(len)
    }

    /// Returns the number of messages waiting on a retry delay.
    pub async fn delayed_len(&self) -> Result<usize, QueueError> {
        let mut conn = self.redis.clone();
        let len: usize = conn.zcard(&self.delayed_queue).await?;
        Ok(len)
    }

    /// Returns the number of dead-lettered messages.
    pub async fn dead_letter_len(&self) -> Result<usize, QueueError> {
        let mut conn = self.redis.clone();
        let len: usize = conn.llen(&self.dead_letter_queue).await?;
        Ok(len)
    }

    /// Returns whether the main list is empty.
    pub async fn is_empty(&self) -> Result<bool, QueueError> {
        Ok(self.len().await? == 0)
    }

    /// Returns queue statistics.
    pub async fn stats(&self) -> Result<QueueStats, QueueError> {
        let (pending, processing, delayed, dead_letter) = tokio::try_join!(
            self.len(),
            self.processing_len(),
            self.delayed_len(),
            self.dead_letter_len()
        )?;

        Ok(QueueStats {
            queue_name: self.queue_name.clone(),
            pending,
            processing,
            delayed,
            dead_letter,
        })
    }

    /// Peeks at dead-lettered entries without removing them.
    pub async fn peek_dead_letter(
        &self,
        limit: usize,
    ) -> Result<Vec<serde_json::Value>, QueueError> {
        let mut conn = self.redis.clone();
        let data: Vec<String> = conn
            .lrange(&self.dead_letter_queue, 0, limit as isize - 1)
            .await?;

        let entries: Result<Vec<serde_json::Value>, _> =
            data.iter().map(|s| serde_json::from_str(s)).collect();

        Ok(entries?)
    }

    /// Clears all four lists for this stage.
    ///
    /// **Warning**: This permanently deletes all messages. Use with caution.
    pub async fn clear(&self) -> Result<(), QueueError> {
        let mut conn = self.redis.clone();

        let mut pipe = redis::pipe();
        pipe.del(&self.queue_name)
            .del(&self.processing_queue)
            .del(&self.delayed_queue)
            .del(&self.dead_letter_queue);
        pipe.query_async::<_, ()>(&mut conn).await?;

        Ok(())
    }

    /// Returns the queue name.
    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    /// Helper to remove a message from the processing list by id.
    async fn remove_from_processing(&self, message_id: Uuid) -> Result<(), QueueError> {
        let mut conn = self.redis.clone();

        let entries: Vec<String> = conn.lrange(&self.processing_queue, 0, -1).await?;

        for raw in entries {
            if let Ok(envelope) = serde_json::from_str::<Envelope<T>>(&raw) {
                if envelope.id == message_id {
                    conn.lrem::<_, _, ()>(&self.processing_queue, 1, &raw)
                        .await?;
                    return Ok(());
                }
            }
        }

        // Not found is not an error - the message may already be removed.
        Ok(())
    }
}

#[async_trait::async_trait]
impl<T> MessageSink<T> for StageQueue<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn send(&self, message: T) -> Result<(), QueueError> {
        let envelope = Envelope::new(message).with_max_attempts(self.default_max_attempts);
        self.enqueue(envelope).await
    }
}

/// Statistics about one stage queue.
#[derive(Debug, Clone)]
pub struct QueueStats {
    /// Name of the queue.
    pub queue_name: String,
    /// Messages waiting to be processed.
    pub pending: usize,
    /// Messages currently being processed.
    pub processing: usize,
    /// Messages waiting out a retry delay.
    pub delayed: usize,
    /// Messages that exhausted their attempt budget.
    pub dead_letter: usize,
}

impl QueueStats {
    /// Total messages across all lists for this stage.
    pub fn total(&self) -> usize {
        self.pending + self.processing + self.delayed + self.dead_letter
    }
}
