//! Queue infrastructure for the brief pipeline.
//!
//! Each stage consumes from its own Redis-backed queue and forwards a minimal
//! hand-off message to the next stage's queue:
//!
//! ```text
//!  scheduler ──> jobs ──> orchestrator ──> fetch ──> data fetcher
//!      ──> script ──> script generator ──> audio ──> audio generator
//!      ──> upload ──> uploader
//! ```
//!
//! Messages travel inside an [`Envelope`] carrying delivery metadata. A
//! message is acknowledged only after its handler succeeds; failures requeue
//! the whole message after a stage-specific delay until the attempt budget is
//! exhausted, at which point it moves to the dead-letter list.

pub mod envelope;
pub mod memory;
pub mod stage_queue;
pub mod worker;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

pub use envelope::{Envelope, DEFAULT_MAX_ATTEMPTS};
pub use memory::MemorySink;
pub use stage_queue::{QueueStats, StageQueue};
pub use worker::{MessageContext, PoolError, Stage, WorkerPool, WorkerPoolConfig, WorkerStats, DEFAULT_RETRY_DELAY};

/// Queue name for scheduler -> orchestrator messages.
pub const JOBS_QUEUE: &str = "jobs";
/// Queue name for orchestrator -> data fetcher messages.
pub const FETCH_QUEUE: &str = "fetch";
/// Queue name for data fetcher -> script generator messages.
pub const SCRIPT_QUEUE: &str = "script";
/// Queue name for script generator -> audio generator messages.
pub const AUDIO_QUEUE: &str = "audio";
/// Queue name for audio generator -> uploader messages.
pub const UPLOAD_QUEUE: &str = "upload";

/// Errors that can occur during queue operations.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Failed to connect to Redis.
    #[error("Redis connection failed: {0}")]
    ConnectionFailed(String),

    /// Redis operation failed.
    #[error("Redis operation failed: {0}")]
    Redis(#[from] redis::RedisError),

    /// Failed to serialize message data.
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Message could not be delivered to the queue.
    #[error("Send failed: {0}")]
    SendFailed(String),
}

/// Outbound side of a stage queue.
///
/// Stages hold this trait object rather than a concrete queue so tests can
/// substitute an in-memory sink.
#[async_trait]
pub trait MessageSink<T>: Send + Sync
where
    T: Serialize + Send + Sync + 'static,
{
    /// Enqueues a message for the downstream stage.
    async fn send(&self, message: T) -> Result<(), QueueError>;
}
