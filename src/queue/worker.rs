//! Stage workers.
//!
//! A [`Stage`] is one unit of pipeline work bound to a queue. A
//! [`WorkerPool`] runs a configurable number of workers against that queue;
//! each worker dequeues an envelope, runs the stage handler, and either
//! acknowledges the message or requeues it with the stage's retry delay.
//! Messages that exhaust their attempt budget are dead-lettered after the
//! stage's `on_exhausted` hook runs.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::StageError;
use crate::metrics;

use super::envelope::Envelope;
use super::stage_queue::StageQueue;
use super::QueueError;

/// Default retry delay for orchestration- and fetch-class stages.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(60);

/// Errors that can occur in the worker pool.
#[derive(Debug, Error)]
pub enum PoolError {
    /// Queue operation failed.
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    /// Pool is already running.
    #[error("Pool is already running")]
    AlreadyRunning,

    /// Pool is not running.
    #[error("Pool is not running")]
    NotRunning,

    /// Shutdown timed out.
    #[error("Shutdown timed out after {0:?}")]
    ShutdownTimeout(Duration),
}

/// Delivery metadata exposed to stage handlers.
///
/// Carries the envelope identity a handler may need - most importantly the
/// orchestrator, which derives the job id from it so redelivery reproduces
/// the same id.
#[derive(Debug, Clone, Copy)]
pub struct MessageContext {
    /// Stable message identifier.
    pub message_id: Uuid,
    /// When the message was first enqueued.
    pub created_at: DateTime<Utc>,
    /// Delivery attempt number, starting at 1.
    pub attempt: u32,
}

impl MessageContext {
    /// Builds a context from an envelope at delivery time.
    pub fn for_envelope<T>(envelope: &Envelope<T>) -> Self {
        Self {
            message_id: envelope.id,
            created_at: envelope.created_at,
            attempt: envelope.attempts,
        }
    }
}

/// One pipeline stage: a typed message handler bound to a queue.
#[async_trait]
pub trait Stage: Send + Sync + 'static {
    /// The message payload this stage consumes.
    type Input: Serialize + DeserializeOwned + Clone + Send + Sync + 'static;

    /// Stage name, used for queue metrics and logging.
    fn name(&self) -> &'static str;

    /// Delay before a failed message is redelivered.
    fn retry_delay(&self) -> Duration {
        DEFAULT_RETRY_DELAY
    }

    /// Processes one message. The message is acknowledged only if this
    /// returns `Ok`; any error requeues the whole message.
    async fn handle(&self, ctx: &MessageContext, input: Self::Input) -> Result<(), StageError>;

    /// Called once when a message exhausts its attempt budget, before it is
    /// dead-lettered. Stages use this to mark the job failed.
    async fn on_exhausted(&self, _ctx: &MessageContext, _input: Self::Input) {}
}

/// Configuration for a stage worker pool.
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Number of worker tasks to spawn.
    pub num_workers: usize,
    /// How long a dequeue blocks waiting for a message.
    pub poll_interval: Duration,
    /// Timeout for graceful shutdown.
    pub shutdown_timeout: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            num_workers: 2,
            poll_interval: Duration::from_secs(1),
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl WorkerPoolConfig {
    /// Creates a configuration with the specified number of workers.
    pub fn new(num_workers: usize) -> Self {
        Self {
            num_workers,
            ..Default::default()
        }
    }

    /// Sets the poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the shutdown timeout.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

/// Counters shared across a pool's workers.
#[derive(Debug, Default)]
struct SharedStats {
    completed: AtomicU64,
    retried: AtomicU64,
    dead_lettered: AtomicU64,
}

/// Snapshot of a pool's counters.
#[derive(Debug, Clone, Default)]
pub struct WorkerStats {
    /// Messages acknowledged after a successful handler run.
    pub completed: u64,
    /// Messages requeued for a delayed retry.
    pub retried: u64,
    /// Messages moved to the dead letter list.
    pub dead_lettered: u64,
}

impl WorkerStats {
    /// Total messages that finished a delivery attempt.
    pub fn total_processed(&self) -> u64 {
        self.completed + self.retried + self.dead_lettered
    }
}

/// Pool of workers processing one stage's queue.
pub struct WorkerPool<S: Stage> {
    config: WorkerPoolConfig,
    queue: Arc<StageQueue<S::Input>>,
    stage: Arc<S>,
    shutdown_tx: broadcast::Sender<()>,
    worker_handles: Vec<JoinHandle<()>>,
    stats: Arc<SharedStats>,
    is_running: AtomicBool,
}

impl<S: Stage> WorkerPool<S> {
    /// Creates a worker pool over an existing queue.
    pub fn new(config: WorkerPoolConfig, queue: Arc<StageQueue<S::Input>>, stage: Arc<S>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            queue,
            stage,
            shutdown_tx,
            worker_handles: Vec::new(),
            stats: Arc::new(SharedStats::default()),
            is_running: AtomicBool::new(false),
        }
    }

    /// Starts all workers in the pool.
    ///
    /// Messages stuck in the processing list from a previous crash are
    /// requeued first.
    pub async fn start(&mut self) -> Result<(), PoolError> {
        if self.is_running.load(Ordering::SeqCst) {
            return Err(PoolError::AlreadyRunning);
        }

        match self.queue.recover_processing().await {
            Ok(recovered) if recovered > 0 => {
                info!(
                    stage = self.stage.name(),
                    recovered, "Recovered messages from processing list"
                );
            }
            Ok(_) => {}
            Err(e) => {
                warn!(stage = self.stage.name(), error = %e, "Failed to recover processing messages");
            }
        }

        for i in 0..self.config.num_workers {
            let worker = Worker {
                id: format!("{}-{}", self.stage.name(), i),
                queue: Arc::clone(&self.queue),
                stage: Arc::clone(&self.stage),
                shutdown_rx: self.shutdown_tx.subscribe(),
                poll_interval: self.config.poll_interval,
                stats: Arc::clone(&self.stats),
            };

            let handle = tokio::spawn(async move {
                worker.run().await;
            });

            self.worker_handles.push(handle);
        }

        self.is_running.store(true, Ordering::SeqCst);
        info!(
            stage = self.stage.name(),
            num_workers = self.config.num_workers,
            "Worker pool started"
        );

        Ok(())
    }

    /// Gracefully shuts down all workers.
    ///
    /// Workers finish their current message before stopping.
    pub async fn shutdown(&mut self) -> Result<(), PoolError> {
        if !self.is_running.load(Ordering::SeqCst) {
            return Err(PoolError::NotRunning);
        }

        info!(stage = self.stage.name(), "Initiating worker pool shutdown");

        // Ignore send error - workers may have already stopped.
        let _ = self.shutdown_tx.send(());

        let shutdown_future = async {
            for handle in self.worker_handles.drain(..) {
                if let Err(e) = handle.await {
                    error!(error = %e, "Worker task panicked during shutdown");
                }
            }
        };

        match tokio::time::timeout(self.config.shutdown_timeout, shutdown_future).await {
            Ok(()) => {
                self.is_running.store(false, Ordering::SeqCst);
                info!(stage = self.stage.name(), "Worker pool shutdown complete");
                Ok(())
            }
            Err(_) => {
                self.is_running.store(false, Ordering::SeqCst);
                Err(PoolError::ShutdownTimeout(self.config.shutdown_timeout))
            }
        }
    }

    /// Returns a snapshot of the pool's counters.
    pub fn stats(&self) -> WorkerStats {
        WorkerStats {
            completed: self.stats.completed.load(Ordering::SeqCst),
            retried: self.stats.retried.load(Ordering::SeqCst),
            dead_lettered: self.stats.dead_lettered.load(Ordering::SeqCst),
        }
    }

    /// Returns whether the pool is currently running.
    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }
}

/// A single worker processing one stage's queue.
struct Worker<S: Stage> {
    id: String,
    queue: Arc<StageQueue<S::Input>>,
    stage: Arc<S>,
    shutdown_rx: broadcast::Receiver<()>,
    poll_interval: Duration,
    stats: Arc<SharedStats>,
}

impl<S: Stage> Worker<S> {
    /// Main worker loop: poll for messages until shutdown.
    async fn run(mut self) {
        info!(worker_id = %self.id, "Worker started");

        loop {
            match self.shutdown_rx.try_recv() {
                Ok(()) | Err(broadcast::error::TryRecvError::Closed) => {
                    info!(worker_id = %self.id, "Worker received shutdown signal");
                    break;
                }
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(broadcast::error::TryRecvError::Empty) => {}
            }

            match self.queue.dequeue(self.poll_interval).await {
                Ok(Some(envelope)) => {
                    self.process(envelope).await;
                }
                Ok(None) => {
                    debug!(worker_id = %self.id, "No messages available");
                }
                Err(e) => {
                    error!(worker_id = %self.id, error = %e, "Failed to dequeue message");
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }

        info!(worker_id = %self.id, "Worker stopped");
    }

    /// Processes a single delivery.
    async fn process(&self, mut envelope: Envelope<S::Input>) {
        envelope.increment_attempts();

        let ctx = MessageContext::for_envelope(&envelope);
        let start = Instant::now();

        info!(
            worker_id = %self.id,
            message_id = %envelope.id,
            attempt = envelope.attempts,
            "Processing message"
        );

        let result = self.stage.handle(&ctx, envelope.payload.clone()).await;
        let duration = start.elapsed();
        metrics::observe_stage_duration(self.stage.name(), duration);

        match result {
            Ok(()) => {
                if let Err(e) = self.queue.ack(&envelope).await {
                    error!(
                        worker_id = %self.id,
                        message_id = %envelope.id,
                        error = %e,
                        "Failed to acknowledge message"
                    );
                }
                self.stats.completed.fetch_add(1, Ordering::SeqCst);
                metrics::record_message(self.stage.name(), "completed");
                info!(
                    worker_id = %self.id,
                    message_id = %envelope.id,
                    duration_ms = duration.as_millis(),
                    "Message processed"
                );
            }
            Err(e) if envelope.should_retry() => {
                let delay = self.stage.retry_delay();
                warn!(
                    worker_id = %self.id,
                    message_id = %envelope.id,
                    error = %e,
                    remaining_attempts = envelope.remaining_attempts(),
                    delay_secs = delay.as_secs(),
                    "Message failed, scheduling retry"
                );

                self.stats.retried.fetch_add(1, Ordering::SeqCst);
                metrics::record_message(self.stage.name(), "retried");

                if let Err(retry_err) = self.queue.retry(envelope, delay).await {
                    error!(
                        worker_id = %self.id,
                        error = %retry_err,
                        "Failed to schedule retry"
                    );
                }
            }
            Err(e) => {
                error!(
                    worker_id = %self.id,
                    message_id = %envelope.id,
                    error = %e,
                    "Message exhausted attempts, moving to dead letter list"
                );

                self.stage.on_exhausted(&ctx, envelope.payload.clone()).await;
                self.stats.dead_lettered.fetch_add(1, Ordering::SeqCst);
                metrics::record_message(self.stage.name(), "dead_lettered");

                if let Err(dlq_err) = self.queue.dead_letter(envelope, &e.to_string()).await {
                    error!(
                        worker_id = %self.id,
                        error = %dlq_err,
                        "Failed to move message to dead letter list"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_pool_config_default() {
        let config = WorkerPoolConfig::default();

        assert_eq!(config.num_workers, 2);
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.shutdown_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_worker_pool_config_builder() {
        let config = WorkerPoolConfig::new(8)
            .with_poll_interval(Duration::from_secs(5))
            .with_shutdown_timeout(Duration::from_secs(120));

        assert_eq!(config.num_workers, 8);
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.shutdown_timeout, Duration::from_secs(120));
    }

    #[test]
    fn test_worker_stats_total() {
        let stats = WorkerStats {
            completed: 10,
            retried: 3,
            dead_lettered: 1,
        };
        assert_eq!(stats.total_processed(), 14);
    }

    #[test]
    fn test_message_context_from_envelope() {
        let mut envelope = Envelope::new(1u32);
        envelope.increment_attempts();

        let ctx = MessageContext::for_envelope(&envelope);
        assert_eq!(ctx.message_id, envelope.id);
        assert_eq!(ctx.created_at, envelope.created_at);
        assert_eq!(ctx.attempt, 1);
    }

    #[test]
    fn test_pool_error_display() {
        let err = PoolError::AlreadyRunning;
        assert!(err.to_string().contains("already running"));

        let err = PoolError::ShutdownTimeout(Duration::from_secs(30));
        assert!(err.to_string().contains("30"));
    }
}
