//! Job orchestration stage.
//!
//! Converts an incoming job request into a durable job record and forwards
//! a minimal routing message. The job id is derived from the message
//! envelope, so a redelivered request reproduces the same id and the
//! metadata write is an idempotent overwrite rather than a divergent
//! second record.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::info;

use crate::error::StageError;
use crate::jobs::{mint_job_id, FetchRequest, JobRecord, JobRequest, JobStatus};
use crate::queue::{MessageContext, MessageSink, Stage, DEFAULT_RETRY_DELAY};
use crate::store::{keys, put_json, JobStore};

use super::mark_failed;

/// Stage that turns job requests into tracked jobs.
pub struct Orchestrator {
    store: Arc<dyn JobStore>,
    next: Arc<dyn MessageSink<FetchRequest>>,
    retry_delay: Duration,
}

impl Orchestrator {
    /// Creates an orchestrator over the given store and downstream queue.
    pub fn new(store: Arc<dyn JobStore>, next: Arc<dyn MessageSink<FetchRequest>>) -> Self {
        Self {
            store,
            next,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    /// Overrides the retry delay.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }
}

#[async_trait]
impl Stage for Orchestrator {
    type Input = JobRequest;

    fn name(&self) -> &'static str {
        "orchestrate"
    }

    fn retry_delay(&self) -> Duration {
        self.retry_delay
    }

    async fn handle(&self, ctx: &MessageContext, request: JobRequest) -> Result<(), StageError> {
        let job_id = mint_job_id(ctx.created_at, ctx.message_id);

        let record = JobRecord {
            job_id: job_id.clone(),
            user_id: request.user_id.clone(),
            email: request.email,
            policy_interests: request.policy_interests.clone(),
            state: request.state.clone(),
            district: request.district.clone(),
            force_regenerate: request.force_regenerate,
            created_at: Utc::now(),
            status: JobStatus::Pending,
        };

        put_json(self.store.as_ref(), &keys::meta(&job_id), &record).await?;

        // The full payload travelled only on the first hop; downstream
        // messages carry the job id plus routing fields.
        self.next
            .send(FetchRequest {
                job_id: job_id.clone(),
                user_id: request.user_id,
                policy_interests: request.policy_interests,
                state: request.state,
                district: request.district,
            })
            .await?;

        info!(job_id = %job_id, "Job orchestrated");
        Ok(())
    }

    async fn on_exhausted(&self, ctx: &MessageContext, _request: JobRequest) {
        let job_id = mint_job_id(ctx.created_at, ctx.message_id);
        mark_failed(self.store.as_ref(), &job_id).await;
    }
}
