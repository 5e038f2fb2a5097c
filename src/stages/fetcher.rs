//! Data fetching stage.
//!
//! Populates a job with the bills and news the script stage will narrate.
//! Bills come from SQL, restricted to recent activity and ranked by impact
//! score; news comes from the web-search API. Both result sets are cut to a
//! small fixed count as a token-budget control for script generation, not a
//! completeness guarantee. The stage is all-or-nothing: any failure retries
//! the whole message.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use crate::error::StageError;
use crate::jobs::{FetchRequest, JobStatus, ScriptRequest};
use crate::queue::{MessageContext, MessageSink, Stage, DEFAULT_RETRY_DELAY};
use crate::search::NewsSearch;
use crate::storage::BriefDatabase;
use crate::store::{keys, put_json, JobStore};

use super::{mark_failed, update_status};

/// Result-set caps applied by the fetch stage.
#[derive(Debug, Clone, Copy)]
pub struct FetchLimits {
    /// Sliding window of bill activity, in days.
    pub bill_window_days: i32,
    /// Maximum bills kept.
    pub max_bills: i64,
    /// Maximum news results kept.
    pub max_news: usize,
}

impl Default for FetchLimits {
    fn default() -> Self {
        Self {
            bill_window_days: 30,
            max_bills: 2,
            max_news: 5,
        }
    }
}

/// Stage that fetches the bills and news for a job.
pub struct DataFetcher {
    db: Arc<dyn BriefDatabase>,
    store: Arc<dyn JobStore>,
    search: Arc<dyn NewsSearch>,
    next: Arc<dyn MessageSink<ScriptRequest>>,
    limits: FetchLimits,
    retry_delay: Duration,
}

impl DataFetcher {
    /// Creates a fetcher over the given collaborators.
    pub fn new(
        db: Arc<dyn BriefDatabase>,
        store: Arc<dyn JobStore>,
        search: Arc<dyn NewsSearch>,
        next: Arc<dyn MessageSink<ScriptRequest>>,
        limits: FetchLimits,
    ) -> Self {
        Self {
            db,
            store,
            search,
            next,
            limits,
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
impl Stage for DataFetcher {
    type Input = FetchRequest;

    fn name(&self) -> &'static str {
        "fetch"
    }

    fn retry_delay(&self) -> Duration {
        self.retry_delay
    }

    async fn handle(&self, _ctx: &MessageContext, request: FetchRequest) -> Result<(), StageError> {
        update_status(self.store.as_ref(), &request.job_id, JobStatus::Fetching).await?;

        let bills = self
            .db
            .recent_bills(
                &request.policy_interests,
                self.limits.bill_window_days,
                self.limits.max_bills,
            )
            .await?;

        let query = request.policy_interests.join(" ");
        let mut news = self.search.search(&query, self.limits.max_news).await?;
        news.truncate(self.limits.max_news);

        put_json(self.store.as_ref(), &keys::bills(&request.job_id), &bills).await?;
        put_json(self.store.as_ref(), &keys::news(&request.job_id), &news).await?;

        self.next
            .send(ScriptRequest {
                job_id: request.job_id.clone(),
                user_id: request.user_id,
            })
            .await?;

        info!(
            job_id = %request.job_id,
            bills = bills.len(),
            news = news.len(),
            "Job data fetched"
        );
        Ok(())
    }

    async fn on_exhausted(&self, _ctx: &MessageContext, request: FetchRequest) {
        mark_failed(self.store.as_ref(), &request.job_id).await;
    }
}
