//! Daily fan-out scheduler.
//!
//! Triggered once per day (externally, e.g. cron or a systemd timer): reads
//! every user with a non-null email and enqueues one job request per user.
//! Fan-out is best-effort per user - a failed enqueue is counted and logged
//! but the remaining users still get their briefs. Only a failure of the
//! user query itself aborts the run, to be retried at the next trigger.

use std::sync::Arc;

use tracing::{info, warn};

use crate::error::StageError;
use crate::jobs::{parse_interests, JobRequest};
use crate::queue::MessageSink;
use crate::storage::BriefDatabase;

/// Outcome of one fan-out run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScheduleSummary {
    /// Job requests successfully enqueued.
    pub enqueued: usize,
    /// Users whose enqueue failed.
    pub failed: usize,
}

/// The daily brief scheduler.
pub struct DailyScheduler {
    db: Arc<dyn BriefDatabase>,
    jobs: Arc<dyn MessageSink<JobRequest>>,
}

impl DailyScheduler {
    /// Creates a scheduler over the given database and job queue.
    pub fn new(db: Arc<dyn BriefDatabase>, jobs: Arc<dyn MessageSink<JobRequest>>) -> Self {
        Self { db, jobs }
    }

    /// Enumerates users and enqueues one job request each.
    pub async fn run_once(&self) -> Result<ScheduleSummary, StageError> {
        let users = self.db.users_with_email().await?;
        info!(users = users.len(), "Scheduling daily briefs");

        let mut summary = ScheduleSummary::default();

        for user in users {
            let request = JobRequest {
                policy_interests: parse_interests(user.interests.as_deref()),
                user_id: user.id,
                email: user.email,
                name: user.name,
                state: user.state,
                district: user.district,
                force_regenerate: false,
            };

            match self.jobs.send(request).await {
                Ok(()) => summary.enqueued += 1,
                Err(e) => {
                    warn!(error = %e, "Failed to enqueue job request, skipping user");
                    summary.failed += 1;
                }
            }
        }

        info!(
            enqueued = summary.enqueued,
            failed = summary.failed,
            "Daily fan-out complete"
        );

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::DEFAULT_TOPICS;
    use crate::queue::{MemorySink, QueueError};
    use crate::storage::{MemoryDatabase, UserRow};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn user(id: &str, interests: Option<&str>) -> UserRow {
        UserRow {
            id: id.to_string(),
            email: format!("{}@example.com", id),
            name: None,
            state: Some("CA".to_string()),
            district: None,
            interests: interests.map(|s| s.to_string()),
        }
    }

    #[tokio::test]
    async fn test_enqueues_one_request_per_user() {
        let db = Arc::new(MemoryDatabase::with_data(
            vec![
                user("u1", Some(r#"["healthcare","education"]"#)),
                user("u2", Some(r#"["climate"]"#)),
            ],
            vec![],
        ));
        let sink = Arc::new(MemorySink::new());
        let scheduler = DailyScheduler::new(db, sink.clone());

        let summary = scheduler.run_once().await.expect("run should work");
        assert_eq!(summary, ScheduleSummary { enqueued: 2, failed: 0 });

        let requests = sink.drain();
        assert_eq!(requests[0].user_id, "u1");
        assert_eq!(requests[0].policy_interests, vec!["healthcare", "education"]);
        assert!(!requests[0].force_regenerate);
    }

    #[tokio::test]
    async fn test_malformed_interests_fall_back_to_defaults() {
        let db = Arc::new(MemoryDatabase::with_data(
            vec![user("u1", Some("{broken"))],
            vec![],
        ));
        let sink = Arc::new(MemorySink::new());
        let scheduler = DailyScheduler::new(db, sink.clone());

        let summary = scheduler.run_once().await.expect("run should work");
        assert_eq!(summary.enqueued, 1);

        let requests = sink.drain();
        assert_eq!(requests[0].policy_interests, DEFAULT_TOPICS);
    }

    /// Sink that rejects every other message.
    #[derive(Default)]
    struct FlakySink {
        calls: AtomicUsize,
        delivered: MemorySink<JobRequest>,
    }

    #[async_trait]
    impl MessageSink<JobRequest> for FlakySink {
        async fn send(&self, message: JobRequest) -> Result<(), QueueError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) % 2 == 1 {
                return Err(QueueError::SendFailed("connection reset".to_string()));
            }
            self.delivered.send(message).await
        }
    }

    #[tokio::test]
    async fn test_enqueue_failure_skips_user_without_aborting() {
        let db = Arc::new(MemoryDatabase::with_data(
            vec![
                user("u1", Some(r#"["healthcare"]"#)),
                user("u2", Some(r#"["education"]"#)),
                user("u3", Some(r#"["economy"]"#)),
            ],
            vec![],
        ));
        let sink = Arc::new(FlakySink::default());
        let scheduler = DailyScheduler::new(db, sink.clone());

        let summary = scheduler.run_once().await.expect("run should work");
        assert_eq!(summary.enqueued, 2);
        assert_eq!(summary.failed, 1);

        let delivered = sink.delivered.drain();
        let ids: Vec<&str> = delivered.iter().map(|r| r.user_id.as_str()).collect();
        assert_eq!(ids, vec!["u1", "u3"]);
    }
}
