//! Pipeline stages.
//!
//! The brief pipeline is a chain of queue-driven workers:
//!
//! 1. [`DailyScheduler`] - time-triggered fan-out, one job request per user
//! 2. [`Orchestrator`] - mints the job id and durable metadata
//! 3. [`DataFetcher`] - bills from SQL, news from web search
//! 4. [`ScriptGenerator`] - two-voice dialogue script plus written digest
//! 5. [`AudioGenerator`] - text-to-dialogue synthesis, base64 audio blob
//! 6. [`Uploader`] - object storage upload and the final brief record
//!
//! Stages are strictly sequential per job via explicit hand-off messages;
//! different jobs run concurrently and in any relative order.

pub mod fetcher;
pub mod orchestrator;
pub mod scheduler;
pub mod scripter;
pub mod synthesizer;
pub mod uploader;

pub use fetcher::DataFetcher;
pub use orchestrator::Orchestrator;
pub use scheduler::{DailyScheduler, ScheduleSummary};
pub use scripter::ScriptGenerator;
pub use synthesizer::AudioGenerator;
pub use uploader::Uploader;

use tracing::warn;

use crate::jobs::{JobRecord, JobStatus};
use crate::store::{get_json, keys, put_json, JobStore, StoreError};

/// Advances the job's status on the metadata record.
///
/// A missing record is not an error - the job may have been cleaned up.
pub async fn update_status(
    store: &dyn JobStore,
    job_id: &str,
    status: JobStatus,
) -> Result<(), StoreError> {
    let key = keys::meta(job_id);
    if let Some(mut record) = get_json::<JobRecord>(store, &key).await? {
        record.status = status;
        put_json(store, &key, &record).await?;
    }
    Ok(())
}

/// Marks a job failed, swallowing store errors.
///
/// Used from `on_exhausted` hooks where the message is already headed to the
/// dead letter list and a second failure must not mask the first.
pub(crate) async fn mark_failed(store: &dyn JobStore, job_id: &str) {
    if let Err(e) = update_status(store, job_id, JobStatus::Failed).await {
        warn!(job_id, error = %e, "Failed to mark job failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryJobStore;
    use chrono::Utc;

    fn record(job_id: &str) -> JobRecord {
        JobRecord {
            job_id: job_id.to_string(),
            user_id: "u1".to_string(),
            email: "u1@example.com".to_string(),
            policy_interests: vec!["healthcare".to_string()],
            state: None,
            district: None,
            force_regenerate: false,
            created_at: Utc::now(),
            status: JobStatus::Pending,
        }
    }

    #[tokio::test]
    async fn test_update_status_advances_record() {
        let store = MemoryJobStore::new();
        put_json(&store, &keys::meta("j1"), &record("j1"))
            .await
            .expect("seed");

        update_status(&store, "j1", JobStatus::Fetching)
            .await
            .expect("update should work");

        let loaded: JobRecord = get_json(&store, &keys::meta("j1"))
            .await
            .expect("get")
            .expect("record present");
        assert_eq!(loaded.status, JobStatus::Fetching);
    }

    #[tokio::test]
    async fn test_update_status_missing_record_is_noop() {
        let store = MemoryJobStore::new();
        update_status(&store, "absent", JobStatus::Fetching)
            .await
            .expect("missing record should not error");
        assert!(store.is_empty());
    }
}
