//! Upload stage.
//!
//! Final stage of the pipeline: decodes the audio blob, pushes it to object
//! storage, and inserts the brief record. The consumed audio and digest
//! blobs are deleted and the job's metadata record is marked complete.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::Utc;
use tracing::info;

use crate::error::StageError;
use crate::jobs::{Brief, BriefDigest, BriefType, JobRecord, JobStatus, UploadRequest};
use crate::metrics;
use crate::queue::{MessageContext, Stage, DEFAULT_RETRY_DELAY};
use crate::storage::BriefDatabase;
use crate::store::{get_json, keys, JobStore};
use crate::upload::{audio_object_path, AudioStorage};

use super::{mark_failed, update_status};

/// Speaking rate used to estimate audio duration from the transcript.
const WORDS_PER_SECOND: f64 = 2.5;

/// Stage that finalizes a brief.
pub struct Uploader {
    store: Arc<dyn JobStore>,
    storage: Arc<dyn AudioStorage>,
    db: Arc<dyn BriefDatabase>,
    retry_delay: Duration,
}

impl Uploader {
    /// Creates an uploader over the given collaborators.
    pub fn new(
        store: Arc<dyn JobStore>,
        storage: Arc<dyn AudioStorage>,
        db: Arc<dyn BriefDatabase>,
    ) -> Self {
        Self {
            store,
            storage,
            db,
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
impl Stage for Uploader {
    type Input = UploadRequest;

    fn name(&self) -> &'static str {
        "upload"
    }

    fn retry_delay(&self) -> Duration {
        self.retry_delay
    }

    async fn handle(&self, _ctx: &MessageContext, request: UploadRequest) -> Result<(), StageError> {
        update_status(self.store.as_ref(), &request.job_id, JobStatus::Uploading).await?;

        let meta_key = keys::meta(&request.job_id);
        let audio_key = keys::audio(&request.job_id);
        let digest_key = keys::digest(&request.job_id);

        let record: JobRecord = get_json(self.store.as_ref(), &meta_key)
            .await?
            .ok_or_else(|| StageError::MissingArtifact(meta_key.clone()))?;

        let encoded = self
            .store
            .get(&audio_key)
            .await?
            .ok_or_else(|| StageError::MissingArtifact(audio_key.clone()))?;
        let audio = BASE64
            .decode(encoded)
            .map_err(|e| StageError::InvalidAudio(e.to_string()))?;

        let digest: BriefDigest = get_json(self.store.as_ref(), &digest_key)
            .await?
            .ok_or_else(|| StageError::MissingArtifact(digest_key.clone()))?;

        let path = audio_object_path(&record.user_id, &request.job_id);
        let audio_url = self.storage.store_audio(&path, audio).await?;

        let brief = Brief {
            user_id: record.user_id.clone(),
            brief_type: BriefType::Daily,
            audio_url,
            duration_seconds: estimate_duration_seconds(&digest.transcript),
            transcript: digest.transcript,
            digest: digest.digest,
            bill_ids: digest.bill_ids,
            policy_areas: digest.policy_areas,
            generated_at: Utc::now(),
        };

        self.db.insert_brief(&brief).await?;

        // Consumed blobs are gone; the metadata record stays as the job's
        // terminal state.
        self.store.delete(&audio_key).await?;
        self.store.delete(&digest_key).await?;
        update_status(self.store.as_ref(), &request.job_id, JobStatus::Complete).await?;

        metrics::inc_briefs_completed();
        info!(
            job_id = %request.job_id,
            user_id = %record.user_id,
            audio_url = %brief.audio_url,
            "Brief completed"
        );
        Ok(())
    }

    async fn on_exhausted(&self, _ctx: &MessageContext, request: UploadRequest) {
        mark_failed(self.store.as_ref(), &request.job_id).await;
    }
}

/// Estimates spoken duration from the transcript's word count.
fn estimate_duration_seconds(transcript: &str) -> u32 {
    let words = transcript.split_whitespace().count();
    (words as f64 / WORDS_PER_SECOND).ceil() as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::Envelope;
    use crate::storage::MemoryDatabase;
    use crate::store::{put_json, MemoryJobStore};
    use crate::upload::MemoryAudioStorage;

    async fn seed(store: &MemoryJobStore, job_id: &str) {
        let record = JobRecord {
            job_id: job_id.to_string(),
            user_id: "u1".to_string(),
            email: "u1@example.com".to_string(),
            policy_interests: vec!["healthcare".to_string()],
            state: None,
            district: None,
            force_regenerate: false,
            created_at: Utc::now(),
            status: JobStatus::Synthesizing,
        };
        put_json(store, &keys::meta(job_id), &record)
            .await
            .expect("seed meta");

        store
            .put(&keys::audio(job_id), BASE64.encode(b"mp3 bytes"))
            .await
            .expect("seed audio");

        let digest = BriefDigest {
            transcript: "Host: Welcome back. Analyst: One bill moved.".to_string(),
            digest: "Covers 1 bill: Bill b1.".to_string(),
            bill_ids: vec!["b1".to_string()],
            policy_areas: vec!["healthcare".to_string()],
        };
        put_json(store, &keys::digest(job_id), &digest)
            .await
            .expect("seed digest");
    }

    #[tokio::test]
    async fn test_uploads_audio_and_inserts_brief() {
        let store = Arc::new(MemoryJobStore::new());
        seed(&store, "j1").await;

        let storage = Arc::new(MemoryAudioStorage::new("https://cdn.example"));
        let db = Arc::new(MemoryDatabase::new());
        let stage = Uploader::new(store.clone(), storage.clone(), db.clone());

        let envelope = Envelope::new(UploadRequest {
            job_id: "j1".to_string(),
        });
        let ctx = MessageContext::for_envelope(&envelope);
        stage
            .handle(&ctx, envelope.payload.clone())
            .await
            .expect("handle should work");

        // Audio landed in object storage, decoded.
        assert_eq!(
            storage.object("briefs/u1/j1.mp3"),
            Some(b"mp3 bytes".to_vec())
        );

        // Brief row inserted with the digest contents.
        let briefs = db.briefs();
        assert_eq!(briefs.len(), 1);
        assert_eq!(briefs[0].user_id, "u1");
        assert_eq!(briefs[0].audio_url, "https://cdn.example/briefs/u1/j1.mp3");
        assert_eq!(briefs[0].bill_ids, vec!["b1"]);
        assert_eq!(briefs[0].policy_areas, vec!["healthcare"]);
        assert!(briefs[0].duration_seconds > 0);

        // Consumed blobs are gone; the metadata record is complete.
        assert!(store.get(&keys::audio("j1")).await.expect("get").is_none());
        assert!(store.get(&keys::digest("j1")).await.expect("get").is_none());
        let record: JobRecord = get_json(store.as_ref(), &keys::meta("j1"))
            .await
            .expect("get")
            .expect("record present");
        assert_eq!(record.status, JobStatus::Complete);
    }

    #[tokio::test]
    async fn test_missing_audio_blob_is_hard_failure() {
        let store = Arc::new(MemoryJobStore::new());
        let record = JobRecord {
            job_id: "j1".to_string(),
            user_id: "u1".to_string(),
            email: "u1@example.com".to_string(),
            policy_interests: vec![],
            state: None,
            district: None,
            force_regenerate: false,
            created_at: Utc::now(),
            status: JobStatus::Synthesizing,
        };
        put_json(store.as_ref(), &keys::meta("j1"), &record)
            .await
            .expect("seed meta");

        let stage = Uploader::new(
            store,
            Arc::new(MemoryAudioStorage::new("https://cdn.example")),
            Arc::new(MemoryDatabase::new()),
        );

        let envelope = Envelope::new(UploadRequest {
            job_id: "j1".to_string(),
        });
        let ctx = MessageContext::for_envelope(&envelope);
        let err = stage
            .handle(&ctx, envelope.payload.clone())
            .await
            .unwrap_err();

        assert!(matches!(err, StageError::MissingArtifact(_)));
    }

    #[test]
    fn test_duration_estimate() {
        // 10 words at 2.5 words/second rounds up to 4 seconds.
        let transcript = "one two three four five six seven eight nine ten";
        assert_eq!(estimate_duration_seconds(transcript), 4);
        assert_eq!(estimate_duration_seconds(""), 0);
    }
}
