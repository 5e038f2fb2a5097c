//! Script generation stage.
//!
//! Reads the bills and news blobs, asks the dialogue writer for a two-voice
//! script, and assembles the written digest the uploader will attach to the
//! final brief. The consumed bills/news blobs are deleted once the script
//! and digest are durably written.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use crate::dialogue::DialogueWriter;
use crate::error::StageError;
use crate::jobs::{AudioRequest, Bill, BriefDigest, JobStatus, NewsItem, ScriptRequest};
use crate::queue::{MessageContext, MessageSink, Stage, DEFAULT_RETRY_DELAY};
use crate::store::{get_json, keys, put_json, JobStore};

use super::{mark_failed, update_status};

/// Stage that turns fetched data into a dialogue script.
pub struct ScriptGenerator {
    store: Arc<dyn JobStore>,
    writer: Arc<dyn DialogueWriter>,
    next: Arc<dyn MessageSink<AudioRequest>>,
    retry_delay: Duration,
}

impl ScriptGenerator {
    /// Creates a script generator over the given collaborators.
    pub fn new(
        store: Arc<dyn JobStore>,
        writer: Arc<dyn DialogueWriter>,
        next: Arc<dyn MessageSink<AudioRequest>>,
    ) -> Self {
        Self {
            store,
            writer,
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
impl Stage for ScriptGenerator {
    type Input = ScriptRequest;

    fn name(&self) -> &'static str {
        "script"
    }

    fn retry_delay(&self) -> Duration {
        self.retry_delay
    }

    async fn handle(&self, _ctx: &MessageContext, request: ScriptRequest) -> Result<(), StageError> {
        update_status(self.store.as_ref(), &request.job_id, JobStatus::Scripting).await?;

        let bills_key = keys::bills(&request.job_id);
        let news_key = keys::news(&request.job_id);

        let bills: Vec<Bill> = get_json(self.store.as_ref(), &bills_key)
            .await?
            .ok_or_else(|| StageError::MissingArtifact(bills_key.clone()))?;
        let news: Vec<NewsItem> = get_json(self.store.as_ref(), &news_key)
            .await?
            .ok_or_else(|| StageError::MissingArtifact(news_key.clone()))?;

        let script = self.writer.write_dialogue(&bills, &news).await?;
        let digest = build_digest(&script.transcript(), &bills, &news);

        put_json(self.store.as_ref(), &keys::script(&request.job_id), &script).await?;
        put_json(self.store.as_ref(), &keys::digest(&request.job_id), &digest).await?;

        // Inputs are consumed; drop them now that the outputs are durable.
        self.store.delete(&bills_key).await?;
        self.store.delete(&news_key).await?;

        self.next
            .send(AudioRequest {
                job_id: request.job_id.clone(),
            })
            .await?;

        info!(
            job_id = %request.job_id,
            lines = script.lines.len(),
            "Script generated"
        );
        Ok(())
    }

    async fn on_exhausted(&self, _ctx: &MessageContext, request: ScriptRequest) {
        mark_failed(self.store.as_ref(), &request.job_id).await;
    }
}

/// Assembles the written digest for a brief.
pub fn build_digest(transcript: &str, bills: &[Bill], news: &[NewsItem]) -> BriefDigest {
    let mut digest = String::new();

    if bills.is_empty() {
        digest.push_str("No tracked bills saw recent activity.");
    } else {
        let titles: Vec<&str> = bills.iter().map(|bill| bill.title.as_str()).collect();
        digest.push_str(&format!(
            "Covers {} bill{}: {}.",
            bills.len(),
            if bills.len() == 1 { "" } else { "s" },
            titles.join("; ")
        ));
    }

    if !news.is_empty() {
        let titles: Vec<&str> = news.iter().map(|item| item.title.as_str()).collect();
        digest.push_str(&format!(" In the news: {}.", titles.join("; ")));
    }

    let mut policy_areas: Vec<String> = bills.iter().map(|bill| bill.policy_area.clone()).collect();
    policy_areas.dedup();

    BriefDigest {
        transcript: transcript.to_string(),
        digest,
        bill_ids: bills.iter().map(|bill| bill.id.clone()).collect(),
        policy_areas,
    }
}
