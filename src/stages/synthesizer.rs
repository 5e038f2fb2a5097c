//! Audio generation stage.
//!
//! Reads the dialogue script, maps each line to a `(text, voice_id)` pair
//! via the two-voice map, and sends the full line set to the speech API in
//! one request, receiving a single audio stream for the entire script. The
//! audio bytes are base64-encoded before being written to the store to
//! avoid binary-transport issues, and the consumed script blob is deleted.
//!
//! Synthesis is billed per character, so a redelivered message must not
//! repeat the call: an already-present audio blob is taken as proof the
//! call succeeded on a prior delivery and the stage skips straight to
//! cleanup and forward.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use tracing::info;

use crate::error::StageError;
use crate::jobs::{AudioRequest, DialogueScript, JobStatus, UploadRequest};
use crate::metrics;
use crate::queue::{MessageContext, MessageSink, Stage};
use crate::speech::{DialogueInput, SpeechSynthesizer, VoiceMap};
use crate::store::{get_json, keys, JobStore};

use super::{mark_failed, update_status};

/// Retry delay for failed synthesis: materially longer than the rest of the
/// pipeline to avoid hammering the speech API.
const AUDIO_RETRY_DELAY: Duration = Duration::from_secs(300);

/// Stage that synthesizes the brief's audio.
pub struct AudioGenerator {
    store: Arc<dyn JobStore>,
    speech: Arc<dyn SpeechSynthesizer>,
    voices: VoiceMap,
    next: Arc<dyn MessageSink<UploadRequest>>,
    retry_delay: Duration,
}

impl AudioGenerator {
    /// Creates an audio generator over the given collaborators.
    pub fn new(
        store: Arc<dyn JobStore>,
        speech: Arc<dyn SpeechSynthesizer>,
        voices: VoiceMap,
        next: Arc<dyn MessageSink<UploadRequest>>,
    ) -> Self {
        Self {
            store,
            speech,
            voices,
            next,
            retry_delay: AUDIO_RETRY_DELAY,
        }
    }

    /// Overrides the retry delay.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Maps script lines to speech inputs using the voice map.
    fn to_inputs(&self, script: &DialogueScript) -> Vec<DialogueInput> {
        script
            .lines
            .iter()
            .map(|line| DialogueInput {
                text: line.text.clone(),
                voice_id: self.voices.voice_for(line.speaker).to_string(),
            })
            .collect()
    }
}

#[async_trait]
impl Stage for AudioGenerator {
    type Input = AudioRequest;

    fn name(&self) -> &'static str {
        "audio"
    }

    fn retry_delay(&self) -> Duration {
        self.retry_delay
    }

    async fn handle(&self, _ctx: &MessageContext, request: AudioRequest) -> Result<(), StageError> {
        update_status(self.store.as_ref(), &request.job_id, JobStatus::Synthesizing).await?;

        let audio_key = keys::audio(&request.job_id);
        let script_key = keys::script(&request.job_id);

        // A prior delivery may have produced the audio and crashed before
        // acknowledging; do not bill the speech API twice.
        if self.store.get(&audio_key).await?.is_some() {
            info!(job_id = %request.job_id, "Audio already present, skipping synthesis");
            self.store.delete(&script_key).await?;
            self.next
                .send(UploadRequest {
                    job_id: request.job_id,
                })
                .await?;
            return Ok(());
        }

        let script: DialogueScript = get_json(self.store.as_ref(), &script_key)
            .await?
            .ok_or_else(|| StageError::MissingArtifact(script_key.clone()))?;

        let inputs = self.to_inputs(&script);
        let result = self.speech.synthesize_dialogue(&inputs).await;
        metrics::record_speech_request(if result.is_ok() { "ok" } else { "error" });
        let audio = result?;

        let encoded = BASE64.encode(&audio);
        self.store.put(&audio_key, encoded).await?;
        self.store.delete(&script_key).await?;

        self.next
            .send(UploadRequest {
                job_id: request.job_id.clone(),
            })
            .await?;

        info!(
            job_id = %request.job_id,
            lines = inputs.len(),
            audio_bytes = audio.len(),
            "Audio generated"
        );
        Ok(())
    }

    async fn on_exhausted(&self, _ctx: &MessageContext, request: AudioRequest) {
        mark_failed(self.store.as_ref(), &request.job_id).await;
    }
}
