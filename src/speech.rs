//! Text-to-dialogue speech synthesis client.
//!
//! Sends the full dialogue in one request and receives a single audio byte
//! stream for the entire script. Each line carries the voice id resolved
//! from the line's speaker tag.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

use crate::error::SpeechError;
use crate::jobs::Speaker;

/// Default speech API base URL.
const DEFAULT_API_BASE: &str = "https://api.elevenlabs.io";

/// Default synthesis model.
const DEFAULT_MODEL_ID: &str = "eleven_v3";

/// One dialogue line handed to the speech API.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DialogueInput {
    pub text: String,
    pub voice_id: String,
}

/// Environment-configured voice ids for the two speakers.
#[derive(Debug, Clone)]
pub struct VoiceMap {
    pub host: String,
    pub analyst: String,
}

impl VoiceMap {
    /// Creates a voice map from environment variables.
    ///
    /// Reads `VOICE_ID_HOST` and `VOICE_ID_ANALYST` (both required).
    pub fn from_env() -> Result<Self, SpeechError> {
        let host = env::var("VOICE_ID_HOST")
            .map_err(|_| SpeechError::MissingEnvVar("VOICE_ID_HOST".to_string()))?;
        let analyst = env::var("VOICE_ID_ANALYST")
            .map_err(|_| SpeechError::MissingEnvVar("VOICE_ID_ANALYST".to_string()))?;
        Ok(Self { host, analyst })
    }

    /// Resolves the voice id for a speaker tag.
    pub fn voice_for(&self, speaker: Speaker) -> &str {
        match speaker {
            Speaker::Host => &self.host,
            Speaker::Analyst => &self.analyst,
        }
    }
}

/// Synthesizer of multi-voice dialogue audio.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesizes the full dialogue in one call, returning raw audio bytes.
    async fn synthesize_dialogue(&self, inputs: &[DialogueInput]) -> Result<Vec<u8>, SpeechError>;
}

/// Client for a text-to-dialogue speech API.
pub struct DialogueSpeechClient {
    api_base: String,
    api_key: String,
    model_id: String,
    http_client: Client,
}

impl DialogueSpeechClient {
    /// Creates a new speech client with explicit configuration.
    pub fn new(api_base: String, api_key: String, model_id: String) -> Self {
        Self {
            api_base,
            api_key,
            model_id,
            // Dialogue synthesis of a full script can take minutes.
            http_client: Client::builder()
                .timeout(Duration::from_secs(240))
                .build()
                .expect("Failed to build HTTP client"),
        }
    }

    /// Creates a speech client from environment variables.
    ///
    /// Reads:
    /// - `SPEECH_API_KEY`: API key (required)
    /// - `SPEECH_API_BASE`: API base URL (default: ElevenLabs endpoint)
    /// - `SPEECH_MODEL_ID`: synthesis model (default: "eleven_v3")
    pub fn from_env() -> Result<Self, SpeechError> {
        let api_key = env::var("SPEECH_API_KEY").map_err(|_| SpeechError::MissingApiKey)?;
        let api_base = env::var("SPEECH_API_BASE").unwrap_or_else(|_| DEFAULT_API_BASE.to_string());
        let model_id = env::var("SPEECH_MODEL_ID").unwrap_or_else(|_| DEFAULT_MODEL_ID.to_string());

        Ok(Self::new(api_base, api_key, model_id))
    }
}

#[async_trait]
impl SpeechSynthesizer for DialogueSpeechClient {
    async fn synthesize_dialogue(&self, inputs: &[DialogueInput]) -> Result<Vec<u8>, SpeechError> {
        if inputs.is_empty() {
            return Err(SpeechError::EmptyDialogue);
        }

        let url = format!("{}/v1/text-to-dialogue", self.api_base);
        let request = ApiRequest {
            inputs,
            model_id: &self.model_id,
        };

        let response = self
            .http_client
            .post(&url)
            .header("xi-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| SpeechError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error response".to_string());

            // Failures come back as a JSON error body; fall back to raw text.
            if let Ok(body) = serde_json::from_str::<ApiErrorResponse>(&error_text) {
                return Err(SpeechError::ApiError {
                    code: status.as_u16(),
                    message: body.detail.message,
                });
            }

            return Err(SpeechError::ApiError {
                code: status.as_u16(),
                message: error_text,
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| SpeechError::RequestFailed(e.to_string()))?;

        Ok(bytes.to_vec())
    }
}

/// Request body: `{"inputs": [{"text", "voice_id"}], "model_id"}`.
#[derive(Debug, Serialize)]
struct ApiRequest<'a> {
    inputs: &'a [DialogueInput],
    model_id: &'a str,
}

/// Error body returned on failure.
#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    detail: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)] // Fields kept for complete API error deserialization
struct ApiErrorDetail {
    #[serde(default)]
    status: Option<String>,
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_voice_map_resolution() {
        let voices = VoiceMap {
            host: "voice-host".to_string(),
            analyst: "voice-analyst".to_string(),
        };

        assert_eq!(voices.voice_for(Speaker::Host), "voice-host");
        assert_eq!(voices.voice_for(Speaker::Analyst), "voice-analyst");
    }

    #[test]
    fn test_request_body_shape() {
        let inputs = vec![DialogueInput {
            text: "Welcome back.".to_string(),
            voice_id: "voice-host".to_string(),
        }];
        let request = ApiRequest {
            inputs: &inputs,
            model_id: "eleven_v3",
        };

        let json = serde_json::to_value(&request).expect("serialize");
        assert_eq!(json["inputs"][0]["text"], "Welcome back.");
        assert_eq!(json["inputs"][0]["voice_id"], "voice-host");
        assert_eq!(json["model_id"], "eleven_v3");
    }

    #[test]
    fn test_error_body_parse() {
        let raw = r#"{"detail": {"status": "quota_exceeded", "message": "Character limit reached"}}"#;
        let parsed: ApiErrorResponse = serde_json::from_str(raw).expect("parse");
        assert_eq!(parsed.detail.message, "Character limit reached");
    }
}
