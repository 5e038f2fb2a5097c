//! Error types for briefcast operations.
//!
//! Defines error types for the external-facing subsystems:
//! - Web search API interactions
//! - Text-to-dialogue speech synthesis
//! - LLM-backed dialogue writing
//! - Object storage uploads
//! - Stage execution (the umbrella error a pipeline stage can fail with)
//!
//! Infrastructure-local errors (queue, job store, database, config) live next
//! to their subsystems.

use thiserror::Error;

use crate::queue::QueueError;
use crate::storage::DatabaseError;
use crate::store::StoreError;

/// Errors that can occur during web search operations.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Missing API key: SEARCH_API_KEY environment variable not set")]
    MissingApiKey,

    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Failed to parse search response: {0}")]
    ParseError(String),

    #[error("API error ({code}): {message}")]
    ApiError { code: u16, message: String },
}

/// Errors that can occur during speech synthesis.
#[derive(Debug, Error)]
pub enum SpeechError {
    #[error("Missing API key: SPEECH_API_KEY environment variable not set")]
    MissingApiKey,

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Empty dialogue: no lines to synthesize")]
    EmptyDialogue,

    #[error("API error ({code}): {message}")]
    ApiError { code: u16, message: String },
}

/// Errors that can occur while writing a dialogue script.
#[derive(Debug, Error)]
pub enum DialogueError {
    #[error("Missing API base URL: LLM_API_BASE environment variable not set")]
    MissingApiBase,

    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Failed to parse completion response: {0}")]
    ParseError(String),

    #[error("Malformed dialogue: {0}")]
    MalformedDialogue(String),

    #[error("API error ({code}): {message}")]
    ApiError { code: u16, message: String },
}

/// Errors that can occur while uploading audio to object storage.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Object store error: {0}")]
    Storage(#[from] object_store::Error),
}

/// Umbrella error for a pipeline stage handler.
///
/// Any variant fails the whole message; the worker decides between a delayed
/// retry and the dead-letter queue based on the envelope's attempt counter.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("Store operation failed: {0}")]
    Store(#[from] StoreError),

    #[error("Database operation failed: {0}")]
    Database(#[from] DatabaseError),

    #[error("Queue operation failed: {0}")]
    Queue(#[from] QueueError),

    #[error("Search request failed: {0}")]
    Search(#[from] SearchError),

    #[error("Speech synthesis failed: {0}")]
    Speech(#[from] SpeechError),

    #[error("Dialogue generation failed: {0}")]
    Dialogue(#[from] DialogueError),

    #[error("Upload failed: {0}")]
    Upload(#[from] UploadError),

    #[error("Missing upstream artifact: {0}")]
    MissingArtifact(String),

    #[error("Invalid audio payload: {0}")]
    InvalidAudio(String),

    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_error_display() {
        let err = StageError::MissingArtifact("job:abc:script".to_string());
        assert!(err.to_string().contains("job:abc:script"));

        let err = StageError::InvalidAudio("bad padding".to_string());
        assert!(err.to_string().contains("bad padding"));
    }

    #[test]
    fn test_search_error_from_api() {
        let err = SearchError::ApiError {
            code: 429,
            message: "rate limited".to_string(),
        };
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("rate limited"));
    }

    #[test]
    fn test_stage_error_wraps_search_error() {
        let err: StageError = SearchError::MissingApiKey.into();
        assert!(err.to_string().contains("SEARCH_API_KEY"));
    }
}
