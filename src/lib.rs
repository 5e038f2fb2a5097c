//! briefcast: personalized civic audio brief pipeline.
//!
//! A chain of queue-driven workers turns a user's policy interests into a
//! short two-voice audio podcast: orchestrate, fetch bills and news, write
//! a dialogue script, synthesize speech, upload and record the brief.

// Core modules
pub mod cli;
pub mod config;
pub mod dialogue;
pub mod error;
pub mod jobs;
pub mod metrics;
pub mod queue;
pub mod search;
pub mod speech;
pub mod stages;
pub mod storage;
pub mod store;
pub mod upload;

// Re-export commonly used error types
pub use error::{DialogueError, SearchError, SpeechError, StageError, UploadError};
