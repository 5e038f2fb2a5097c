//! Core job and brief domain types.
//!
//! This module defines the types that flow through the pipeline:
//!
//! - `JobRequest`: one user's request for a brief, produced by the scheduler
//! - `JobRecord` / `JobStatus`: the durable job metadata tracked per job id
//! - Stage hand-off messages (`FetchRequest`, `ScriptRequest`, ...)
//! - Content types (`Bill`, `NewsItem`, `DialogueScript`, `BriefDigest`, `Brief`)
//!
//! All wire-facing types serialize with camelCase field names so the queue
//! payloads and store blobs match the shapes the rest of the platform reads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Topics substituted when a user's stored interests cannot be parsed.
pub const DEFAULT_TOPICS: &[&str] = &["healthcare", "education", "economy"];

/// A request to generate one user's brief.
///
/// Produced by the daily scheduler, consumed by the orchestrator. The full
/// payload travels only on this first hop; downstream messages carry the job
/// id plus minimal routing fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobRequest {
    pub user_id: String,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub district: Option<String>,
    pub policy_interests: Vec<String>,
    #[serde(default)]
    pub force_regenerate: bool,
}

/// Status of a job as it moves through the pipeline.
///
/// Each stage advances the status on entry; a stage that exhausts its retry
/// budget marks the job `Failed`. The uploader marks it `Complete` as its
/// final act.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Fetching,
    Scripting,
    Synthesizing,
    Uploading,
    Complete,
    Failed,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Fetching => write!(f, "fetching"),
            JobStatus::Scripting => write!(f, "scripting"),
            JobStatus::Synthesizing => write!(f, "synthesizing"),
            JobStatus::Uploading => write!(f, "uploading"),
            JobStatus::Complete => write!(f, "complete"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Durable job metadata, stored under `job:<id>:meta`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub job_id: String,
    pub user_id: String,
    pub email: String,
    pub policy_interests: Vec<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub district: Option<String>,
    #[serde(default)]
    pub force_regenerate: bool,
    pub created_at: DateTime<Utc>,
    pub status: JobStatus,
}

/// Routing message from the orchestrator to the data fetcher.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FetchRequest {
    pub job_id: String,
    pub user_id: String,
    pub policy_interests: Vec<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub district: Option<String>,
}

/// Routing message from the data fetcher to the script generator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScriptRequest {
    pub job_id: String,
    pub user_id: String,
}

/// Routing message from the script generator to the audio generator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AudioRequest {
    pub job_id: String,
}

/// Routing message from the audio generator to the uploader.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UploadRequest {
    pub job_id: String,
}

/// A bill relevant to a user's policy interests.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Bill {
    pub id: String,
    pub title: String,
    pub summary: String,
    pub policy_area: String,
    pub impact_score: f64,
    pub last_action_date: DateTime<Utc>,
}

/// A news result kept for the brief, stripped to bound payload size.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewsItem {
    pub title: String,
    pub url: String,
    pub description: String,
}

/// Speaker tag for a dialogue line; selects the synthesis voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    Host,
    Analyst,
}

/// One line of the generated dialogue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScriptLine {
    pub speaker: Speaker,
    pub text: String,
}

/// The full dialogue script, stored under `job:<id>:script`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DialogueScript {
    pub lines: Vec<ScriptLine>,
}

impl DialogueScript {
    /// Renders the script as a plain-text transcript.
    pub fn transcript(&self) -> String {
        self.lines
            .iter()
            .map(|line| {
                let tag = match line.speaker {
                    Speaker::Host => "Host",
                    Speaker::Analyst => "Analyst",
                };
                format!("{}: {}", tag, line.text)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Total word count across all lines.
    pub fn word_count(&self) -> usize {
        self.lines
            .iter()
            .map(|line| line.text.split_whitespace().count())
            .sum()
    }
}

/// Written companion to the audio, stored under `job:<id>:digest`.
///
/// Written by the script stage, consumed by the uploader when building the
/// final brief record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BriefDigest {
    pub transcript: String,
    pub digest: String,
    pub bill_ids: Vec<String>,
    pub policy_areas: Vec<String>,
}

/// Cadence of a brief.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BriefType {
    Daily,
    Weekly,
}

impl std::fmt::Display for BriefType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BriefType::Daily => write!(f, "daily"),
            BriefType::Weekly => write!(f, "weekly"),
        }
    }
}

/// The final persisted artifact of a completed job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Brief {
    pub user_id: String,
    pub brief_type: BriefType,
    pub audio_url: String,
    pub transcript: String,
    pub digest: String,
    pub bill_ids: Vec<String>,
    pub policy_areas: Vec<String>,
    pub duration_seconds: u32,
    pub generated_at: DateTime<Utc>,
}

/// Derives the job id for a queue message.
///
/// The id combines the message's creation timestamp with the first eight hex
/// characters of the message id, so redelivery of the same message reproduces
/// the same job id and the metadata write stays an idempotent overwrite.
pub fn mint_job_id(created_at: DateTime<Utc>, message_id: Uuid) -> String {
    let simple = message_id.simple().to_string();
    format!("brief-{}-{}", created_at.timestamp_millis(), &simple[..8])
}

/// Parses a stored interests value defensively.
///
/// The column holds a JSON-encoded string list. A missing, malformed, or
/// empty value substitutes the fixed default topics rather than failing the
/// user's job.
pub fn parse_interests(raw: Option<&str>) -> Vec<String> {
    let parsed = raw.and_then(|value| serde_json::from_str::<Vec<String>>(value).ok());

    match parsed {
        Some(interests) if !interests.is_empty() => interests,
        _ => DEFAULT_TOPICS.iter().map(|topic| topic.to_string()).collect(),
    }
}
