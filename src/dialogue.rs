//! Dialogue script writing.
//!
//! Turns the fetched bills and news into a two-speaker script via an
//! OpenAI-compatible chat-completions API. The completion is expected to be
//! plain text with `HOST:` / `ANALYST:`-prefixed lines; anything else fails
//! parsing and the stage retries.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

use crate::error::DialogueError;
use crate::jobs::{Bill, DialogueScript, NewsItem, ScriptLine, Speaker};

/// Default model for script writing.
const DEFAULT_MODEL: &str = "anthropic/claude-sonnet-4.5";

/// Minimum number of parsed lines for a usable script.
const MIN_SCRIPT_LINES: usize = 2;

/// System prompt for dialogue generation.
pub const DIALOGUE_SYSTEM_PROMPT: &str = r#"
You write short two-voice podcast scripts summarizing civic policy activity
for one listener. The two speakers are a HOST who frames the conversation
and an ANALYST who explains substance.

Rules:
1. Every line starts with "HOST:" or "ANALYST:".
2. Alternate speakers; 8-14 lines total.
3. Cover every bill you are given, then the news items.
4. Conversational tone, no markdown, no headings, no stage directions.
"#;

/// Writer of dialogue scripts from fetched civic data.
#[async_trait]
pub trait DialogueWriter: Send + Sync {
    /// Produces the dialogue script for one brief.
    async fn write_dialogue(
        &self,
        bills: &[Bill],
        news: &[NewsItem],
    ) -> Result<DialogueScript, DialogueError>;
}

/// Dialogue writer backed by an OpenAI-compatible chat-completions API.
pub struct LlmDialogueWriter {
    api_base: String,
    api_key: Option<String>,
    model: String,
    http_client: Client,
}

impl LlmDialogueWriter {
    /// Creates a new writer with explicit configuration.
    pub fn new(api_base: String, api_key: Option<String>, model: String) -> Self {
        Self {
            api_base,
            api_key,
            model,
            http_client: Client::builder()
                .timeout(Duration::from_secs(120))
                .build()
                .expect("Failed to build HTTP client"),
        }
    }

    /// Creates a writer from environment variables.
    ///
    /// Reads:
    /// - `LLM_API_BASE`: base URL for the API (required)
    /// - `LLM_API_KEY`: API key for authentication (optional)
    /// - `LLM_MODEL`: model identifier (defaults to a hosted default)
    pub fn from_env() -> Result<Self, DialogueError> {
        let api_base = env::var("LLM_API_BASE").map_err(|_| DialogueError::MissingApiBase)?;
        let api_key = env::var("LLM_API_KEY").ok();
        let model = env::var("LLM_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());

        Ok(Self::new(api_base, api_key, model))
    }

    /// Builds the user prompt describing the fetched data.
    fn build_prompt(bills: &[Bill], news: &[NewsItem]) -> String {
        let mut prompt = String::from("Write today's brief from this material.\n\nBills:\n");

        if bills.is_empty() {
            prompt.push_str("(none)\n");
        }
        for bill in bills {
            prompt.push_str(&format!(
                "- [{}] {} ({}): {}\n",
                bill.id, bill.title, bill.policy_area, bill.summary
            ));
        }

        prompt.push_str("\nNews:\n");
        if news.is_empty() {
            prompt.push_str("(none)\n");
        }
        for item in news {
            prompt.push_str(&format!("- {}: {}\n", item.title, item.description));
        }

        prompt
    }
}

#[async_trait]
impl DialogueWriter for LlmDialogueWriter {
    async fn write_dialogue(
        &self,
        bills: &[Bill],
        news: &[NewsItem],
    ) -> Result<DialogueScript, DialogueError> {
        let request = ApiRequest {
            model: self.model.clone(),
            messages: vec![
                ApiMessage {
                    role: "system".to_string(),
                    content: DIALOGUE_SYSTEM_PROMPT.trim().to_string(),
                },
                ApiMessage {
                    role: "user".to_string(),
                    content: Self::build_prompt(bills, news),
                },
            ],
            temperature: Some(0.7),
        };

        let url = format!("{}/chat/completions", self.api_base);

        let mut http_request = self
            .http_client
            .post(&url)
            .header("Content-Type", "application/json");

        if let Some(ref api_key) = self.api_key {
            http_request = http_request.header("Authorization", format!("Bearer {}", api_key));
        }

        let response = http_request
            .json(&request)
            .send()
            .await
            .map_err(|e| DialogueError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error response".to_string());
            return Err(DialogueError::ApiError {
                code: status.as_u16(),
                message,
            });
        }

        let body: ApiResponse = response
            .json()
            .await
            .map_err(|e| DialogueError::ParseError(e.to_string()))?;

        let content = body
            .choices
            .first()
            .map(|choice| choice.message.content.as_str())
            .ok_or_else(|| DialogueError::ParseError("response contained no choices".to_string()))?;

        parse_dialogue(content)
    }
}

/// Parses completion text into a dialogue script.
///
/// Lines must start with `HOST:` or `ANALYST:` (case-insensitive); untagged
/// lines continue the previous speaker's line. Fewer than two tagged lines
/// is a malformed script.
pub fn parse_dialogue(text: &str) -> Result<DialogueScript, DialogueError> {
    let mut lines: Vec<ScriptLine> = Vec::new();

    for raw in text.lines() {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            continue;
        }

        if let Some(rest) = strip_tag(trimmed, "HOST:") {
            lines.push(ScriptLine {
                speaker: Speaker::Host,
                text: rest.to_string(),
            });
        } else if let Some(rest) = strip_tag(trimmed, "ANALYST:") {
            lines.push(ScriptLine {
                speaker: Speaker::Analyst,
                text: rest.to_string(),
            });
        } else if let Some(last) = lines.last_mut() {
            last.text.push(' ');
            last.text.push_str(trimmed);
        }
        // Untagged text before the first tagged line is preamble; drop it.
    }

    if lines.len() < MIN_SCRIPT_LINES {
        return Err(DialogueError::MalformedDialogue(format!(
            "expected at least {} tagged lines, found {}",
            MIN_SCRIPT_LINES,
            lines.len()
        )));
    }

    Ok(DialogueScript { lines })
}

fn strip_tag<'a>(line: &'a str, tag: &str) -> Option<&'a str> {
    let prefix = line.get(..tag.len())?;
    if prefix.eq_ignore_ascii_case(tag) {
        Some(line[tag.len()..].trim_start())
    } else {
        None
    }
}

/// Internal request structure for the chat-completions API.
#[derive(Debug, Serialize)]
struct ApiRequest {
    model: String,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    content: String,
}

/// Internal response structure from the chat-completions API.
#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_parse_dialogue_alternating_lines() {
        let text = "HOST: Welcome back to your daily brief.\nANALYST: Two bills moved this week.\nHOST: Let's start with healthcare.";

        let script = parse_dialogue(text).expect("parse should work");
        assert_eq!(script.lines.len(), 3);
        assert_eq!(script.lines[0].speaker, Speaker::Host);
        assert_eq!(script.lines[1].speaker, Speaker::Analyst);
        assert_eq!(script.lines[1].text, "Two bills moved this week.");
    }

    #[test]
    fn test_parse_dialogue_continuation_lines() {
        let text = "HOST: This line\ncontinues here.\nANALYST: Reply.";

        let script = parse_dialogue(text).expect("parse should work");
        assert_eq!(script.lines.len(), 2);
        assert_eq!(script.lines[0].text, "This line continues here.");
    }

    #[test]
    fn test_parse_dialogue_case_insensitive_tags() {
        let text = "host: one\nAnalyst: two";
        let script = parse_dialogue(text).expect("parse should work");
        assert_eq!(script.lines[0].speaker, Speaker::Host);
        assert_eq!(script.lines[1].speaker, Speaker::Analyst);
    }

    #[test]
    fn test_parse_dialogue_rejects_untagged_text() {
        let err = parse_dialogue("Just prose without any speaker tags.").unwrap_err();
        assert!(matches!(err, DialogueError::MalformedDialogue(_)));
    }

    #[test]
    fn test_parse_dialogue_drops_preamble() {
        let text = "Here is your script:\nHOST: one\nANALYST: two";
        let script = parse_dialogue(text).expect("parse should work");
        assert_eq!(script.lines.len(), 2);
        assert_eq!(script.lines[0].text, "one");
    }

    #[test]
    fn test_build_prompt_lists_bills_and_news() {
        let bills = vec![Bill {
            id: "hr-1024".to_string(),
            title: "Rural Care Access Act".to_string(),
            summary: "Expands clinic funding.".to_string(),
            policy_area: "healthcare".to_string(),
            impact_score: 0.8,
            last_action_date: Utc::now(),
        }];
        let news = vec![NewsItem {
            title: "Clinics brace for change".to_string(),
            url: "https://news.example/a".to_string(),
            description: "Rural providers respond.".to_string(),
        }];

        let prompt = LlmDialogueWriter::build_prompt(&bills, &news);
        assert!(prompt.contains("hr-1024"));
        assert!(prompt.contains("Rural Care Access Act"));
        assert!(prompt.contains("Clinics brace for change"));
    }

    #[test]
    fn test_build_prompt_empty_sections() {
        let prompt = LlmDialogueWriter::build_prompt(&[], &[]);
        assert!(prompt.contains("(none)"));
    }
}
