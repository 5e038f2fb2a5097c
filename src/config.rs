//! Pipeline configuration.
//!
//! Provides configuration for the queue infrastructure, stage workers, and
//! content limits, loaded from environment variables with sensible defaults.
//! External-service clients (search, speech, LLM, object storage) read their
//! own credentials via their `from_env` constructors.

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration for the brief pipeline.
#[derive(Debug, Clone)]
pub struct Config {
    // Infrastructure
    /// Redis connection URL (queues and the job store).
    pub redis_url: String,
    /// PostgreSQL connection URL (users, bills, briefs).
    pub database_url: String,
    /// Prefix for queue names (e.g. "briefcast" -> "briefcast:fetch").
    pub queue_prefix: String,

    // Workers
    /// Number of workers per stage.
    pub workers_per_stage: usize,
    /// Maximum delivery attempts before a message is dead-lettered.
    pub max_attempts: u32,
    /// Retry delay for orchestration- and fetch-class stages.
    pub retry_delay: Duration,
    /// Retry delay for the audio stage (speech synthesis is slow and billed).
    pub audio_retry_delay: Duration,

    // Content limits
    /// Sliding window of bill activity to consider, in days.
    pub bill_window_days: i32,
    /// Maximum bills per brief.
    pub max_bills: i64,
    /// Maximum news results per brief.
    pub max_news: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            database_url: "postgres://localhost/briefcast".to_string(),
            queue_prefix: "briefcast".to_string(),

            workers_per_stage: 2,
            max_attempts: 5,
            retry_delay: Duration::from_secs(60),
            audio_retry_delay: Duration::from_secs(300),

            bill_window_days: 30,
            max_bills: 2,
            max_news: 5,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `REDIS_URL`: Redis connection URL (default: redis://localhost:6379)
    /// - `DATABASE_URL`: PostgreSQL connection URL (required)
    /// - `BRIEFCAST_QUEUE_PREFIX`: Queue name prefix (default: briefcast)
    /// - `BRIEFCAST_WORKERS`: Workers per stage (default: 2)
    /// - `BRIEFCAST_MAX_ATTEMPTS`: Max delivery attempts (default: 5)
    /// - `BRIEFCAST_RETRY_DELAY_SECS`: Default retry delay (default: 60)
    /// - `BRIEFCAST_AUDIO_RETRY_DELAY_SECS`: Audio retry delay (default: 300)
    /// - `BRIEFCAST_BILL_WINDOW_DAYS`: Bill activity window (default: 30)
    /// - `BRIEFCAST_MAX_BILLS`: Bills per brief (default: 2)
    /// - `BRIEFCAST_MAX_NEWS`: News results per brief (default: 5)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if `DATABASE_URL` is missing or a variable has
    /// an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("REDIS_URL") {
            config.redis_url = url;
        }

        config.database_url = std::env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingEnvVar("DATABASE_URL".to_string()))?;

        if let Ok(prefix) = std::env::var("BRIEFCAST_QUEUE_PREFIX") {
            config.queue_prefix = prefix;
        }

        if let Ok(value) = std::env::var("BRIEFCAST_WORKERS") {
            config.workers_per_stage = parse_env("BRIEFCAST_WORKERS", &value)?;
        }

        if let Ok(value) = std::env::var("BRIEFCAST_MAX_ATTEMPTS") {
            config.max_attempts = parse_env("BRIEFCAST_MAX_ATTEMPTS", &value)?;
        }

        if let Ok(value) = std::env::var("BRIEFCAST_RETRY_DELAY_SECS") {
            let secs: u64 = parse_env("BRIEFCAST_RETRY_DELAY_SECS", &value)?;
            config.retry_delay = Duration::from_secs(secs);
        }

        if let Ok(value) = std::env::var("BRIEFCAST_AUDIO_RETRY_DELAY_SECS") {
            let secs: u64 = parse_env("BRIEFCAST_AUDIO_RETRY_DELAY_SECS", &value)?;
            config.audio_retry_delay = Duration::from_secs(secs);
        }

        if let Ok(value) = std::env::var("BRIEFCAST_BILL_WINDOW_DAYS") {
            config.bill_window_days = parse_env("BRIEFCAST_BILL_WINDOW_DAYS", &value)?;
        }

        if let Ok(value) = std::env::var("BRIEFCAST_MAX_BILLS") {
            config.max_bills = parse_env("BRIEFCAST_MAX_BILLS", &value)?;
        }

        if let Ok(value) = std::env::var("BRIEFCAST_MAX_NEWS") {
            config.max_news = parse_env("BRIEFCAST_MAX_NEWS", &value)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Sets the Redis URL.
    pub fn with_redis_url(mut self, url: impl Into<String>) -> Self {
        self.redis_url = url.into();
        self
    }

    /// Sets the database URL.
    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = url.into();
        self
    }

    /// Sets the number of workers per stage.
    pub fn with_workers_per_stage(mut self, workers: usize) -> Self {
        self.workers_per_stage = workers;
        self
    }

    /// Sets the maximum delivery attempts.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Returns the full Redis queue name for a stage queue.
    pub fn queue_name(&self, stage: &str) -> String {
        format!("{}:{}", self.queue_prefix, stage)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers_per_stage == 0 {
            return Err(ConfigError::ValidationFailed(
                "workers_per_stage must be at least 1".to_string(),
            ));
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if self.bill_window_days <= 0 {
            return Err(ConfigError::ValidationFailed(
                "bill_window_days must be positive".to_string(),
            ));
        }
        if self.max_bills <= 0 {
            return Err(ConfigError::ValidationFailed(
                "max_bills must be positive".to_string(),
            ));
        }
        if self.max_news == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_news must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("cannot parse '{}'", value),
    })
}
