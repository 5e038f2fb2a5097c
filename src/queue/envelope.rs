//! Queue message envelope.
//!
//! Every queue payload travels inside an envelope carrying the delivery
//! metadata the retry machinery needs: a stable message id, the creation
//! timestamp, and the attempt budget.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default maximum number of delivery attempts before dead-lettering.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// A queue message with delivery metadata.
///
/// The id and creation timestamp are fixed when the message is first
/// enqueued and survive redelivery, which is what lets the orchestrator
/// derive a job id that is stable across retries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope<T> {
    /// Stable message identifier.
    pub id: Uuid,
    /// When the message was first enqueued.
    pub created_at: DateTime<Utc>,
    /// Number of delivery attempts so far.
    pub attempts: u32,
    /// Maximum attempts before the message is dead-lettered.
    pub max_attempts: u32,
    /// The stage payload.
    pub payload: T,
}

impl<T> Envelope<T> {
    /// Wraps a payload in a fresh envelope.
    pub fn new(payload: T) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            attempts: 0,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            payload,
        }
    }

    /// Sets the maximum number of delivery attempts.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Increments the attempt counter.
    ///
    /// Called once per delivery, before the handler runs.
    pub fn increment_attempts(&mut self) {
        self.attempts += 1;
    }

    /// Returns whether the message still has retry budget.
    pub fn should_retry(&self) -> bool {
        self.attempts < self.max_attempts
    }

    /// Returns the number of remaining delivery attempts.
    pub fn remaining_attempts(&self) -> u32 {
        self.max_attempts.saturating_sub(self.attempts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_envelope_defaults() {
        let envelope = Envelope::new("payload");

        assert!(!envelope.id.is_nil());
        assert_eq!(envelope.attempts, 0);
        assert_eq!(envelope.max_attempts, DEFAULT_MAX_ATTEMPTS);
        assert!(envelope.should_retry());
    }

    #[test]
    fn test_attempt_budget() {
        let mut envelope = Envelope::new(1u32).with_max_attempts(2);

        assert_eq!(envelope.remaining_attempts(), 2);

        envelope.increment_attempts();
        assert!(envelope.should_retry());

        envelope.increment_attempts();
        assert!(!envelope.should_retry());
        assert_eq!(envelope.remaining_attempts(), 0);
    }

    #[test]
    fn test_serialization_preserves_identity() {
        let envelope = Envelope::new(42u32);
        let json = serde_json::to_string(&envelope).expect("serialize");
        let parsed: Envelope<u32> = serde_json::from_str(&json).expect("deserialize");

        assert_eq!(parsed.id, envelope.id);
        assert_eq!(parsed.created_at, envelope.created_at);
        assert_eq!(parsed.payload, 42);
    }

    #[test]
    fn test_wire_field_names() {
        let envelope = Envelope::new(1u8);
        let json = serde_json::to_value(&envelope).expect("serialize");

        assert!(json.get("createdAt").is_some());
        assert!(json.get("maxAttempts").is_some());
    }
}
