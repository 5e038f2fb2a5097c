//! In-memory message sink.
//!
//! Backs tests and local development; the production deployment sends
//! through [`super::StageQueue`].

use std::sync::Mutex;

use async_trait::async_trait;
use serde::Serialize;

use super::{MessageSink, QueueError};

/// Message sink that collects sent messages in memory.
#[derive(Debug)]
pub struct MemorySink<T> {
    sent: Mutex<Vec<T>>,
}

impl<T> Default for MemorySink<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> MemorySink<T> {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Removes and returns all messages sent so far.
    pub fn drain(&self) -> Vec<T> {
        std::mem::take(&mut *self.sent.lock().expect("sink mutex poisoned"))
    }

    /// Returns the number of messages sent so far.
    pub fn sent_count(&self) -> usize {
        self.sent.lock().expect("sink mutex poisoned").len()
    }
}

#[async_trait]
impl<T> MessageSink<T> for MemorySink<T>
where
    T: Serialize + Send + Sync + 'static,
{
    async fn send(&self, message: T) -> Result<(), QueueError> {
        self.sent.lock().expect("sink mutex poisoned").push(message);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sink_collects_messages() {
        let sink = MemorySink::new();

        sink.send("first").await.expect("send");
        sink.send("second").await.expect("send");

        assert_eq!(sink.sent_count(), 2);
        assert_eq!(sink.drain(), vec!["first", "second"]);
        assert_eq!(sink.sent_count(), 0);
    }
}
