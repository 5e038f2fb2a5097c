//! Persistent SQL storage.
//!
//! The pipeline reads `users` and `bills` and writes `briefs`. Access goes
//! through the [`BriefDatabase`] trait so stages can run against PostgreSQL
//! in production and an in-memory fake in tests.

pub mod database;
pub mod memory;

pub use database::{Database, DatabaseError, UserRow};
pub use memory::MemoryDatabase;

use async_trait::async_trait;

use crate::jobs::{Bill, Brief};

/// SQL-backed collaborators of the pipeline.
#[async_trait]
pub trait BriefDatabase: Send + Sync {
    /// Returns all users with a non-null email.
    async fn users_with_email(&self) -> Result<Vec<UserRow>, DatabaseError>;

    /// Returns up to `limit` bills whose policy area matches any of the
    /// given interests and whose last action falls within the sliding
    /// window, ranked by impact score descending.
    async fn recent_bills(
        &self,
        interests: &[String],
        window_days: i32,
        limit: i64,
    ) -> Result<Vec<Bill>, DatabaseError>;

    /// Inserts a completed brief.
    async fn insert_brief(&self, brief: &Brief) -> Result<(), DatabaseError>;

    /// Deletes all briefs for a user. Returns the number deleted.
    async fn delete_briefs_for_user(&self, user_id: &str) -> Result<u64, DatabaseError>;
}
