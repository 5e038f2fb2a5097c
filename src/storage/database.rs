//! PostgreSQL database client.
//!
//! Provides the production implementation of [`super::BriefDatabase`] using
//! sqlx. All filters are bound parameters; user-controlled values (policy
//! interests in particular) never reach the SQL text.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool, Row};
use thiserror::Error;

use crate::jobs::{Bill, Brief};

use super::BriefDatabase;

/// Errors that can occur during database operations.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Connection to the database failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(#[from] sqlx::Error),
}

/// A user row as read by the scheduler.
#[derive(Debug, Clone, PartialEq)]
pub struct UserRow {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
    pub state: Option<String>,
    pub district: Option<String>,
    /// JSON-encoded string list; parsed defensively by the scheduler.
    pub interests: Option<String>,
}

/// PostgreSQL database client.
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Connects to the database and returns a new client.
    pub async fn connect(database_url: &str) -> Result<Self, DatabaseError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .min_connections(1)
            .acquire_timeout(std::time::Duration::from_secs(30))
            .connect(database_url)
            .await
            .map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))?;

        Ok(Self { pool })
    }

    /// Creates a new client from an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl BriefDatabase for Database {
    async fn users_with_email(&self) -> Result<Vec<UserRow>, DatabaseError> {
        let rows = sqlx::query(
            r#"
            SELECT id, email, name, state, district, interests
            FROM users
            WHERE email IS NOT NULL
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let users = rows
            .into_iter()
            .map(|row| {
                Ok(UserRow {
                    id: row.try_get("id")?,
                    email: row.try_get("email")?,
                    name: row.try_get("name")?,
                    state: row.try_get("state")?,
                    district: row.try_get("district")?,
                    interests: row.try_get("interests")?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()?;

        Ok(users)
    }

    async fn recent_bills(
        &self,
        interests: &[String],
        window_days: i32,
        limit: i64,
    ) -> Result<Vec<Bill>, DatabaseError> {
        let rows = sqlx::query(
            r#"
            SELECT id, title, summary, policy_area, impact_score, last_action_date
            FROM bills
            WHERE policy_area = ANY($1)
              AND last_action_date >= NOW() - make_interval(days => $2)
            ORDER BY impact_score DESC
            LIMIT $3
            "#,
        )
        .bind(interests)
        .bind(window_days)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let bills = rows
            .into_iter()
            .map(|row| {
                Ok(Bill {
                    id: row.try_get("id")?,
                    title: row.try_get("title")?,
                    summary: row.try_get("summary")?,
                    policy_area: row.try_get("policy_area")?,
                    impact_score: row.try_get("impact_score")?,
                    last_action_date: row.try_get::<DateTime<Utc>, _>("last_action_date")?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()?;

        Ok(bills)
    }

    async fn insert_brief(&self, brief: &Brief) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO briefs (
                user_id, brief_type, audio_url, transcript, digest,
                bill_ids, policy_areas, duration_seconds, generated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(&brief.user_id)
        .bind(brief.brief_type.to_string())
        .bind(&brief.audio_url)
        .bind(&brief.transcript)
        .bind(&brief.digest)
        .bind(&brief.bill_ids)
        .bind(&brief.policy_areas)
        .bind(brief.duration_seconds as i32)
        .bind(brief.generated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete_briefs_for_user(&self, user_id: &str) -> Result<u64, DatabaseError> {
        let result = sqlx::query("DELETE FROM briefs WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
