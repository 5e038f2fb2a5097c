//! In-memory database fake.
//!
//! Backs tests; holds fixed users and bills and collects inserted briefs.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{Duration, Utc};

use crate::jobs::{Bill, Brief};

use super::{BriefDatabase, DatabaseError, UserRow};

/// Database fake over in-process vectors.
#[derive(Debug, Default)]
pub struct MemoryDatabase {
    users: Vec<UserRow>,
    bills: Vec<Bill>,
    briefs: Mutex<Vec<Brief>>,
}

impl MemoryDatabase {
    /// Creates an empty database.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a database seeded with users and bills.
    pub fn with_data(users: Vec<UserRow>, bills: Vec<Bill>) -> Self {
        Self {
            users,
            bills,
            briefs: Mutex::new(Vec::new()),
        }
    }

    /// Returns a copy of all inserted briefs.
    pub fn briefs(&self) -> Vec<Brief> {
        self.briefs.lock().expect("briefs mutex poisoned").clone()
    }
}

#[async_trait]
impl BriefDatabase for MemoryDatabase {
    async fn users_with_email(&self) -> Result<Vec<UserRow>, DatabaseError> {
        Ok(self.users.clone())
    }

    async fn recent_bills(
        &self,
        interests: &[String],
        window_days: i32,
        limit: i64,
    ) -> Result<Vec<Bill>, DatabaseError> {
        let cutoff = Utc::now() - Duration::days(window_days as i64);

        let mut matched: Vec<Bill> = self
            .bills
            .iter()
            .filter(|bill| interests.contains(&bill.policy_area))
            .filter(|bill| bill.last_action_date >= cutoff)
            .cloned()
            .collect();

        matched.sort_by(|a, b| {
            b.impact_score
                .partial_cmp(&a.impact_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        matched.truncate(limit as usize);

        Ok(matched)
    }

    async fn insert_brief(&self, brief: &Brief) -> Result<(), DatabaseError> {
        self.briefs
            .lock()
            .expect("briefs mutex poisoned")
            .push(brief.clone());
        Ok(())
    }

    async fn delete_briefs_for_user(&self, user_id: &str) -> Result<u64, DatabaseError> {
        let mut briefs = self.briefs.lock().expect("briefs mutex poisoned");
        let before = briefs.len();
        briefs.retain(|brief| brief.user_id != user_id);
        Ok((before - briefs.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::BriefType;

    fn bill(id: &str, area: &str, score: f64, days_ago: i64) -> Bill {
        Bill {
            id: id.to_string(),
            title: format!("Bill {}", id),
            summary: "A summary.".to_string(),
            policy_area: area.to_string(),
            impact_score: score,
            last_action_date: Utc::now() - Duration::days(days_ago),
        }
    }

    #[tokio::test]
    async fn test_recent_bills_filters_ranks_and_truncates() {
        let db = MemoryDatabase::with_data(
            vec![],
            vec![
                bill("b1", "healthcare", 0.4, 5),
                bill("b2", "healthcare", 0.9, 10),
                bill("b3", "healthcare", 0.7, 2),
                bill("b4", "education", 1.0, 1),
                bill("b5", "healthcare", 0.8, 45),
            ],
        );

        let bills = db
            .recent_bills(&["healthcare".to_string()], 30, 2)
            .await
            .expect("query should work");

        let ids: Vec<&str> = bills.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, vec!["b2", "b3"]);
    }

    #[tokio::test]
    async fn test_insert_and_delete_briefs() {
        let db = MemoryDatabase::new();
        let brief = Brief {
            user_id: "u1".to_string(),
            brief_type: BriefType::Daily,
            audio_url: "https://cdn.example/briefs/u1/j.mp3".to_string(),
            transcript: "Host: hello".to_string(),
            digest: "One bill moved.".to_string(),
            bill_ids: vec!["b1".to_string()],
            policy_areas: vec!["healthcare".to_string()],
            duration_seconds: 30,
            generated_at: Utc::now(),
        };

        db.insert_brief(&brief).await.expect("insert should work");
        assert_eq!(db.briefs().len(), 1);

        let deleted = db
            .delete_briefs_for_user("u1")
            .await
            .expect("delete should work");
        assert_eq!(deleted, 1);
        assert!(db.briefs().is_empty());
    }
}
