//! Storage layer for the daily quiz bot
//!
//! Two contracts: the question store (question bank and answer history) and
//! the user registry (subscription state). `SqliteStore` implements both.

pub mod sqlite;
#[cfg(test)]
pub(crate) mod test_utils;

use crate::error::Result;
use crate::types::{PreferredTime, Question, QuestionId, TrackSet, User, UserId};
use async_trait::async_trait;
use chrono::NaiveDate;

/// Question bank and per-user answer history
#[async_trait]
pub trait QuestionStore: Send + Sync {
    /// Lowest-id question of `track` the user has no answer record for
    async fn fetch_oldest_unanswered(&self, user_id: UserId, track: &str)
        -> Result<Option<Question>>;

    /// Retrieve a question by ID
    async fn fetch_by_id(&self, id: QuestionId) -> Result<Option<Question>>;

    /// Persist one answer record, stamped with the current time
    async fn insert_answer_record(
        &self,
        user_id: UserId,
        question_id: QuestionId,
        text: &str,
        correct: bool,
        confidence: f64,
    ) -> Result<()>;

    /// Whether the user has any record for the question
    async fn has_answer(&self, user_id: UserId, question_id: QuestionId) -> Result<bool>;

    /// The whole bank in id order
    async fn fetch_all_questions(&self) -> Result<Vec<Question>>;

    /// Distinct calendar dates (UTC) with at least one answer record
    async fn fetch_history_dates(&self, user_id: UserId) -> Result<Vec<NaiveDate>>;

    /// `(total, correct)` answer record counts
    async fn answer_counts(&self, user_id: UserId) -> Result<(u64, u64)>;
}

/// Subscription state of chat users
#[async_trait]
pub trait UserRegistry: Send + Sync {
    async fn get(&self, user_id: UserId) -> Result<Option<User>>;

    /// Create the user with defaults; no-op when already registered
    async fn register(&self, user_id: UserId) -> Result<()>;

    async fn set_preferred_time(&self, user_id: UserId, time: PreferredTime) -> Result<()>;

    /// Flip membership of `track` and return the resulting set
    async fn toggle_track(&self, user_id: UserId, track: &str) -> Result<TrackSet>;

    async fn set_active(&self, user_id: UserId, active: bool) -> Result<()>;

    async fn update_last_sent(&self, user_id: UserId, date: NaiveDate) -> Result<()>;

    /// Active users with at least one track who were not delivered to on `today`
    async fn list_eligible_for_delivery(&self, today: NaiveDate) -> Result<Vec<User>>;

    async fn count_users(&self) -> Result<usize>;
}
