//! Progress aggregation: accuracy and consecutive-day streak

use crate::error::Result;
use crate::storage::QuestionStore;
use crate::types::UserId;
use chrono::{Duration, NaiveDate};
use serde::Serialize;
use std::sync::Arc;

/// Consecutive days with activity, walking back from today or yesterday
///
/// `dates` may be unsorted and contain duplicates. Dates after `today` are
/// ignored.
pub fn current_streak(dates: &[NaiveDate], today: NaiveDate) -> u32 {
    let mut dates: Vec<NaiveDate> = dates.iter().copied().filter(|d| *d <= today).collect();
    dates.sort_unstable_by(|a, b| b.cmp(a));
    dates.dedup();

    let Some(&latest) = dates.first() else {
        return 0;
    };
    if latest < today - Duration::days(1) {
        return 0;
    }

    let mut streak = 1;
    let mut cursor = latest;
    for &date in &dates[1..] {
        if date != cursor - Duration::days(1) {
            break;
        }
        streak += 1;
        cursor = date;
    }
    streak
}

/// Percentage of correct answers rounded to two decimals; 0 with no answers
pub fn accuracy(correct: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let pct = correct as f64 / total as f64 * 100.0;
    (pct * 100.0).round() / 100.0
}

/// Aggregated progress of one user
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserStats {
    pub total_answered: u64,
    pub total_correct: u64,
    pub total_incorrect: u64,
    pub accuracy: f64,
    pub current_streak: u32,
}

impl UserStats {
    /// Fire markers shown next to the streak: one per three days plus one, at most six
    pub fn fire_count(&self) -> usize {
        if self.current_streak == 0 {
            return 0;
        }
        (self.current_streak as usize / 3).min(5) + 1
    }
}

/// Derives [`UserStats`] from the answer history
pub struct ProgressTracker {
    store: Arc<dyn QuestionStore>,
}

impl ProgressTracker {
    pub fn new(store: Arc<dyn QuestionStore>) -> Self {
        Self { store }
    }

    pub async fn user_stats(&self, user_id: UserId, today: NaiveDate) -> Result<UserStats> {
        let (total, correct) = self.store.answer_counts(user_id).await?;
        let dates = self.store.fetch_history_dates(user_id).await?;

        Ok(UserStats {
            total_answered: total,
            total_correct: correct,
            total_incorrect: total.saturating_sub(correct),
            accuracy: accuracy(correct, total),
            current_streak: current_streak(&dates, today),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(offset: i64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 5, 20).unwrap() - Duration::days(offset)
    }

    #[test]
    fn test_streak_consecutive_from_today() {
        assert_eq!(current_streak(&[day(0), day(1), day(2)], day(0)), 3);
    }

    #[test]
    fn test_streak_stops_at_first_gap() {
        assert_eq!(current_streak(&[day(0), day(3)], day(0)), 1);
        assert_eq!(current_streak(&[day(1), day(2), day(4), day(5)], day(0)), 2);
    }

    #[test]
    fn test_streak_broken_when_latest_is_old() {
        assert_eq!(current_streak(&[day(3)], day(0)), 0);
        assert_eq!(current_streak(&[day(2), day(3)], day(0)), 0);
        assert_eq!(current_streak(&[], day(0)), 0);
    }

    #[test]
    fn test_streak_starting_yesterday_and_unsorted_input() {
        assert_eq!(current_streak(&[day(3), day(1), day(2), day(1)], day(0)), 3);
    }

    #[test]
    fn test_accuracy_rounding() {
        assert_eq!(accuracy(0, 0), 0.0);
        assert_eq!(accuracy(2, 3), 66.67);
        assert_eq!(accuracy(1, 3), 33.33);
        assert_eq!(accuracy(5, 5), 100.0);
    }

    #[test]
    fn test_fire_count() {
        let stats = |streak| UserStats {
            total_answered: 0,
            total_correct: 0,
            total_incorrect: 0,
            accuracy: 0.0,
            current_streak: streak,
        };
        assert_eq!(stats(0).fire_count(), 0);
        assert_eq!(stats(1).fire_count(), 1);
        assert_eq!(stats(3).fire_count(), 2);
        assert_eq!(stats(14).fire_count(), 5);
        assert_eq!(stats(40).fire_count(), 6);
    }

    #[tokio::test]
    async fn test_user_stats_from_store() {
        use crate::storage::test_utils::{create_test_store, register_with_tracks, sample_corpus};

        let store = create_test_store().await.unwrap();
        let user = UserId(55);
        register_with_tracks(&store, user, &["sql"]).await.unwrap();
        store.import_corpus(sample_corpus()).await.unwrap();

        let today = day(0);
        let at = |d: NaiveDate| d.and_hms_opt(10, 0, 0).unwrap().and_utc();
        let questions = store.fetch_all_questions().await.unwrap();
        store
            .record_answer_at(user, questions[0].id, "a", true, 0.9, at(day(0)))
            .await
            .unwrap();
        store
            .record_answer_at(user, questions[1].id, "b", true, 0.8, at(day(1)))
            .await
            .unwrap();
        store
            .record_answer_at(user, questions[2].id, "c", false, 0.2, at(day(1)))
            .await
            .unwrap();

        let tracker = ProgressTracker::new(store);
        let stats = tracker.user_stats(user, today).await.unwrap();
        assert_eq!(stats.total_answered, 3);
        assert_eq!(stats.total_correct, 2);
        assert_eq!(stats.total_incorrect, 1);
        assert_eq!(stats.accuracy, 66.67);
        assert_eq!(stats.current_streak, 2);
    }
}
