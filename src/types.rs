//! Core data types for the daily quiz bot
//!
//! Users, questions, answer records, and evaluator verdicts, plus the small
//! value types (track sets, delivery times) that keep the storage encoding at
//! the storage boundary.

use crate::error::{QuizError, Result};
use chrono::{DateTime, NaiveDate, NaiveTime, Timelike, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Chat-platform identity of a user
///
/// Opaque to the bot; for Telegram it is the private chat id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Row id of a question in the bank
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuestionId(pub i64);

impl fmt::Display for QuestionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Set of subscribed track identifiers
///
/// Order-insensitive. Serialized as a sorted comma-joined string only when
/// written to storage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackSet(BTreeSet<String>);

impl TrackSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode the storage representation (`"python,sql"`); blank entries are dropped
    pub fn from_storage(raw: Option<&str>) -> Self {
        raw.map(|s| s.split(',').collect()).unwrap_or_default()
    }

    /// Encode for storage
    pub fn to_storage(&self) -> String {
        self.0.iter().cloned().collect::<Vec<_>>().join(",")
    }

    /// Add the track if absent, remove it if present.
    ///
    /// Returns whether the track is subscribed afterwards.
    pub fn toggle(&mut self, track: &str) -> bool {
        let track = track.trim();
        if track.is_empty() {
            return false;
        }
        if self.0.remove(track) {
            false
        } else {
            self.0.insert(track.to_string());
            true
        }
    }

    pub fn contains(&self, track: &str) -> bool {
        self.0.contains(track)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<S: AsRef<str>> FromIterator<S> for TrackSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|s| s.as_ref().trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        )
    }
}

static TIME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9]{2}:[0-9]{2}$").expect("Valid HH:MM regex"));

/// Preferred daily delivery time, 24-hour `HH:MM`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PreferredTime {
    hour: u8,
    minute: u8,
}

impl PreferredTime {
    pub fn new(hour: u8, minute: u8) -> Result<Self> {
        if hour > 23 || minute > 59 {
            return Err(QuizError::InvalidTime(format!("{:02}:{:02}", hour, minute)));
        }
        Ok(Self { hour, minute })
    }

    pub fn hour(&self) -> u8 {
        self.hour
    }

    pub fn minute(&self) -> u8 {
        self.minute
    }

    /// Whether `s` has the `HH:MM` shape, regardless of range
    pub fn matches_format(s: &str) -> bool {
        TIME_PATTERN.is_match(s.trim())
    }

    /// Whether a delivery may go out at the given time of day
    pub fn has_passed(&self, now: NaiveTime) -> bool {
        (now.hour(), now.minute()) >= (u32::from(self.hour), u32::from(self.minute))
    }
}

impl Default for PreferredTime {
    fn default() -> Self {
        Self { hour: 9, minute: 0 }
    }
}

impl FromStr for PreferredTime {
    type Err = QuizError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if !TIME_PATTERN.is_match(s) {
            return Err(QuizError::InvalidTime(s.to_string()));
        }
        let hour: u8 = s[0..2].parse().map_err(|_| QuizError::InvalidTime(s.to_string()))?;
        let minute: u8 = s[3..5].parse().map_err(|_| QuizError::InvalidTime(s.to_string()))?;
        Self::new(hour, minute)
    }
}

impl fmt::Display for PreferredTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

/// A registered chat user and their subscription state
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: UserId,
    pub tracks: TrackSet,
    pub preferred_time: PreferredTime,
    pub last_sent_date: Option<NaiveDate>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// A practice question from the bank
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: QuestionId,
    pub track: String,
    pub difficulty: String,
    pub question_text: String,
    pub canonical_answer: String,
    pub explanation: String,
}

/// One entry of the question corpus file, used for seeding and export
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusEntry {
    pub track: String,
    pub difficulty: String,
    pub question_text: String,
    pub canonical_answer: String,
    pub explanation: String,

    /// Display rendering preferred over `question_text` when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formatted_text: Option<String>,
}

impl From<&Question> for CorpusEntry {
    fn from(q: &Question) -> Self {
        Self {
            track: q.track.clone(),
            difficulty: q.difficulty.clone(),
            question_text: q.question_text.clone(),
            canonical_answer: q.canonical_answer.clone(),
            explanation: q.explanation.clone(),
            formatted_text: None,
        }
    }
}

/// A recorded answer of one user to one question
#[derive(Debug, Clone, PartialEq)]
pub struct AnswerRecord {
    pub id: i64,
    pub user_id: UserId,
    pub question_id: QuestionId,
    pub answered_correctly: bool,
    pub confidence: f64,
    pub user_answer: String,
    pub answered_at: DateTime<Utc>,
}

/// Structured judgment returned by the answer evaluator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub is_correct: bool,
    pub confidence: f64,
    #[serde(alias = "short_feedback")]
    pub feedback: String,
    #[serde(default)]
    pub hint: Option<String>,
}

impl Verdict {
    pub const FALLBACK_FEEDBACK: &'static str =
        "Unable to evaluate automatically. Please compare with the canonical answer.";

    /// Safe default used when the evaluator cannot be reached or parsed
    pub fn fallback() -> Self {
        Self {
            is_correct: false,
            confidence: 0.0,
            feedback: Self::FALLBACK_FEEDBACK.to_string(),
            hint: None,
        }
    }

    /// Force `is_correct = false` when confidence is under `threshold`
    pub fn gated(mut self, threshold: f64) -> Self {
        if self.confidence < threshold {
            self.is_correct = false;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_set_storage_is_order_insensitive() {
        let a = TrackSet::from_storage(Some("sql,python"));
        let b = TrackSet::from_storage(Some("python, sql,"));
        assert_eq!(a, b);
        assert_eq!(a.to_storage(), "python,sql");
        assert!(TrackSet::from_storage(None).is_empty());
        assert!(TrackSet::from_storage(Some("")).is_empty());
    }

    #[test]
    fn test_track_set_toggle() {
        let mut tracks = TrackSet::new();
        assert!(tracks.toggle("sql"));
        assert!(tracks.toggle("python"));
        assert!(!tracks.toggle("sql"));
        assert_eq!(tracks.to_storage(), "python");
        assert!(!tracks.toggle("  "));
        assert_eq!(tracks.len(), 1);
    }

    #[test]
    fn test_preferred_time_parsing() {
        assert_eq!("18:30".parse::<PreferredTime>().unwrap().to_string(), "18:30");
        assert_eq!(" 00:00 ".parse::<PreferredTime>().unwrap(), PreferredTime::new(0, 0).unwrap());
        assert!("24:00".parse::<PreferredTime>().is_err());
        assert!("12:60".parse::<PreferredTime>().is_err());
        assert!("9:00".parse::<PreferredTime>().is_err());
        assert!("nine".parse::<PreferredTime>().is_err());
        assert_eq!(PreferredTime::default().to_string(), "09:00");

        assert!(PreferredTime::matches_format("99:99"));
        assert!(!PreferredTime::matches_format("9:00"));
    }

    #[test]
    fn test_preferred_time_has_passed() {
        let t: PreferredTime = "09:30".parse().unwrap();
        assert!(!t.has_passed(NaiveTime::from_hms_opt(9, 29, 59).unwrap()));
        assert!(t.has_passed(NaiveTime::from_hms_opt(9, 30, 0).unwrap()));
        assert!(t.has_passed(NaiveTime::from_hms_opt(23, 0, 0).unwrap()));
    }

    #[test]
    fn test_verdict_gate() {
        let v = Verdict {
            is_correct: true,
            confidence: 0.74,
            feedback: String::new(),
            hint: None,
        };
        assert!(!v.clone().gated(0.75).is_correct);

        let v = Verdict { confidence: 0.75, ..v };
        assert!(v.gated(0.75).is_correct);
    }

    #[test]
    fn test_verdict_accepts_short_feedback_field() {
        let v: Verdict = serde_json::from_str(
            r#"{"is_correct": true, "confidence": 0.9, "short_feedback": "Nice", "hint": null}"#,
        )
        .unwrap();
        assert_eq!(v.feedback, "Nice");
        assert!(v.hint.is_none());
    }
}
