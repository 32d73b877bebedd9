//! SQLite storage backend implementation
//!
//! Implements both the question store and the user registry on one SQLite
//! file, using rusqlite behind a deadpool-sqlite connection pool. Every query
//! runs inside `interact` on a pooled connection.

use crate::error::{QuizError, Result};
use crate::storage::{QuestionStore, UserRegistry};
use crate::types::{
    AnswerRecord, CorpusEntry, PreferredTime, Question, QuestionId, TrackSet, User, UserId,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use deadpool_sqlite::{Config, Pool, PoolConfig, Runtime};
use rusqlite::{params, OptionalExtension, Row};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Counts from one corpus import
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub inserted: usize,
    /// Entries already in the bank
    pub skipped: usize,
}

/// Default connection pool size
const DEFAULT_POOL_SIZE: usize = 8;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Idempotent schema. `user_questions` has no uniqueness constraint on
/// (user_id, question_id): one record per pair is upheld by only asking
/// questions that have no record yet.
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    telegram_id INTEGER PRIMARY KEY NOT NULL,
    track TEXT DEFAULT NULL,
    preferred_time TEXT NOT NULL DEFAULT '09:00',
    last_sent_date TEXT,
    is_active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS questions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    track TEXT NOT NULL,
    difficulty TEXT NOT NULL,
    question_text TEXT NOT NULL,
    canonical_answer TEXT NOT NULL,
    explanation TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS user_questions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    question_id INTEGER NOT NULL,
    answered_correctly INTEGER NOT NULL,
    llm_confidence REAL NOT NULL,
    user_answer TEXT NOT NULL,
    answered_at TEXT NOT NULL,
    FOREIGN KEY (user_id) REFERENCES users(telegram_id),
    FOREIGN KEY (question_id) REFERENCES questions(id)
);

CREATE INDEX IF NOT EXISTS idx_questions_track ON questions(track, id);
CREATE INDEX IF NOT EXISTS idx_user_questions_user ON user_questions(user_id, question_id);
"#;

const QUESTION_COLUMNS: &str =
    "id, track, difficulty, question_text, canonical_answer, explanation";

const USER_COLUMNS: &str =
    "telegram_id, track, preferred_time, last_sent_date, is_active, created_at";

/// SQLite-backed question store and user registry
pub struct SqliteStore {
    pool: Pool,
}

impl SqliteStore {
    /// Open (or create) the database file with the default pool size
    ///
    /// The schema is not touched; call [`SqliteStore::init_schema`] once at startup.
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        Self::with_pool_size(db_path, DEFAULT_POOL_SIZE)
    }

    pub fn with_pool_size<P: AsRef<Path>>(db_path: P, pool_size: usize) -> Result<Self> {
        let path = db_path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    QuizError::Database(format!(
                        "Failed to create database directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let path_str = path.to_string_lossy().to_string();
        info!("Opening question database at: {} (pool_size: {})", path_str, pool_size);

        let mut config = Config::new(path_str);
        config.pool = Some(PoolConfig::new(pool_size));
        let pool = config.create_pool(Runtime::Tokio1).map_err(|e| {
            QuizError::Database(format!("Failed to create connection pool: {}", e))
        })?;

        Ok(Self { pool })
    }

    /// Create tables and indexes if they do not exist
    pub async fn init_schema(&self) -> Result<()> {
        self.interact(|conn| conn.execute_batch(SCHEMA)).await?;
        info!("Database schema ready");
        Ok(())
    }

    /// Run `f` on a pooled connection with foreign keys and a busy timeout enabled
    async fn interact<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut rusqlite::Connection) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.pool.get().await.map_err(|e| {
            QuizError::Database(format!("Failed to get connection from pool: {}", e))
        })?;

        conn.interact(move |conn| {
            conn.busy_timeout(Duration::from_secs(5))?;
            conn.pragma_update(None, "foreign_keys", true)?;
            f(conn)
        })
        .await
        .map_err(|e| QuizError::Database(format!("Pool interaction failed: {}", e)))?
        .map_err(QuizError::from)
    }

    /// Insert one question from the corpus and return its id
    pub async fn insert_question(&self, entry: &CorpusEntry) -> Result<QuestionId> {
        let entry = entry.clone();
        let id = self
            .interact(move |conn| {
                conn.execute(
                    "INSERT INTO questions (track, difficulty, question_text, canonical_answer, explanation)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        entry.track,
                        entry.difficulty,
                        entry.question_text,
                        entry.canonical_answer,
                        entry.explanation
                    ],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await?;

        Ok(QuestionId(id))
    }

    /// Seed a batch of questions in one transaction, in the given order
    ///
    /// Entries whose `(track, question_text)` is already in the bank are
    /// skipped, so re-running an import leaves existing ids and answer
    /// history untouched.
    pub async fn import_corpus(&self, entries: Vec<CorpusEntry>) -> Result<ImportSummary> {
        let summary = self
            .interact(move |conn| {
                let tx = conn.transaction()?;
                let mut summary = ImportSummary::default();
                {
                    let mut existing = tx.prepare(
                        "SELECT 1 FROM questions WHERE track = ?1 AND question_text = ?2 LIMIT 1",
                    )?;
                    let mut insert = tx.prepare(
                        "INSERT INTO questions (track, difficulty, question_text, canonical_answer, explanation)
                         VALUES (?1, ?2, ?3, ?4, ?5)",
                    )?;
                    for entry in &entries {
                        if existing.exists(params![entry.track, entry.question_text])? {
                            summary.skipped += 1;
                            continue;
                        }
                        insert.execute(params![
                            entry.track,
                            entry.difficulty,
                            entry.question_text,
                            entry.canonical_answer,
                            entry.explanation
                        ])?;
                        summary.inserted += 1;
                    }
                }
                tx.commit()?;
                Ok(summary)
            })
            .await?;

        info!(
            "Imported {} questions, skipped {} already present",
            summary.inserted, summary.skipped
        );
        Ok(summary)
    }

    pub async fn count_questions(&self) -> Result<usize> {
        let count: i64 = self
            .interact(|conn| conn.query_row("SELECT COUNT(*) FROM questions", [], |row| row.get(0)))
            .await?;
        Ok(count as usize)
    }

    /// Persist an answer record with an explicit timestamp
    pub async fn record_answer_at(
        &self,
        user_id: UserId,
        question_id: QuestionId,
        text: &str,
        correct: bool,
        confidence: f64,
        answered_at: DateTime<Utc>,
    ) -> Result<()> {
        debug!("Recording answer: user {} question {} correct {}", user_id, question_id, correct);

        let text = text.to_string();
        let stamp = answered_at.format(TIMESTAMP_FORMAT).to_string();
        self.interact(move |conn| {
            conn.execute(
                "INSERT INTO user_questions (user_id, question_id, answered_correctly, llm_confidence, user_answer, answered_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![user_id.0, question_id.0, correct, confidence, text, stamp],
            )
        })
        .await?;

        Ok(())
    }

    /// All answer records of a user, oldest first
    pub async fn answer_records(&self, user_id: UserId) -> Result<Vec<AnswerRecord>> {
        self.interact(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, question_id, answered_correctly, llm_confidence, user_answer, answered_at
                 FROM user_questions
                 WHERE user_id = ?1
                 ORDER BY id ASC",
            )?;
            let rows = stmt.query_map(params![user_id.0], |row| {
                let answered_at: String = row.get(6)?;
                Ok(AnswerRecord {
                    id: row.get(0)?,
                    user_id: UserId(row.get(1)?),
                    question_id: QuestionId(row.get(2)?),
                    answered_correctly: row.get(3)?,
                    confidence: row.get(4)?,
                    user_answer: row.get(5)?,
                    answered_at: parse_timestamp(6, &answered_at)?,
                })
            })?;
            rows.collect()
        })
        .await
    }

    async fn update_user<F>(&self, user_id: UserId, op: &'static str, f: F) -> Result<()>
    where
        F: FnOnce(&mut rusqlite::Connection) -> rusqlite::Result<usize> + Send + 'static,
    {
        let changed = self.interact(f).await?;
        if changed == 0 {
            return Err(QuizError::UserNotFound(user_id.0));
        }
        debug!("Updated user {}: {}", user_id, op);
        Ok(())
    }
}

fn parse_timestamp(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn parse_date(idx: usize, raw: &str) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn row_to_question(row: &Row<'_>) -> rusqlite::Result<Question> {
    Ok(Question {
        id: QuestionId(row.get(0)?),
        track: row.get(1)?,
        difficulty: row.get(2)?,
        question_text: row.get(3)?,
        canonical_answer: row.get(4)?,
        explanation: row.get(5)?,
    })
}

fn row_to_user(row: &Row<'_>) -> rusqlite::Result<User> {
    let track: Option<String> = row.get(1)?;
    let preferred_time: Option<String> = row.get(2)?;
    let last_sent_date: Option<String> = row.get(3)?;
    let created_at: String = row.get(5)?;

    Ok(User {
        id: UserId(row.get(0)?),
        tracks: TrackSet::from_storage(track.as_deref()),
        preferred_time: preferred_time
            .and_then(|t| t.parse::<PreferredTime>().ok())
            .unwrap_or_default(),
        last_sent_date: last_sent_date.map(|d| parse_date(3, &d)).transpose()?,
        is_active: row.get(4)?,
        created_at: parse_timestamp(5, &created_at)?,
    })
}

#[async_trait]
impl QuestionStore for SqliteStore {
    async fn fetch_oldest_unanswered(
        &self,
        user_id: UserId,
        track: &str,
    ) -> Result<Option<Question>> {
        let track = track.to_string();
        self.interact(move |conn| {
            conn.query_row(
                &format!(
                    "SELECT {} FROM questions q
                     WHERE q.track = ?1
                       AND q.id NOT IN (SELECT question_id FROM user_questions WHERE user_id = ?2)
                     ORDER BY q.id ASC
                     LIMIT 1",
                    QUESTION_COLUMNS
                ),
                params![track, user_id.0],
                row_to_question,
            )
            .optional()
        })
        .await
    }

    async fn fetch_by_id(&self, id: QuestionId) -> Result<Option<Question>> {
        self.interact(move |conn| {
            conn.query_row(
                &format!("SELECT {} FROM questions WHERE id = ?1", QUESTION_COLUMNS),
                params![id.0],
                row_to_question,
            )
            .optional()
        })
        .await
    }

    async fn insert_answer_record(
        &self,
        user_id: UserId,
        question_id: QuestionId,
        text: &str,
        correct: bool,
        confidence: f64,
    ) -> Result<()> {
        self.record_answer_at(user_id, question_id, text, correct, confidence, Utc::now())
            .await
    }

    async fn has_answer(&self, user_id: UserId, question_id: QuestionId) -> Result<bool> {
        let found: Option<i64> = self
            .interact(move |conn| {
                conn.query_row(
                    "SELECT 1 FROM user_questions WHERE user_id = ?1 AND question_id = ?2 LIMIT 1",
                    params![user_id.0, question_id.0],
                    |row| row.get(0),
                )
                .optional()
            })
            .await?;
        Ok(found.is_some())
    }

    async fn fetch_all_questions(&self) -> Result<Vec<Question>> {
        self.interact(|conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT {} FROM questions ORDER BY id ASC", QUESTION_COLUMNS))?;
            let rows = stmt.query_map([], row_to_question)?;
            rows.collect()
        })
        .await
    }

    async fn fetch_history_dates(&self, user_id: UserId) -> Result<Vec<NaiveDate>> {
        self.interact(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT DISTINCT date(answered_at)
                 FROM user_questions
                 WHERE user_id = ?1 AND date(answered_at) IS NOT NULL",
            )?;
            let rows = stmt.query_map(params![user_id.0], |row| {
                let raw: String = row.get(0)?;
                parse_date(0, &raw)
            })?;
            rows.collect()
        })
        .await
    }

    async fn answer_counts(&self, user_id: UserId) -> Result<(u64, u64)> {
        let (total, correct): (i64, i64) = self
            .interact(move |conn| {
                conn.query_row(
                    "SELECT COUNT(*), COALESCE(SUM(answered_correctly), 0)
                     FROM user_questions WHERE user_id = ?1",
                    params![user_id.0],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
            })
            .await?;
        Ok((total as u64, correct as u64))
    }
}

#[async_trait]
impl UserRegistry for SqliteStore {
    async fn get(&self, user_id: UserId) -> Result<Option<User>> {
        self.interact(move |conn| {
            conn.query_row(
                &format!("SELECT {} FROM users WHERE telegram_id = ?1", USER_COLUMNS),
                params![user_id.0],
                row_to_user,
            )
            .optional()
        })
        .await
    }

    async fn register(&self, user_id: UserId) -> Result<()> {
        let now = Utc::now().format(TIMESTAMP_FORMAT).to_string();
        let inserted = self
            .interact(move |conn| {
                conn.execute(
                    "INSERT OR IGNORE INTO users (telegram_id, is_active, created_at) VALUES (?1, 1, ?2)",
                    params![user_id.0, now],
                )
            })
            .await?;

        if inserted > 0 {
            info!("Registered new user {}", user_id);
        }
        Ok(())
    }

    async fn set_preferred_time(&self, user_id: UserId, time: PreferredTime) -> Result<()> {
        let time = time.to_string();
        self.update_user(user_id, "preferred_time", move |conn| {
            conn.execute(
                "UPDATE users SET preferred_time = ?1 WHERE telegram_id = ?2",
                params![time, user_id.0],
            )
        })
        .await
    }

    async fn toggle_track(&self, user_id: UserId, track: &str) -> Result<TrackSet> {
        let track = track.to_string();
        let tracks = self
            .interact(move |conn| {
                let tx = conn.transaction()?;
                let current: Option<Option<String>> = tx
                    .query_row(
                        "SELECT track FROM users WHERE telegram_id = ?1",
                        params![user_id.0],
                        |row| row.get(0),
                    )
                    .optional()?;

                let Some(current) = current else {
                    return Ok(None);
                };

                let mut tracks = TrackSet::from_storage(current.as_deref());
                tracks.toggle(&track);
                tx.execute(
                    "UPDATE users SET track = ?1 WHERE telegram_id = ?2",
                    params![tracks.to_storage(), user_id.0],
                )?;
                tx.commit()?;
                Ok(Some(tracks))
            })
            .await?;

        tracks.ok_or(QuizError::UserNotFound(user_id.0))
    }

    async fn set_active(&self, user_id: UserId, active: bool) -> Result<()> {
        self.update_user(user_id, "is_active", move |conn| {
            conn.execute(
                "UPDATE users SET is_active = ?1 WHERE telegram_id = ?2",
                params![active, user_id.0],
            )
        })
        .await
    }

    async fn update_last_sent(&self, user_id: UserId, date: NaiveDate) -> Result<()> {
        let date = date.format(DATE_FORMAT).to_string();
        self.update_user(user_id, "last_sent_date", move |conn| {
            conn.execute(
                "UPDATE users SET last_sent_date = ?1 WHERE telegram_id = ?2",
                params![date, user_id.0],
            )
        })
        .await
    }

    async fn list_eligible_for_delivery(&self, today: NaiveDate) -> Result<Vec<User>> {
        let today = today.format(DATE_FORMAT).to_string();
        let users: Vec<User> = self
            .interact(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM users
                     WHERE is_active = 1
                       AND track IS NOT NULL AND track != ''
                       AND (last_sent_date IS NULL OR last_sent_date != ?1)
                     ORDER BY telegram_id ASC",
                    USER_COLUMNS
                ))?;
                let rows = stmt.query_map(params![today], row_to_user)?;
                rows.collect()
            })
            .await?;

        Ok(users.into_iter().filter(|u| !u.tracks.is_empty()).collect())
    }

    async fn count_users(&self) -> Result<usize> {
        let count: i64 = self
            .interact(|conn| conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0)))
            .await?;
        Ok(count as usize)
    }
}
