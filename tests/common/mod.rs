//! Common test utilities and helpers

#![allow(dead_code)]

use async_trait::async_trait;
use daily_quiz_core::{
    error::Result,
    transport::{BotCommand, Incoming, OutgoingMessage},
    ChatTransport, CorpusEntry, Evaluator, SqliteStore, UserId, UserRegistry, Verdict,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

/// Create a file-backed store with the schema initialized
pub async fn create_test_store() -> Arc<SqliteStore> {
    // Pooled connections to :memory: would each see their own empty database
    let temp_file = std::env::temp_dir().join(format!("daily_quiz_it_{}.db", uuid::Uuid::new_v4()));
    let store = SqliteStore::open(&temp_file).expect("Failed to open test store");
    store.init_schema().await.expect("Failed to init schema");
    Arc::new(store)
}

/// Store seeded with [`sample_corpus`]
pub async fn create_seeded_store() -> Arc<SqliteStore> {
    let store = create_test_store().await;
    store
        .import_corpus(sample_corpus())
        .await
        .expect("Failed to seed questions");
    store
}

fn entry(track: &str, difficulty: &str, text: &str, answer: &str, explanation: &str) -> CorpusEntry {
    CorpusEntry {
        track: track.to_string(),
        difficulty: difficulty.to_string(),
        question_text: text.to_string(),
        canonical_answer: answer.to_string(),
        explanation: explanation.to_string(),
        formatted_text: None,
    }
}

/// Three SQL and two Python questions, in seeding order
pub fn sample_corpus() -> Vec<CorpusEntry> {
    vec![
        entry(
            "sql",
            "Easy",
            "Select all rows from the employees table.",
            "SELECT * FROM employees;",
            "SELECT * returns every column of every row.",
        ),
        entry(
            "sql",
            "Medium",
            "Count the employees in each department.",
            "SELECT department, COUNT(*) FROM employees GROUP BY department;",
            "GROUP BY collapses rows per department before COUNT aggregates them.",
        ),
        entry(
            "sql",
            "Hard",
            "Find the second highest salary.",
            "SELECT MAX(salary) FROM employees WHERE salary < (SELECT MAX(salary) FROM employees);",
            "The subquery excludes the top salary so MAX returns the runner-up.",
        ),
        entry(
            "python",
            "Easy",
            "Reverse a list named items.",
            "items[::-1]",
            "A negative step slice walks the list backwards.",
        ),
        entry(
            "python",
            "Medium",
            "Build a dict mapping each word in words to its length.",
            "{w: len(w) for w in words}",
            "A dict comprehension pairs each key with a computed value.",
        ),
    ]
}

/// Register a user subscribed to `tracks`
pub async fn register_with_tracks(
    store: &SqliteStore,
    user_id: UserId,
    tracks: &[&str],
) -> Result<()> {
    store.register(user_id).await?;
    for track in tracks {
        store.toggle_track(user_id, track).await?;
    }
    Ok(())
}

/// Path of the bundled question corpus
pub fn bundled_corpus_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("data")
        .join("questions.json")
}

/// Evaluator with canned verdicts keyed by question text
///
/// Unknown questions get an incorrect zero-confidence verdict.
#[derive(Default)]
pub struct ScriptedEvaluator {
    verdicts: HashMap<String, Verdict>,
    evaluations: AtomicUsize,
    hints: AtomicUsize,
}

impl ScriptedEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_verdict(mut self, question_text: &str, is_correct: bool, confidence: f64) -> Self {
        self.verdicts.insert(
            question_text.to_string(),
            Verdict {
                is_correct,
                confidence,
                feedback: format!("scripted {:.2}", confidence),
                hint: None,
            },
        );
        self
    }

    pub fn evaluation_count(&self) -> usize {
        self.evaluations.load(Ordering::SeqCst)
    }

    pub fn hint_count(&self) -> usize {
        self.hints.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Evaluator for ScriptedEvaluator {
    async fn evaluate(&self, question_text: &str, _canonical: &str, _candidate: &str) -> Verdict {
        self.evaluations.fetch_add(1, Ordering::SeqCst);
        self.verdicts
            .get(question_text)
            .cloned()
            .unwrap_or(Verdict {
                is_correct: false,
                confidence: 0.0,
                feedback: "unscripted".to_string(),
                hint: None,
            })
    }

    async fn generate_hint(&self, question_text: &str, _canonical: &str) -> String {
        self.hints.fetch_add(1, Ordering::SeqCst);
        format!("Think about: {}", question_text)
    }
}

/// Evaluator that accepts everything, holding answers containing "slow"
/// until [`GatedEvaluator::release`] is called
pub struct GatedEvaluator {
    open: watch::Sender<bool>,
}

impl GatedEvaluator {
    pub fn new() -> Self {
        let (open, _) = watch::channel(false);
        Self { open }
    }

    pub fn release(&self) {
        self.open.send_replace(true);
    }
}

#[async_trait]
impl Evaluator for GatedEvaluator {
    async fn evaluate(&self, _question_text: &str, _canonical: &str, candidate: &str) -> Verdict {
        if candidate.contains("slow") {
            let mut open = self.open.subscribe();
            let _ = open.wait_for(|released| *released).await;
        }
        Verdict {
            is_correct: true,
            confidence: 0.9,
            feedback: "gated".to_string(),
            hint: None,
        }
    }

    async fn generate_hint(&self, question_text: &str, _canonical: &str) -> String {
        format!("Think about: {}", question_text)
    }
}

/// Wait up to five seconds for `condition` to hold
pub async fn eventually<F>(mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// A message the bot sent or edited
#[derive(Debug, Clone)]
pub struct Sent {
    pub user_id: UserId,
    pub edited: Option<i64>,
    pub message: OutgoingMessage,
}

/// Transport that records every outbound call
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<Sent>>,
    commands: Mutex<Vec<BotCommand>>,
    typing: AtomicUsize,
    next_id: AtomicI64,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    /// Texts sent to `user_id`, oldest first
    pub fn texts_for(&self, user_id: UserId) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|s| s.user_id == user_id)
            .map(|s| s.message.text)
            .collect()
    }

    pub fn last_for(&self, user_id: UserId) -> Option<Sent> {
        self.sent().into_iter().rev().find(|s| s.user_id == user_id)
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }

    pub fn typing_count(&self) -> usize {
        self.typing.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatTransport for RecordingTransport {
    async fn send_message(&self, user_id: UserId, message: OutgoingMessage) -> Result<i64> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.sent.lock().unwrap().push(Sent {
            user_id,
            edited: None,
            message,
        });
        Ok(id)
    }

    async fn edit_message(
        &self,
        user_id: UserId,
        message_id: i64,
        message: OutgoingMessage,
    ) -> Result<()> {
        self.sent.lock().unwrap().push(Sent {
            user_id,
            edited: Some(message_id),
            message,
        });
        Ok(())
    }

    async fn send_typing(&self, _user_id: UserId) -> Result<()> {
        self.typing.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn answer_callback(&self, _callback_id: &str) -> Result<()> {
        Ok(())
    }

    async fn register_commands(&self, commands: Vec<BotCommand>) -> Result<()> {
        *self.commands.lock().unwrap() = commands;
        Ok(())
    }

    async fn poll_updates(&self) -> Result<Vec<Incoming>> {
        Ok(Vec::new())
    }
}

pub fn text(user_id: i64, body: &str) -> Incoming {
    Incoming::Message {
        user_id: UserId(user_id),
        text: body.to_string(),
        reply_to_text: None,
    }
}

pub fn reply(user_id: i64, body: &str, replied_to: &str) -> Incoming {
    Incoming::Message {
        user_id: UserId(user_id),
        text: body.to_string(),
        reply_to_text: Some(replied_to.to_string()),
    }
}

pub fn callback(user_id: i64, message_id: i64, data: &str) -> Incoming {
    Incoming::Callback {
        callback_id: format!("cb-{}-{}", user_id, data),
        user_id: UserId(user_id),
        message_id: Some(message_id),
        data: data.to_string(),
    }
}
