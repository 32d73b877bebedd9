//! Test utilities for storage initialization
//!
//! Provides throwaway file-backed stores and a small question corpus. Pooled
//! connections each open their own handle, so in-memory databases would not
//! share state; every store gets a unique temp file instead.

use crate::error::Result;
use crate::storage::sqlite::SqliteStore;
use crate::storage::UserRegistry;
use crate::types::{CorpusEntry, UserId};
use std::sync::Arc;

/// Create a store on a fresh temp file with the schema initialized
pub async fn create_test_store() -> Result<Arc<SqliteStore>> {
    let path = std::env::temp_dir().join(format!("daily_quiz_test_{}.db", uuid::Uuid::new_v4()));
    let store = SqliteStore::open(&path)?;
    store.init_schema().await?;
    Ok(Arc::new(store))
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
