//! Daily Quiz - practice questions by chat, judged by an LLM
//!
//! A chat bot that registers users, delivers one unseen practice question per
//! subscribed track every day, and grades free-text answers:
//! - Per-user delivery time and track selection
//! - Reply-aware matching of answers to pending questions
//! - LLM verdicts behind a fixed confidence gate
//! - Accuracy and consecutive-day streak stats
//!
//! # Architecture
//!
//! The system is organized into several layers:
//! - **Types**: Core data structures (User, Question, Verdict, etc.)
//! - **Storage**: Question store and user registry contracts, SQLite backend
//! - **Services**: Answer evaluator contract and its LLM implementation
//! - **Quiz**: Matching core, question formatter, progress aggregation
//! - **Transport**: Chat platform seam and the Telegram Bot API client
//! - **Bot / Scheduler**: Update dispatcher and daily delivery loop
//!
//! # Example
//!
//! ```ignore
//! use daily_quiz_core::{AnswerMatcher, QuestionFormatter, SqliteStore};
//! use std::sync::Arc;
//!
//! let store = Arc::new(SqliteStore::open("questions.db")?);
//! store.init_schema().await?;
//!
//! let matcher = AnswerMatcher::new(
//!     store.clone(),
//!     store.clone(),
//!     Arc::new(evaluator),
//!     Arc::new(QuestionFormatter::empty()),
//! );
//! let outcome = matcher.handle_message(user_id, "SELECT * FROM t;", None).await?;
//! ```

pub mod bot;
pub mod config;
pub mod error;
pub mod quiz;
pub mod scheduler;
pub mod services;
pub mod storage;
pub mod transport;
pub mod types;

// Re-export commonly used types
pub use bot::{BotServices, QuizBot, UpdateRouter};
pub use config::{BotConfig, Credentials};
pub use error::{QuizError, Result};
pub use quiz::{AnswerMatcher, MatchOutcome, ProgressTracker, QuestionFormatter, UserStats};
pub use scheduler::{DeliveryReport, DeliveryScheduler};
pub use services::{Evaluator, LlmConfig, LlmEvaluator};
pub use storage::{
    sqlite::{ImportSummary, SqliteStore},
    QuestionStore, UserRegistry,
};
pub use transport::{ChatTransport, TelegramClient};
pub use types::{
    AnswerRecord, CorpusEntry, PreferredTime, Question, QuestionId, TrackSet, User, UserId,
    Verdict,
};
