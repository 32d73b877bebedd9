//! Quiz domain logic: answer matching, formatting, and progress

pub mod corpus;
pub mod formatter;
pub mod matcher;
pub mod progress;

pub use corpus::{read_corpus, write_corpus};
pub use formatter::{normalize, QuestionFormatter};
pub use matcher::{AnswerMatcher, MatchOutcome, TrackHint, CONFIDENCE_THRESHOLD, HINT_WORDS};
pub use progress::{current_streak, ProgressTracker, UserStats};
