//! Services layer for the daily quiz bot
//!
//! Provides the answer evaluator seam and its LLM implementation.

pub mod llm;

pub use llm::{LlmConfig, LlmEvaluator, FALLBACK_HINT};

use crate::types::Verdict;
use async_trait::async_trait;

/// Opaque scorer of free-text answers
///
/// Implementations never fail: transport or parse problems degrade to
/// [`Verdict::fallback`] and a generic hint.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Evaluator: Send + Sync {
    async fn evaluate(
        &self,
        question_text: &str,
        canonical_answer: &str,
        candidate_text: &str,
    ) -> Verdict;

    /// One-sentence nudge that does not give the answer away
    async fn generate_hint(&self, question_text: &str, canonical_answer: &str) -> String;
}
