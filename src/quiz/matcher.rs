//! Answer matching and evaluation routing
//!
//! Given one free-text message, the matcher decides which pending question it
//! answers, obtains a verdict from the evaluator, applies the confidence gate,
//! and records confirmed-correct answers.
//!
//! # Flow
//!
//! 1. One candidate per subscribed track: the oldest unanswered question.
//! 2. A reply to a delivered question narrows the candidates to that question.
//! 3. Hint words bypass evaluation and collect one hint per candidate.
//! 4. Every candidate is evaluated concurrently; the highest confidence wins,
//!    ties going to the earliest candidate.
//! 5. Verdicts under [`CONFIDENCE_THRESHOLD`] are forced incorrect.
//! 6. Only correct answers are persisted.

use crate::error::Result;
use crate::quiz::formatter::{normalize, QuestionFormatter};
use crate::services::Evaluator;
use crate::storage::{QuestionStore, UserRegistry};
use crate::types::{Question, UserId, Verdict};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

/// Verdicts below this confidence are never accepted as correct
pub const CONFIDENCE_THRESHOLD: f64 = 0.75;

/// Message bodies that request a hint instead of an evaluation
pub const HINT_WORDS: [&str; 4] = ["hint", "help", "clue", "direction"];

/// Hint generated for one candidate question
#[derive(Debug, Clone, PartialEq)]
pub struct TrackHint {
    pub track: String,
    pub hint: String,
}

/// Final decision for one incoming message
#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    /// User unknown or subscribed to no track
    SetupRequired,
    /// No pending question in any subscribed track
    AllCompleted,
    /// The replied-to question already has a record
    AlreadyAnswered(Question),
    Hints(Vec<TrackHint>),
    /// Accepted and recorded
    Correct { question: Question, verdict: Verdict },
    /// Rejected; nothing recorded
    Incorrect { question: Question, verdict: Verdict },
}

/// Whether the message is a hint request
pub fn is_hint_request(text: &str) -> bool {
    let text = text.trim().to_lowercase();
    HINT_WORDS.contains(&text.as_str())
}

/// Index of the highest confidence; the first maximum wins
pub fn select_best(verdicts: &[Verdict]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (idx, verdict) in verdicts.iter().enumerate() {
        match best {
            Some(b) if verdict.confidence <= verdicts[b].confidence => {}
            _ => best = Some(idx),
        }
    }
    best
}

/// Routes free-text answers to pending questions
pub struct AnswerMatcher {
    store: Arc<dyn QuestionStore>,
    registry: Arc<dyn UserRegistry>,
    evaluator: Arc<dyn Evaluator>,
    formatter: Arc<QuestionFormatter>,
}

impl AnswerMatcher {
    pub fn new(
        store: Arc<dyn QuestionStore>,
        registry: Arc<dyn UserRegistry>,
        evaluator: Arc<dyn Evaluator>,
        formatter: Arc<QuestionFormatter>,
    ) -> Self {
        Self {
            store,
            registry,
            evaluator,
            formatter,
        }
    }

    /// Handle one message, optionally sent as a reply to `reply_to` text
    pub async fn handle_message(
        &self,
        user_id: UserId,
        text: &str,
        reply_to: Option<&str>,
    ) -> Result<MatchOutcome> {
        let Some(user) = self.registry.get(user_id).await? else {
            debug!("Message from unregistered user {}", user_id);
            return Ok(MatchOutcome::SetupRequired);
        };
        if user.tracks.is_empty() {
            return Ok(MatchOutcome::SetupRequired);
        }

        let mut candidates = self.pending_questions(user_id, user.tracks.iter()).await?;
        if candidates.is_empty() {
            return Ok(MatchOutcome::AllCompleted);
        }

        if let Some(prior) = reply_to {
            if let Some(target) = self.find_reply_target(prior).await? {
                if self.store.has_answer(user_id, target.id).await? {
                    debug!("User {} replied to answered question {}", user_id, target.id);
                    return Ok(MatchOutcome::AlreadyAnswered(target));
                }
                debug!("Reply narrowed candidates to question {}", target.id);
                candidates = vec![target];
            }
        }

        if is_hint_request(text) {
            return Ok(MatchOutcome::Hints(self.collect_hints(&candidates).await));
        }

        let verdicts = self.evaluate_candidates(&candidates, text).await;
        let Some(best) = select_best(&verdicts) else {
            return Ok(MatchOutcome::AllCompleted);
        };

        let question = candidates.swap_remove(best);
        let verdict = verdicts
            .into_iter()
            .nth(best)
            .unwrap_or_else(Verdict::fallback)
            .gated(CONFIDENCE_THRESHOLD);

        if verdict.is_correct {
            self.store
                .insert_answer_record(user_id, question.id, text, true, verdict.confidence)
                .await?;
            info!(
                "User {} answered question {} correctly (confidence {:.2})",
                user_id, question.id, verdict.confidence
            );
            Ok(MatchOutcome::Correct { question, verdict })
        } else {
            debug!(
                "User {} answer to question {} rejected (confidence {:.2})",
                user_id, question.id, verdict.confidence
            );
            Ok(MatchOutcome::Incorrect { question, verdict })
        }
    }

    /// Oldest unanswered question of each track, in track order
    pub async fn pending_questions<'a, I>(&self, user_id: UserId, tracks: I) -> Result<Vec<Question>>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut pending = Vec::new();
        for track in tracks {
            if let Some(q) = self.store.fetch_oldest_unanswered(user_id, track).await? {
                pending.push(q);
            }
        }
        Ok(pending)
    }

    /// First question (by id) whose normalized text occurs in the normalized prior message
    ///
    /// Both the stored text and the formatted rendering are tried.
    async fn find_reply_target(&self, prior: &str) -> Result<Option<Question>> {
        let haystack = normalize(prior);
        if haystack.is_empty() {
            return Ok(None);
        }

        let questions = self.store.fetch_all_questions().await?;
        Ok(questions.into_iter().find(|q| {
            let raw = normalize(&q.question_text);
            if !raw.is_empty() && haystack.contains(&raw) {
                return true;
            }
            self.formatter
                .rendering_for(&q.question_text)
                .map(normalize)
                .is_some_and(|fmt| !fmt.is_empty() && haystack.contains(&fmt))
        }))
    }

    async fn collect_hints(&self, candidates: &[Question]) -> Vec<TrackHint> {
        let mut hints = Vec::with_capacity(candidates.len());
        for q in candidates {
            let hint = self
                .evaluator
                .generate_hint(&q.question_text, &q.canonical_answer)
                .await;
            hints.push(TrackHint {
                track: q.track.clone(),
                hint,
            });
        }
        hints
    }

    /// Evaluate `text` against every candidate concurrently; results keep candidate order
    async fn evaluate_candidates(&self, candidates: &[Question], text: &str) -> Vec<Verdict> {
        let mut tasks = JoinSet::new();
        for (idx, q) in candidates.iter().enumerate() {
            let evaluator = Arc::clone(&self.evaluator);
            let question_text = q.question_text.clone();
            let canonical_answer = q.canonical_answer.clone();
            let candidate_text = text.to_string();
            tasks.spawn(async move {
                let verdict = evaluator
                    .evaluate(&question_text, &canonical_answer, &candidate_text)
                    .await;
                (idx, verdict)
            });
        }

        let mut verdicts: Vec<Option<Verdict>> = vec![None; candidates.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((idx, verdict)) => verdicts[idx] = Some(verdict),
                Err(e) => error!("Evaluation task failed: {}", e),
            }
        }

        verdicts
            .into_iter()
            .map(|v| v.unwrap_or_else(Verdict::fallback))
            .collect()
    }
}
