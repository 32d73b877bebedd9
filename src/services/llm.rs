//! LLM-backed answer evaluator
//!
//! Talks to an OpenAI-compatible chat-completions endpoint for:
//! - Judging a free-text answer against the canonical answer
//! - Generating one-sentence hints that do not reveal the solution
//!
//! Both operations absorb every failure and return a safe default.

use crate::error::{QuizError, Result};
use crate::services::Evaluator;
use crate::types::Verdict;
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, warn};

/// Returned by [`LlmEvaluator::generate_hint`] when the model cannot be reached
pub const FALLBACK_HINT: &str = "Review the concepts related to this topic.";

const EVALUATION_SYSTEM_PROMPT: &str = r#"You are an expert Data Engineering mentor. Your task is to evaluate a student's answer to a technical question (SQL or Python).

Compare the USER ANSWER against the CANONICAL ANSWER.
- Logic and understanding are more important than exact syntax.
- If the user answer is essentially correct or shows they understand the core concept, mark it as is_correct: true.
- If correct: Provide detailed, encouraging feedback (3-4 sentences) that explains the concept deeper or adds interesting context.
- If incorrect: Provide short feedback (max 2 sentences) guiding them to the right track.

You MUST return a JSON object with the following fields:
1. "is_correct": boolean
2. "confidence": float (0.0 to 1.0) - how sure you are that the user understands the concept.
3. "short_feedback": string (3-4 sentences if correct, max 2 if incorrect)
4. "hint": string (only if is_correct is false, a small nudge)

Example Output:
{
  "is_correct": true,
  "confidence": 0.95,
  "short_feedback": "Spot on! UNION ALL skips the de-duplication step, which is why it is generally faster on large datasets.",
  "hint": null
}"#;

/// Configuration for the LLM evaluator
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// OpenAI API key
    pub api_key: SecretString,

    /// Model to use (default: gpt-4o-mini)
    pub model: String,

    /// Base URL of the chat-completions API, without trailing slash
    pub base_url: String,

    /// Sampling temperature for answer evaluation
    pub evaluation_temperature: f32,

    /// Sampling temperature for hint generation
    pub hint_temperature: f32,

    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: SecretString::from(std::env::var("OPENAI_API_KEY").unwrap_or_default()),
            model: "gpt-4o-mini".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            evaluation_temperature: 0.0,
            hint_temperature: 0.7,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Evaluator backed by a chat-completions model
pub struct LlmEvaluator {
    config: LlmConfig,
    client: reqwest::Client,
}

/// Chat-completions request format
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<Message<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

/// Chat-completions response format
#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

impl LlmEvaluator {
    /// Create a new evaluator; fails when no API key is configured
    pub fn new(config: LlmConfig) -> Result<Self> {
        if config.api_key.expose_secret().trim().is_empty() {
            return Err(QuizError::Config(config::ConfigError::Message(
                "OPENAI_API_KEY not set".to_string(),
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;

        Ok(Self { config, client })
    }

    /// Create with default config
    pub fn with_default() -> Result<Self> {
        Self::new(LlmConfig::default())
    }

    async fn try_evaluate(
        &self,
        question_text: &str,
        canonical_answer: &str,
        candidate_text: &str,
    ) -> Result<Verdict> {
        let user_prompt = format!(
            "QUESTION: {}\n\nCANONICAL ANSWER: {}\n\nUSER ANSWER: {}",
            question_text, canonical_answer, candidate_text
        );

        let request = ChatRequest {
            model: &self.config.model,
            temperature: self.config.evaluation_temperature,
            messages: vec![
                Message {
                    role: "system",
                    content: EVALUATION_SYSTEM_PROMPT,
                },
                Message {
                    role: "user",
                    content: &user_prompt,
                },
            ],
            response_format: Some(ResponseFormat { kind: "json_object" }),
        };

        let content = self.call_api(&request).await?;
        parse_verdict(&content)
    }

    async fn try_generate_hint(&self, question_text: &str, canonical_answer: &str) -> Result<String> {
        let prompt = format!(
            r#"You are a helpful tutor. A student is stuck on this question:

QUESTION: {}
CANONICAL ANSWER: {}

Provide a SHORT, helpful hint (max 1 sentence) that guides them towards the solution
without giving it away explicitly."#,
            question_text, canonical_answer
        );

        let request = ChatRequest {
            model: &self.config.model,
            temperature: self.config.hint_temperature,
            messages: vec![Message {
                role: "user",
                content: &prompt,
            }],
            response_format: None,
        };

        let hint = self.call_api(&request).await?;
        let hint = hint.trim();
        if hint.is_empty() {
            return Err(QuizError::LlmApi("Empty hint from API".to_string()));
        }
        Ok(hint.to_string())
    }

    /// Call the chat-completions API and return the first choice's content
    async fn call_api(&self, request: &ChatRequest<'_>) -> Result<String> {
        debug!("Calling chat-completions API (model: {})", self.config.model);

        let response = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url))
            .bearer_auth(self.config.api_key.expose_secret())
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(QuizError::LlmApi(format!(
                "API request failed with status {}: {}",
                status, error_text
            )));
        }

        let api_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| QuizError::LlmApi(format!("Failed to parse response: {}", e)))?;

        api_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| QuizError::LlmApi("Empty response from API".to_string()))
    }
}

/// Parse the model's JSON verdict, clamping confidence into `[0, 1]`
///
/// Missing `confidence` reads as 0.0 and missing feedback as an empty string.
pub fn parse_verdict(content: &str) -> Result<Verdict> {
    #[derive(Deserialize)]
    struct RawVerdict {
        #[serde(default)]
        is_correct: bool,
        #[serde(default)]
        confidence: f64,
        #[serde(default, alias = "short_feedback")]
        feedback: Option<String>,
        #[serde(default)]
        hint: Option<String>,
    }

    let raw: RawVerdict = serde_json::from_str(content.trim())?;
    let confidence = if raw.confidence.is_finite() {
        raw.confidence.clamp(0.0, 1.0)
    } else {
        0.0
    };

    Ok(Verdict {
        is_correct: raw.is_correct,
        confidence,
        feedback: raw.feedback.unwrap_or_default(),
        hint: raw.hint.filter(|h| !h.trim().is_empty()),
    })
}

#[async_trait]
impl Evaluator for LlmEvaluator {
    async fn evaluate(
        &self,
        question_text: &str,
        canonical_answer: &str,
        candidate_text: &str,
    ) -> Verdict {
        match self
            .try_evaluate(question_text, canonical_answer, candidate_text)
            .await
        {
            Ok(verdict) => verdict,
            Err(e) => {
                error!("LLM evaluation failed, using fallback verdict: {}", e);
                Verdict::fallback()
            }
        }
    }

    async fn generate_hint(&self, question_text: &str, canonical_answer: &str) -> String {
        match self.try_generate_hint(question_text, canonical_answer).await {
            Ok(hint) => hint,
            Err(e) => {
                warn!("Hint generation failed, using fallback hint: {}", e);
                FALLBACK_HINT.to_string()
            }
        }
    }
}
