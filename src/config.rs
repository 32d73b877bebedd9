//! Bot configuration and credentials
//!
//! Settings are layered with the `config` crate: built-in defaults, then an
//! optional TOML file, then `DAILY_QUIZ_*` environment variables (nested keys
//! separated by `__`, e.g. `DAILY_QUIZ_SCHEDULER__INTERVAL_SECS=300`).
//!
//! Credentials never live in the file. They come from `TELEGRAM_BOT_TOKEN` and
//! `OPENAI_API_KEY` and are held as [`SecretString`].

use crate::error::{QuizError, Result};
use crate::services::LlmConfig;
use crate::transport::TelegramConfig;
use config::{Config, Environment, File};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

const ENV_PREFIX: &str = "DAILY_QUIZ";
const TELEGRAM_TOKEN_VAR: &str = "TELEGRAM_BOT_TOKEN";
const OPENAI_KEY_VAR: &str = "OPENAI_API_KEY";

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    pub database: DatabaseConfig,
    pub llm: LlmSettings,
    pub telegram: TelegramSettings,
    pub scheduler: SchedulerConfig,
    pub quiz: QuizConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite database file
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        let base = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            path: base.join("daily-quiz").join("questions.db"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub model: String,
    pub base_url: String,
    pub evaluation_temperature: f32,
    pub hint_temperature: f32,
    pub timeout_secs: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            evaluation_temperature: 0.0,
            hint_temperature: 0.7,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramSettings {
    pub api_base: String,
    pub poll_timeout_secs: u64,
}

impl Default for TelegramSettings {
    fn default() -> Self {
        Self {
            api_base: "https://api.telegram.org".to_string(),
            poll_timeout_secs: 30,
        }
    }
}

/// Delivery scheduler settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Polling period between delivery passes
    pub interval_secs: u64,

    /// Pause between consecutive sends
    pub send_pause_ms: u64,

    /// Mark users inactive when the platform reports them unreachable
    pub deactivate_on_blocked: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_secs: 600,
            send_pause_ms: 500,
            deactivate_on_blocked: false,
        }
    }
}

impl SchedulerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn send_pause(&self) -> Duration {
        Duration::from_millis(self.send_pause_ms)
    }
}

/// A selectable track
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackConfig {
    /// Identifier stored in the user's track set
    pub id: String,

    /// Button label
    pub label: String,
}

impl TrackConfig {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuizConfig {
    pub tracks: Vec<TrackConfig>,

    /// Question corpus used for seeding and display renderings
    pub corpus_path: Option<PathBuf>,
}

impl Default for QuizConfig {
    fn default() -> Self {
        Self {
            tracks: vec![
                TrackConfig::new("sql", "SQL"),
                TrackConfig::new("python", "Python"),
            ],
            corpus_path: None,
        }
    }
}

impl BotConfig {
    /// Load from defaults, an optional TOML file, and the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            debug!("Loading configuration from {}", path.display());
            builder = builder.add_source(File::from(path).required(false));
        }

        let config: BotConfig = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        info!(
            "Configuration loaded (database: {}, tracks: {})",
            config.database.path.display(),
            config.quiz.tracks.len()
        );
        Ok(config)
    }

    /// Reject settings the bot cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.quiz.tracks.is_empty() {
            return Err(invalid("quiz.tracks must list at least one track"));
        }

        let mut seen = HashSet::new();
        for track in &self.quiz.tracks {
            let id = track.id.trim();
            if id.is_empty() || id.contains(',') || id != track.id {
                return Err(invalid(&format!("invalid track id '{}'", track.id)));
            }
            if !seen.insert(id) {
                return Err(invalid(&format!("duplicate track id '{}'", id)));
            }
        }

        if self.scheduler.interval_secs == 0 {
            return Err(invalid("scheduler.interval_secs must be positive"));
        }
        if self.llm.timeout_secs == 0 {
            return Err(invalid("llm.timeout_secs must be positive"));
        }

        Ok(())
    }

    pub fn llm_config(&self, api_key: SecretString) -> LlmConfig {
        LlmConfig {
            api_key,
            model: self.llm.model.clone(),
            base_url: self.llm.base_url.trim_end_matches('/').to_string(),
            evaluation_temperature: self.llm.evaluation_temperature,
            hint_temperature: self.llm.hint_temperature,
            timeout: Duration::from_secs(self.llm.timeout_secs),
        }
    }

    pub fn telegram_config(&self, token: SecretString) -> TelegramConfig {
        TelegramConfig {
            token,
            api_base: self.telegram.api_base.trim_end_matches('/').to_string(),
            poll_timeout: Duration::from_secs(self.telegram.poll_timeout_secs),
        }
    }
}

fn invalid(message: &str) -> QuizError {
    QuizError::Config(config::ConfigError::Message(message.to_string()))
}

/// API credentials required to serve
#[derive(Debug, Clone)]
pub struct Credentials {
    pub telegram_token: SecretString,
    pub openai_api_key: SecretString,
}

impl Credentials {
    /// Read both credentials from the environment, failing on the first missing one
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Read both credentials through `lookup`; a missing or blank value is an error
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            telegram_token: required_secret(TELEGRAM_TOKEN_VAR, &lookup)?,
            openai_api_key: required_secret(OPENAI_KEY_VAR, &lookup)?,
        })
    }

    /// Only the chat token, for commands that never call the evaluator
    pub fn telegram_token_from_env() -> Result<SecretString> {
        required_secret(TELEGRAM_TOKEN_VAR, |var| env::var(var).ok())
    }
}

fn required_secret<F>(var: &str, lookup: F) -> Result<SecretString>
where
    F: Fn(&str) -> Option<String>,
{
    let secret = SecretString::from(lookup(var).unwrap_or_default());
    if secret.expose_secret().trim().is_empty() {
        return Err(invalid(&format!("{} not set", var)));
    }
    Ok(secret)
}
