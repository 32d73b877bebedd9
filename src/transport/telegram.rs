//! Telegram Bot API transport
//!
//! Thin JSON client over `reqwest`: long polling with `getUpdates`, plus the
//! handful of methods the bot needs to answer users.

use crate::error::{QuizError, Result};
use crate::transport::{BotCommand, ChatTransport, InlineKeyboard, Incoming, OutgoingMessage};
use crate::types::UserId;
use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// Connection settings for the Bot API
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub token: SecretString,
    pub api_base: String,
    /// Long-poll duration passed to `getUpdates`
    pub poll_timeout: Duration,
}

impl TelegramConfig {
    pub fn new(token: SecretString) -> Self {
        Self {
            token,
            api_base: "https://api.telegram.org".to_string(),
            poll_timeout: Duration::from_secs(30),
        }
    }
}

pub struct TelegramClient {
    config: TelegramConfig,
    client: reqwest::Client,
    /// Next `getUpdates` offset (last seen update id + 1)
    offset: AtomicI64,
}

/// Envelope of every Bot API response
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
    error_code: Option<u16>,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    message: Option<TgMessage>,
    callback_query: Option<TgCallbackQuery>,
}

#[derive(Debug, Deserialize)]
struct TgMessage {
    message_id: i64,
    chat: TgChat,
    text: Option<String>,
    reply_to_message: Option<Box<TgMessage>>,
}

#[derive(Debug, Deserialize)]
struct TgChat {
    id: i64,
    /// "private", "group", "supergroup" or "channel"
    #[serde(rename = "type")]
    kind: Option<String>,
}

impl TgChat {
    /// One-on-one chats only; in those the chat id is the user id
    fn is_private(&self) -> bool {
        self.kind.as_deref().map_or(true, |kind| kind == "private")
    }
}

#[derive(Debug, Deserialize)]
struct TgUser {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct TgCallbackQuery {
    id: String,
    from: TgUser,
    message: Option<TgMessage>,
    data: Option<String>,
}

#[derive(Debug, Serialize)]
struct TgButton<'a> {
    text: &'a str,
    callback_data: &'a str,
}

fn keyboard_markup(keyboard: &InlineKeyboard) -> Value {
    let rows: Vec<Vec<TgButton<'_>>> = keyboard
        .iter()
        .map(|row| {
            row.iter()
                .map(|b| TgButton {
                    text: &b.text,
                    callback_data: &b.callback_data,
                })
                .collect()
        })
        .collect();
    json!({ "inline_keyboard": rows })
}

fn message_body(chat_id: i64, message: &OutgoingMessage) -> Value {
    let mut body = json!({
        "chat_id": chat_id,
        "text": message.text,
    });
    if message.markdown {
        body["parse_mode"] = json!("Markdown");
    }
    if let Some(keyboard) = &message.keyboard {
        body["reply_markup"] = keyboard_markup(keyboard);
    }
    body
}

fn is_markup_error(err: &QuizError) -> bool {
    matches!(err, QuizError::Transport(msg) if msg.contains("can't parse entities"))
}

impl Update {
    fn into_incoming(self) -> Option<Incoming> {
        if let Some(message) = self.message {
            if !message.chat.is_private() {
                debug!("Ignoring message from non-private chat {}", message.chat.id);
                return None;
            }
            // Replies go to the chat the message came from
            return Some(Incoming::Message {
                user_id: UserId(message.chat.id),
                text: message.text?,
                reply_to_text: message.reply_to_message.and_then(|m| m.text),
            });
        }

        let query = self.callback_query?;
        if let Some(chat) = query.message.as_ref().map(|m| &m.chat) {
            if !chat.is_private() {
                debug!("Ignoring callback from non-private chat {}", chat.id);
                return None;
            }
        }
        Some(Incoming::Callback {
            callback_id: query.id,
            user_id: UserId(query.from.id),
            message_id: query.message.map(|m| m.message_id),
            data: query.data.unwrap_or_default(),
        })
    }
}

impl TelegramClient {
    pub fn new(config: TelegramConfig) -> Result<Self> {
        if config.token.expose_secret().trim().is_empty() {
            return Err(QuizError::Config(config::ConfigError::Message(
                "TELEGRAM_BOT_TOKEN not set".to_string(),
            )));
        }

        // Requests must outlive the long poll
        let client = reqwest::Client::builder()
            .timeout(config.poll_timeout + Duration::from_secs(15))
            .build()?;

        Ok(Self {
            config,
            client,
            offset: AtomicI64::new(0),
        })
    }

    /// Call a Bot API method; `chat_id` is reported when the recipient is unreachable
    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: &Value,
        chat_id: Option<i64>,
    ) -> Result<T> {
        let url = format!(
            "{}/bot{}/{}",
            self.config.api_base,
            self.config.token.expose_secret(),
            method
        );

        let response = self.client.post(url).json(body).send().await.map_err(|e| {
            // The URL carries the token
            QuizError::Transport(format!("{} request failed: {}", method, e.without_url()))
        })?;
        let status = response.status();

        let api: ApiResponse<T> = response.json().await.map_err(|e| {
            QuizError::Transport(format!(
                "{} returned unreadable response ({}): {}",
                method,
                status,
                e.without_url()
            ))
        })?;

        if status == StatusCode::FORBIDDEN || api.error_code == Some(403) {
            return Err(QuizError::RecipientBlocked(chat_id.unwrap_or_default()));
        }

        if !api.ok {
            return Err(QuizError::Transport(format!(
                "{} failed with status {}: {}",
                method,
                status,
                api.description.unwrap_or_default()
            )));
        }

        api.result
            .ok_or_else(|| QuizError::Transport(format!("{} returned no result", method)))
    }
}

#[async_trait]
impl ChatTransport for TelegramClient {
    async fn send_message(&self, user_id: UserId, message: OutgoingMessage) -> Result<i64> {
        let body = message_body(user_id.0, &message);
        let sent: std::result::Result<TgMessage, _> =
            self.call("sendMessage", &body, Some(user_id.0)).await;

        match sent {
            Ok(sent) => Ok(sent.message_id),
            Err(e) if message.markdown && is_markup_error(&e) => {
                warn!("Markdown rejected for chat {}, resending as plain text", user_id);
                let plain = OutgoingMessage {
                    markdown: false,
                    ..message
                };
                let sent: TgMessage = self
                    .call("sendMessage", &message_body(user_id.0, &plain), Some(user_id.0))
                    .await?;
                Ok(sent.message_id)
            }
            Err(e) => Err(e),
        }
    }

    async fn edit_message(
        &self,
        user_id: UserId,
        message_id: i64,
        message: OutgoingMessage,
    ) -> Result<()> {
        let mut body = message_body(user_id.0, &message);
        body["message_id"] = json!(message_id);

        match self.call::<Value>("editMessageText", &body, Some(user_id.0)).await {
            Ok(_) => Ok(()),
            Err(QuizError::Transport(msg)) if msg.contains("message is not modified") => {
                debug!("Edit of message {} was a no-op", message_id);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn send_typing(&self, user_id: UserId) -> Result<()> {
        let body = json!({ "chat_id": user_id.0, "action": "typing" });
        self.call::<bool>("sendChatAction", &body, Some(user_id.0))
            .await
            .map(|_| ())
    }

    async fn answer_callback(&self, callback_id: &str) -> Result<()> {
        let body = json!({ "callback_query_id": callback_id });
        self.call::<bool>("answerCallbackQuery", &body, None)
            .await
            .map(|_| ())
    }

    async fn register_commands(&self, commands: Vec<BotCommand>) -> Result<()> {
        let commands: Vec<Value> = commands
            .iter()
            .map(|c| json!({ "command": c.command, "description": c.description }))
            .collect();
        self.call::<bool>("setMyCommands", &json!({ "commands": commands }), None)
            .await
            .map(|_| ())
    }

    async fn poll_updates(&self) -> Result<Vec<Incoming>> {
        let body = json!({
            "offset": self.offset.load(Ordering::SeqCst),
            "timeout": self.config.poll_timeout.as_secs(),
            "allowed_updates": ["message", "callback_query"],
        });

        let updates: Vec<Update> = self.call("getUpdates", &body, None).await?;
        if let Some(last) = updates.iter().map(|u| u.update_id).max() {
            self.offset.store(last + 1, Ordering::SeqCst);
        }

        debug!("Received {} updates", updates.len());
        Ok(updates.into_iter().filter_map(Update::into_incoming).collect())
    }
}
