//! Chat transport seam
//!
//! The bot talks to its users only through [`ChatTransport`]. The Telegram
//! Bot API implementation lives in [`telegram`].

pub mod telegram;

pub use telegram::{TelegramClient, TelegramConfig};

use crate::error::Result;
use crate::types::UserId;
use async_trait::async_trait;

/// One inline keyboard button
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineButton {
    pub text: String,
    pub callback_data: String,
}

impl InlineButton {
    pub fn new(text: impl Into<String>, callback_data: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            callback_data: callback_data.into(),
        }
    }
}

/// Rows of inline buttons attached to a message
pub type InlineKeyboard = Vec<Vec<InlineButton>>;

/// Outbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub text: String,
    /// Render `*bold*` / `_italic_` markup
    pub markdown: bool,
    pub keyboard: Option<InlineKeyboard>,
}

impl OutgoingMessage {
    pub fn markdown(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            markdown: true,
            keyboard: None,
        }
    }

    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            markdown: false,
            keyboard: None,
        }
    }

    pub fn with_keyboard(mut self, keyboard: InlineKeyboard) -> Self {
        self.keyboard = Some(keyboard);
        self
    }
}

/// Entry of the command menu shown by the chat client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotCommand {
    pub command: String,
    pub description: String,
}

impl BotCommand {
    pub fn new(command: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            description: description.into(),
        }
    }
}

/// Inbound event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    /// Text message, optionally sent as a reply to an earlier message
    Message {
        user_id: UserId,
        text: String,
        reply_to_text: Option<String>,
    },
    /// Inline keyboard button press
    Callback {
        callback_id: String,
        user_id: UserId,
        message_id: Option<i64>,
        data: String,
    },
}

impl Incoming {
    /// The user the event came from
    pub fn user_id(&self) -> UserId {
        match self {
            Incoming::Message { user_id, .. } | Incoming::Callback { user_id, .. } => *user_id,
        }
    }
}

/// Message delivery and update intake for one chat platform
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Send a message and return its platform message id
    async fn send_message(&self, user_id: UserId, message: OutgoingMessage) -> Result<i64>;

    /// Replace the text and keyboard of an earlier message
    async fn edit_message(
        &self,
        user_id: UserId,
        message_id: i64,
        message: OutgoingMessage,
    ) -> Result<()>;

    /// Show a "typing…" indicator
    async fn send_typing(&self, user_id: UserId) -> Result<()>;

    /// Acknowledge a callback so the client stops its spinner
    async fn answer_callback(&self, callback_id: &str) -> Result<()>;

    /// Publish the command menu
    async fn register_commands(&self, commands: Vec<BotCommand>) -> Result<()>;

    /// Wait for the next batch of inbound events
    async fn poll_updates(&self) -> Result<Vec<Incoming>>;
}
