//! Chat dispatcher
//!
//! Turns inbound chat events into registry updates, matcher calls, and
//! replies. Each user's events are handled in arrival order; different users
//! are served concurrently through [`UpdateRouter`].

pub mod messages;
mod router;

pub use router::UpdateRouter;

use crate::config::{SchedulerConfig, TrackConfig};
use crate::error::{QuizError, Result};
use crate::quiz::{AnswerMatcher, ProgressTracker, QuestionFormatter};
use crate::scheduler::DeliveryScheduler;
use crate::services::Evaluator;
use crate::storage::{QuestionStore, UserRegistry};
use crate::transport::{ChatTransport, Incoming, OutgoingMessage};
use crate::types::{PreferredTime, UserId};
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Pause after a failed poll before trying again
const POLL_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Explicitly constructed collaborators shared by the dispatcher and the scheduler
#[derive(Clone)]
pub struct BotServices {
    pub store: Arc<dyn QuestionStore>,
    pub registry: Arc<dyn UserRegistry>,
    pub evaluator: Arc<dyn Evaluator>,
    pub transport: Arc<dyn ChatTransport>,
    pub formatter: Arc<QuestionFormatter>,
}

impl BotServices {
    pub fn scheduler(&self, config: SchedulerConfig) -> DeliveryScheduler {
        DeliveryScheduler::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.store),
            Arc::clone(&self.transport),
            Arc::clone(&self.formatter),
            config,
        )
    }
}

/// A slash command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Start,
    Track,
    Stats,
    Help,
    Stop,
    Unknown,
}

impl Command {
    /// Parse `/name` or `/name@botname`; `None` for non-command text
    fn parse(text: &str) -> Option<Self> {
        let first = text.trim().split_whitespace().next()?;
        let name = first.strip_prefix('/')?;
        let name = name.split('@').next().unwrap_or_default();

        Some(match name.to_lowercase().as_str() {
            "start" => Command::Start,
            "track" => Command::Track,
            "stats" => Command::Stats,
            "help" => Command::Help,
            "stop" => Command::Stop,
            _ => Command::Unknown,
        })
    }
}

pub struct QuizBot {
    registry: Arc<dyn UserRegistry>,
    transport: Arc<dyn ChatTransport>,
    matcher: AnswerMatcher,
    progress: ProgressTracker,
    delivery: Arc<DeliveryScheduler>,
    tracks: Vec<TrackConfig>,
    /// Users who pressed "Done" and owe us a delivery time
    awaiting_time: Mutex<HashSet<UserId>>,
}

impl QuizBot {
    pub fn new(
        services: BotServices,
        tracks: Vec<TrackConfig>,
        delivery: Arc<DeliveryScheduler>,
    ) -> Self {
        let matcher = AnswerMatcher::new(
            Arc::clone(&services.store),
            Arc::clone(&services.registry),
            Arc::clone(&services.evaluator),
            Arc::clone(&services.formatter),
        );

        Self {
            progress: ProgressTracker::new(Arc::clone(&services.store)),
            registry: services.registry,
            transport: services.transport,
            matcher,
            delivery,
            tracks,
            awaiting_time: Mutex::new(HashSet::new()),
        }
    }

    /// Publish the command menu, then poll and dispatch forever
    pub async fn run(self: Arc<Self>) -> Result<()> {
        if let Err(e) = self
            .transport
            .register_commands(messages::command_menu())
            .await
        {
            warn!("Failed to register command menu: {}", e);
        }

        info!("Bot is polling for updates");
        let mut router = UpdateRouter::new(Arc::clone(&self));
        loop {
            match self.transport.poll_updates().await {
                Ok(updates) => {
                    router.prune();
                    for incoming in updates {
                        router.route(incoming);
                    }
                }
                Err(e) => {
                    warn!("Polling failed: {}", e);
                    sleep(POLL_RETRY_DELAY).await;
                }
            }
        }
    }

    /// Handle one event, absorbing and reporting failures
    pub async fn dispatch(&self, incoming: Incoming) {
        self.dispatch_at(incoming, Utc::now()).await
    }

    /// Same as [`QuizBot::dispatch`] with an explicit wall clock
    pub async fn dispatch_at(&self, incoming: Incoming, now: DateTime<Utc>) {
        let user_id = incoming.user_id();

        match self.handle(incoming, now).await {
            Ok(()) => {}
            Err(e) if e.is_permanent_delivery_failure() => {
                warn!("Cannot reach user {}: {}", user_id, e);
            }
            Err(e) => {
                error!("Failed to handle update from user {}: {}", user_id, e);
                if let Err(e) = self
                    .reply(user_id, OutgoingMessage::plain(messages::TEMPORARY_FAILURE))
                    .await
                {
                    warn!("Failed to report error to user {}: {}", user_id, e);
                }
            }
        }
    }

    async fn handle(&self, incoming: Incoming, now: DateTime<Utc>) -> Result<()> {
        match incoming {
            Incoming::Callback {
                callback_id,
                user_id,
                message_id,
                data,
            } => {
                if let Err(e) = self.transport.answer_callback(&callback_id).await {
                    debug!("Failed to acknowledge callback {}: {}", callback_id, e);
                }
                self.handle_callback(user_id, message_id, &data).await
            }
            Incoming::Message {
                user_id,
                text,
                reply_to_text,
            } => {
                if let Some(command) = Command::parse(&text) {
                    return self.handle_command(user_id, command, now).await;
                }
                if self.awaiting_time.lock().await.contains(&user_id) {
                    return self.handle_time_input(user_id, &text, now).await;
                }
                self.handle_answer(user_id, &text, reply_to_text.as_deref())
                    .await
            }
        }
    }

    async fn handle_command(
        &self,
        user_id: UserId,
        command: Command,
        now: DateTime<Utc>,
    ) -> Result<()> {
        debug!("Command {:?} from user {}", command, user_id);
        match command {
            Command::Start | Command::Track => self.show_tracks(user_id, None).await,
            Command::Stats => {
                let stats = self.progress.user_stats(user_id, now.date_naive()).await?;
                self.reply(user_id, OutgoingMessage::markdown(messages::stats(&stats)))
                    .await
            }
            Command::Help => {
                self.reply(user_id, OutgoingMessage::plain(messages::HELP))
                    .await
            }
            Command::Stop => {
                match self.registry.set_active(user_id, false).await {
                    Ok(()) => info!("User {} paused deliveries", user_id),
                    Err(QuizError::UserNotFound(_)) => {}
                    Err(e) => return Err(e),
                }
                self.reply(user_id, OutgoingMessage::plain(messages::PAUSED))
                    .await
            }
            Command::Unknown => {
                self.reply(user_id, OutgoingMessage::plain(messages::UNKNOWN_COMMAND))
                    .await
            }
        }
    }

    /// Register (or re-activate) the user and show the track keyboard
    ///
    /// With `edit` the keyboard message is updated in place.
    async fn show_tracks(&self, user_id: UserId, edit: Option<i64>) -> Result<()> {
        self.registry.register(user_id).await?;
        self.registry.set_active(user_id, true).await?;

        let selected = self
            .registry
            .get(user_id)
            .await?
            .map(|u| u.tracks)
            .unwrap_or_default();
        let message = OutgoingMessage::markdown(messages::WELCOME)
            .with_keyboard(messages::track_keyboard(&self.tracks, &selected));

        match edit {
            Some(message_id) => {
                self.transport
                    .edit_message(user_id, message_id, message)
                    .await
            }
            None => self.reply(user_id, message).await,
        }
    }

    async fn handle_callback(
        &self,
        user_id: UserId,
        message_id: Option<i64>,
        data: &str,
    ) -> Result<()> {
        if data == messages::TRACK_DONE_CALLBACK {
            self.awaiting_time.lock().await.insert(user_id);
            let prompt = OutgoingMessage::markdown(messages::ASK_TIME);
            return match message_id {
                Some(id) => self.transport.edit_message(user_id, id, prompt).await,
                None => self.reply(user_id, prompt).await,
            };
        }

        let Some(track) = data.strip_prefix(messages::TRACK_CALLBACK_PREFIX) else {
            warn!("Ignoring unknown callback '{}' from user {}", data, user_id);
            return Ok(());
        };
        if !self.tracks.iter().any(|t| t.id == track) {
            warn!("Ignoring unknown track '{}' from user {}", track, user_id);
            return Ok(());
        }

        self.registry.register(user_id).await?;
        let tracks = self.registry.toggle_track(user_id, track).await?;
        debug!("User {} tracks now: {}", user_id, tracks.to_storage());

        self.show_tracks(user_id, message_id).await
    }

    async fn handle_time_input(&self, user_id: UserId, text: &str, now: DateTime<Utc>) -> Result<()> {
        let input = text.trim().to_lowercase();

        let (time, confirmation) = if input == "skip" {
            (
                PreferredTime::default(),
                messages::DEFAULT_TIME_SELECTED.to_string(),
            )
        } else {
            match input.parse::<PreferredTime>() {
                Ok(time) => (time, messages::time_set(&time.to_string())),
                Err(_) => {
                    // State is kept so the next message is read as a time again
                    let prompt = if PreferredTime::matches_format(&input) {
                        messages::INVALID_TIME_RANGE
                    } else {
                        messages::INVALID_TIME_FORMAT
                    };
                    return self.reply(user_id, OutgoingMessage::plain(prompt)).await;
                }
            }
        };

        self.registry.register(user_id).await?;
        self.registry.set_preferred_time(user_id, time).await?;
        self.awaiting_time.lock().await.remove(&user_id);
        info!("User {} prefers delivery at {}", user_id, time);

        self.reply(user_id, OutgoingMessage::plain(confirmation))
            .await?;
        self.send_initial_questions(user_id, now.date_naive()).await
    }

    /// Finish setup: deliver today's questions unless they already went out
    async fn send_initial_questions(&self, user_id: UserId, today: NaiveDate) -> Result<()> {
        let Some(user) = self.registry.get(user_id).await? else {
            return Err(QuizError::UserNotFound(user_id.0));
        };

        if user.last_sent_date == Some(today) {
            return self
                .reply(
                    user_id,
                    OutgoingMessage::markdown(messages::ALREADY_DELIVERED_TODAY),
                )
                .await;
        }

        let delivery = self.delivery.send_pending_questions(&user).await;
        if delivery.blocked {
            return Err(QuizError::RecipientBlocked(user_id.0));
        }
        if delivery.sent > 0 {
            self.registry.update_last_sent(user_id, today).await?;
        }

        self.reply(
            user_id,
            OutgoingMessage::markdown(messages::setup_complete(delivery.sent)),
        )
        .await
    }

    async fn handle_answer(&self, user_id: UserId, text: &str, reply_to: Option<&str>) -> Result<()> {
        if let Err(e) = self.transport.send_typing(user_id).await {
            debug!("Typing indicator failed for user {}: {}", user_id, e);
        }

        let outcome = self.matcher.handle_message(user_id, text, reply_to).await?;
        self.reply(user_id, OutgoingMessage::markdown(messages::outcome(&outcome)))
            .await
    }

    async fn reply(&self, user_id: UserId, message: OutgoingMessage) -> Result<()> {
        self.transport.send_message(user_id, message).await.map(|_| ())
    }

    /// Whether the user is being asked for a delivery time
    pub async fn is_awaiting_time(&self, user_id: UserId) -> bool {
        self.awaiting_time.lock().await.contains(&user_id)
    }
}
