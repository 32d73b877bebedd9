//! Daily question delivery
//!
//! A polling loop that, on every tick, sends each eligible user the next
//! pending question of every subscribed track once their preferred time of day
//! has passed. The tick interval is a polling period, not a precise clock.

use crate::bot::messages;
use crate::config::SchedulerConfig;
use crate::error::{QuizError, Result};
use crate::quiz::QuestionFormatter;
use crate::storage::{QuestionStore, UserRegistry};
use crate::transport::{ChatTransport, OutgoingMessage};
use crate::types::User;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Outcome of sending the pending questions of one user
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UserDelivery {
    pub sent: usize,
    pub failed: usize,
    /// The platform reported the user unreachable
    pub blocked: bool,
}

/// Summary of one delivery pass
#[derive(Debug, Clone, Default, Serialize)]
pub struct DeliveryReport {
    /// Users returned by the eligibility query
    pub eligible: usize,

    /// Eligible users whose preferred time has not come yet
    pub not_due: usize,

    /// Users marked as delivered for today
    pub delivered_users: usize,

    pub questions_sent: usize,

    /// Per-track or per-user failures
    pub failures: usize,

    /// Users switched inactive after a permanent send failure
    pub deactivated: usize,

    #[serde(serialize_with = "serialize_millis")]
    pub duration: Duration,
}

fn serialize_millis<S: serde::Serializer>(
    duration: &Duration,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_u64(duration.as_millis() as u64)
}

/// Periodic delivery of pending questions
pub struct DeliveryScheduler {
    registry: Arc<dyn UserRegistry>,
    store: Arc<dyn QuestionStore>,
    transport: Arc<dyn ChatTransport>,
    formatter: Arc<QuestionFormatter>,
    config: SchedulerConfig,
    running: Arc<AtomicBool>,
    wake: Notify,
}

impl DeliveryScheduler {
    pub fn new(
        registry: Arc<dyn UserRegistry>,
        store: Arc<dyn QuestionStore>,
        transport: Arc<dyn ChatTransport>,
        formatter: Arc<QuestionFormatter>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            registry,
            store,
            transport,
            formatter,
            config,
            running: Arc::new(AtomicBool::new(false)),
            wake: Notify::new(),
        }
    }

    /// Run delivery passes until [`DeliveryScheduler::stop`] is called
    pub async fn start(&self) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(QuizError::Other("Scheduler is already running".to_string()));
        }

        info!(
            "Starting delivery scheduler (interval: {:?})",
            self.config.interval()
        );

        while self.running.load(Ordering::SeqCst) {
            match self.run_once(Utc::now()).await {
                Ok(report) => debug!(
                    "Delivery pass finished: {} sent to {} users, {} failures in {:?}",
                    report.questions_sent, report.delivered_users, report.failures, report.duration
                ),
                Err(e) => error!("Delivery pass failed: {}", e),
            }

            tokio::select! {
                _ = sleep(self.config.interval()) => {}
                _ = self.wake.notified() => {}
            }
        }

        info!("Delivery scheduler stopped");
        Ok(())
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.wake.notify_one();
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// One delivery pass at wall-clock `now` (UTC)
    ///
    /// Only the eligibility query can fail the pass; every per-user failure is
    /// logged, counted, and skipped.
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<DeliveryReport> {
        let started = Instant::now();
        let today = now.date_naive();
        let time_of_day = now.time();

        let users = self.registry.list_eligible_for_delivery(today).await?;
        let mut report = DeliveryReport {
            eligible: users.len(),
            ..DeliveryReport::default()
        };
        info!("Delivery pass: {} eligible users", users.len());

        for user in users {
            if !user.preferred_time.has_passed(time_of_day) {
                debug!(
                    "User {} not due until {}",
                    user.id, user.preferred_time
                );
                report.not_due += 1;
                continue;
            }

            let delivery = self.send_pending_questions(&user).await;
            report.questions_sent += delivery.sent;
            report.failures += delivery.failed;

            if delivery.blocked && self.config.deactivate_on_blocked {
                match self.registry.set_active(user.id, false).await {
                    Ok(()) => {
                        info!("Deactivated unreachable user {}", user.id);
                        report.deactivated += 1;
                    }
                    Err(e) => {
                        error!("Failed to deactivate user {}: {}", user.id, e);
                        report.failures += 1;
                    }
                }
            }

            // Marked once per user, even when some tracks failed
            match self.registry.update_last_sent(user.id, today).await {
                Ok(()) => report.delivered_users += 1,
                Err(e) => {
                    error!("Failed to mark delivery for user {}: {}", user.id, e);
                    report.failures += 1;
                }
            }
        }

        report.duration = started.elapsed();
        Ok(report)
    }

    /// Send the next pending question of every subscribed track
    ///
    /// Tracks with nothing pending are skipped. A permanent send failure stops
    /// the remaining tracks of this user.
    pub async fn send_pending_questions(&self, user: &User) -> UserDelivery {
        let mut delivery = UserDelivery::default();

        for track in user.tracks.iter() {
            let question = match self.store.fetch_oldest_unanswered(user.id, track).await {
                Ok(Some(q)) => q,
                Ok(None) => {
                    debug!("No pending {} question for user {}", track, user.id);
                    continue;
                }
                Err(e) => {
                    error!("Failed to fetch {} question for user {}: {}", track, user.id, e);
                    delivery.failed += 1;
                    continue;
                }
            };

            let text = messages::daily_challenge(&self.formatter.apply_formatting(&question));
            match self
                .transport
                .send_message(user.id, OutgoingMessage::markdown(text))
                .await
            {
                Ok(_) => {
                    debug!("Sent question {} to user {}", question.id, user.id);
                    delivery.sent += 1;
                    sleep(self.config.send_pause()).await;
                }
                Err(e) if e.is_permanent_delivery_failure() => {
                    warn!("User {} is unreachable: {}", user.id, e);
                    delivery.failed += 1;
                    delivery.blocked = true;
                    break;
                }
                Err(e) => {
                    error!("Failed to send {} question to user {}: {}", track, user.id, e);
                    delivery.failed += 1;
                }
            }
        }

        delivery
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::sqlite::SqliteStore;
    use crate::storage::test_utils::{create_test_store, register_with_tracks, sample_corpus};
    use crate::transport::MockChatTransport;
    use crate::types::UserId;
    use chrono::NaiveDate;
    use mockall::predicate::*;

    fn config() -> SchedulerConfig {
        SchedulerConfig {
            send_pause_ms: 0,
            ..SchedulerConfig::default()
        }
    }

    fn scheduler(
        store: Arc<SqliteStore>,
        transport: MockChatTransport,
        config: SchedulerConfig,
    ) -> DeliveryScheduler {
        DeliveryScheduler::new(
            store.clone(),
            store,
            Arc::new(transport),
            Arc::new(QuestionFormatter::empty()),
            config,
        )
    }

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        NaiveDate::from_ymd_opt(2026, 4, 1)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
            .and_utc()
    }

    async fn seeded_store() -> Arc<SqliteStore> {
        let store = create_test_store().await.unwrap();
        store.import_corpus(sample_corpus()).await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_delivers_one_question_per_track_and_marks_day() {
        let store = seeded_store().await;
        let user = UserId(100);
        register_with_tracks(&store, user, &["sql", "python"]).await.unwrap();

        let mut transport = MockChatTransport::new();
        transport
            .expect_send_message()
            .with(eq(user), always())
            .times(2)
            .returning(|_, _| Ok(1));
        let scheduler = scheduler(store.clone(), transport, config());

        let report = scheduler.run_once(at(9, 0)).await.unwrap();
        assert_eq!(report.eligible, 1);
        assert_eq!(report.questions_sent, 2);
        assert_eq!(report.delivered_users, 1);

        let updated = store.get(user).await.unwrap().unwrap();
        assert_eq!(updated.last_sent_date, Some(at(9, 0).date_naive()));

        // Second pass the same day finds nobody eligible
        let report = scheduler.run_once(at(9, 10)).await.unwrap();
        assert_eq!(report.eligible, 0);
    }

    #[tokio::test]
    async fn test_skips_users_before_preferred_time() {
        let store = seeded_store().await;
        let user = UserId(101);
        register_with_tracks(&store, user, &["sql"]).await.unwrap();
        store
            .set_preferred_time(user, "18:30".parse().unwrap())
            .await
            .unwrap();

        let mut transport = MockChatTransport::new();
        transport.expect_send_message().times(0);
        let scheduler = scheduler(store.clone(), transport, config());

        let report = scheduler.run_once(at(18, 29)).await.unwrap();
        assert_eq!(report.not_due, 1);
        assert_eq!(report.delivered_users, 0);
        assert!(store.get(user).await.unwrap().unwrap().last_sent_date.is_none());
    }

    #[tokio::test]
    async fn test_track_failure_does_not_block_marking() {
        let store = seeded_store().await;
        let user = UserId(102);
        register_with_tracks(&store, user, &["sql", "python"]).await.unwrap();

        let mut transport = MockChatTransport::new();
        transport
            .expect_send_message()
            .withf(|_, m| m.text.contains("PYTHON"))
            .times(1)
            .returning(|_, _| Err(QuizError::Transport("timeout".into())));
        transport
            .expect_send_message()
            .withf(|_, m| m.text.contains("SQL"))
            .times(1)
            .returning(|_, _| Ok(2));
        let scheduler = scheduler(store.clone(), transport, config());

        let report = scheduler.run_once(at(12, 0)).await.unwrap();
        assert_eq!(report.questions_sent, 1);
        assert_eq!(report.failures, 1);
        assert_eq!(report.delivered_users, 1);
        assert!(store.get(user).await.unwrap().unwrap().last_sent_date.is_some());
    }

    #[tokio::test]
    async fn test_one_user_failure_is_isolated() {
        let store = seeded_store().await;
        register_with_tracks(&store, UserId(1), &["sql"]).await.unwrap();
        register_with_tracks(&store, UserId(2), &["sql"]).await.unwrap();

        let mut transport = MockChatTransport::new();
        transport
            .expect_send_message()
            .with(eq(UserId(1)), always())
            .times(1)
            .returning(|_, _| Err(QuizError::RecipientBlocked(1)));
        transport
            .expect_send_message()
            .with(eq(UserId(2)), always())
            .times(1)
            .returning(|_, _| Ok(9));
        let scheduler = scheduler(store.clone(), transport, config());

        let report = scheduler.run_once(at(10, 0)).await.unwrap();
        assert_eq!(report.questions_sent, 1);
        assert_eq!(report.deactivated, 0);
        assert!(store.get(UserId(1)).await.unwrap().unwrap().is_active);
    }

    #[tokio::test]
    async fn test_blocked_user_deactivated_when_enabled() {
        let store = seeded_store().await;
        register_with_tracks(&store, UserId(7), &["sql", "python"]).await.unwrap();

        let mut transport = MockChatTransport::new();
        // The first permanent failure stops the remaining tracks
        transport
            .expect_send_message()
            .times(1)
            .returning(|_, _| Err(QuizError::RecipientBlocked(7)));
        let config = SchedulerConfig {
            deactivate_on_blocked: true,
            ..config()
        };
        let scheduler = scheduler(store.clone(), transport, config);

        let report = scheduler.run_once(at(10, 0)).await.unwrap();
        assert_eq!(report.deactivated, 1);
        assert!(!store.get(UserId(7)).await.unwrap().unwrap().is_active);
    }

    #[tokio::test]
    async fn test_stop_ends_loop() {
        let store = seeded_store().await;
        let transport = MockChatTransport::new();
        let scheduler = Arc::new(scheduler(store, transport, config()));

        let runner = Arc::clone(&scheduler);
        let handle = tokio::spawn(async move { runner.start().await });

        while !scheduler.is_running() {
            tokio::task::yield_now().await;
        }
        assert!(scheduler.start().await.is_err());

        scheduler.stop();
        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }
}
