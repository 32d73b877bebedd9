//! Delivery passes over a real store

mod common;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use common::{create_test_store, register_with_tracks, sample_corpus, RecordingTransport};
use daily_quiz_core::{
    config::SchedulerConfig, DeliveryScheduler, PreferredTime, QuestionFormatter, QuestionStore,
    SqliteStore, UserId, UserRegistry,
};
use std::sync::Arc;

fn at(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, day, hour, minute, 0).unwrap()
}

fn scheduler(
    store: &Arc<SqliteStore>,
    transport: &Arc<RecordingTransport>,
    formatter: QuestionFormatter,
) -> DeliveryScheduler {
    DeliveryScheduler::new(
        store.clone(),
        store.clone(),
        transport.clone(),
        Arc::new(formatter),
        SchedulerConfig {
            send_pause_ms: 0,
            ..SchedulerConfig::default()
        },
    )
}

#[tokio::test]
async fn test_daily_cycle() {
    let store = create_test_store().await;
    store.import_corpus(sample_corpus()).await.unwrap();
    let transport = Arc::new(RecordingTransport::new());
    let scheduler = scheduler(&store, &transport, QuestionFormatter::empty());

    let user = UserId(500);
    register_with_tracks(&store, user, &["sql", "python"]).await.unwrap();
    store
        .set_preferred_time(user, PreferredTime::new(18, 30).unwrap())
        .await
        .unwrap();

    // Before the preferred time
    let report = scheduler.run_once(at(4, 12, 0)).await.unwrap();
    assert_eq!(report.eligible, 1);
    assert_eq!(report.not_due, 1);
    assert_eq!(report.questions_sent, 0);
    assert!(transport.sent().is_empty());

    // At the preferred time: one question per track
    let report = scheduler.run_once(at(4, 18, 30)).await.unwrap();
    assert_eq!(report.delivered_users, 1);
    assert_eq!(report.questions_sent, 2);
    let texts = transport.texts_for(user);
    assert!(texts[0].starts_with("📅 *Daily PYTHON Challenge*"));
    assert!(texts[1].starts_with("📅 *Daily SQL Challenge*"));
    assert_eq!(
        store.get(user).await.unwrap().unwrap().last_sent_date,
        NaiveDate::from_ymd_opt(2026, 5, 4)
    );

    // Later the same day nothing is repeated
    let report = scheduler.run_once(at(4, 23, 0)).await.unwrap();
    assert_eq!(report.eligible, 0);
    assert_eq!(transport.sent().len(), 2);

    // An unanswered question is sent again the next day; an answered one advances
    let first_sql = store.fetch_oldest_unanswered(user, "sql").await.unwrap().unwrap();
    store
        .insert_answer_record(user, first_sql.id, "SELECT * FROM employees;", true, 0.9)
        .await
        .unwrap();

    transport.clear();
    let report = scheduler.run_once(at(5, 19, 0)).await.unwrap();
    assert_eq!(report.questions_sent, 2);
    let texts = transport.texts_for(user);
    assert!(texts[0].contains("Reverse a list named items."));
    assert!(texts[1].contains("Count the employees in each department."));
}

#[tokio::test]
async fn test_delivery_uses_formatted_rendering() {
    let store = create_test_store().await;
    let mut corpus = sample_corpus();
    corpus[0].formatted_text = Some("Select *all* rows from the `employees` table.".to_string());
    store.import_corpus(corpus.clone()).await.unwrap();

    let transport = Arc::new(RecordingTransport::new());
    let scheduler = scheduler(&store, &transport, QuestionFormatter::from_entries(&corpus));

    let user = UserId(501);
    register_with_tracks(&store, user, &["sql"]).await.unwrap();

    scheduler.run_once(at(6, 9, 0)).await.unwrap();
    let texts = transport.texts_for(user);
    assert_eq!(texts.len(), 1);
    assert!(texts[0].contains("Select *all* rows from the `employees` table."));
}

#[tokio::test]
async fn test_completed_and_inactive_users() {
    let store = create_test_store().await;
    store.import_corpus(sample_corpus()).await.unwrap();
    let transport = Arc::new(RecordingTransport::new());
    let scheduler = scheduler(&store, &transport, QuestionFormatter::empty());

    // Subscribed to a track without questions
    let finished = UserId(502);
    register_with_tracks(&store, finished, &["rust"]).await.unwrap();

    // Paused
    let paused = UserId(503);
    register_with_tracks(&store, paused, &["sql"]).await.unwrap();
    store.set_active(paused, false).await.unwrap();

    // No tracks at all
    register_with_tracks(&store, UserId(504), &[]).await.unwrap();

    let report = scheduler.run_once(at(7, 10, 0)).await.unwrap();
    assert_eq!(report.eligible, 1);
    assert_eq!(report.questions_sent, 0);
    assert_eq!(report.delivered_users, 1);
    assert!(transport.sent().is_empty());

    // The finished user is still marked for the day
    assert_eq!(
        store.get(finished).await.unwrap().unwrap().last_sent_date,
        NaiveDate::from_ymd_opt(2026, 5, 7)
    );
}
