//! Sync and Tick against an in-memory store and scripted providers

mod helpers;

use chrono::Duration;
use helpers::*;
use seatwatch_sampler::provider::Provider;
use seatwatch_sampler::scheduler::{QuietHours, SeatCount, Window, WindowPolicy};
use seatwatch_sampler::stages::{sync, tick};
use std::sync::{Arc, Mutex};

#[tokio::test]
async fn test_task_waits_for_window_start() {
    let t = base_time();
    let pool = setup_db().await;
    insert_showing(&pool, 1, VENUE_ID, t, Some("https://x/1")).await;

    let provider = Arc::new(ScriptedProvider::new("early", "Lichtburg"));
    provider.answer(1, Some("Saal 1"), 30);

    let config = test_config();
    let mut windows = WindowPolicy::new(Window::new(-600, 300), config.min_window_span_secs());
    windows.set_provider_window("early", Window::new(-435, 0));
    let ctx = context_with(
        pool,
        vec![provider.clone() as Arc<dyn Provider>],
        config,
        windows,
        QuietHours::disabled(),
    );

    let report = sync(&ctx, t - Duration::minutes(8)).await.unwrap();
    assert_eq!(report.enqueued, 1);
    assert_eq!(
        ctx.queue.lock().await.peek().unwrap().trigger,
        t - Duration::seconds(435)
    );

    // One second early: nothing is due
    let early = tick(&ctx, t - Duration::seconds(436)).await.unwrap();
    assert_eq!(early.due, 0);
    assert_eq!(early.dispatched, 0);
    assert!(provider.probed_shows().is_empty());

    let on_time = tick(&ctx, t - Duration::seconds(435)).await.unwrap();
    assert_eq!(on_time.dispatched, 1);
    assert_eq!(on_time.sampled, 1);
    assert_eq!(provider.probed_shows(), vec![1]);

    let buffered = ctx.buffer.take_all().await;
    assert_eq!(buffered.len(), 1);
    assert_eq!(buffered[0].seats, SeatCount::Remaining(30));
}

#[tokio::test]
async fn test_task_popped_after_window_is_dropped() {
    let t = base_time();
    let pool = setup_db().await;
    insert_showing(&pool, 1, VENUE_ID, t, Some("https://x/1")).await;

    let provider = Arc::new(ScriptedProvider::new("early", "Lichtburg"));
    provider.answer(1, Some("Saal 1"), 30);

    let config = test_config();
    let mut windows = WindowPolicy::new(Window::new(-600, 300), config.min_window_span_secs());
    windows.set_provider_window("early", Window::new(-435, 0));
    let ctx = context_with(
        pool,
        vec![provider.clone() as Arc<dyn Provider>],
        config,
        windows,
        QuietHours::disabled(),
    );

    sync(&ctx, t - Duration::minutes(8)).await.unwrap();

    let report = tick(&ctx, t + Duration::seconds(1)).await.unwrap();
    assert_eq!(report.due, 1);
    assert_eq!(report.expired, 1);
    assert_eq!(report.dispatched, 0);
    assert!(provider.probed_shows().is_empty());
    assert!(ctx.queue.lock().await.is_empty());
    assert!(ctx.buffer.is_empty().await);
}

#[tokio::test]
async fn test_sync_drops_rows_whose_window_has_closed() {
    let t = base_time();
    let pool = setup_db().await;
    insert_showing(&pool, 1, VENUE_ID, t, None).await;
    insert_showing(&pool, 2, VENUE_ID, t + Duration::hours(1), None).await;

    let provider = Arc::new(ScriptedProvider::new("json", "Lichtburg"));
    let ctx = context(pool, vec![provider as Arc<dyn Provider>], test_config());

    // Default window closes 5 minutes after start
    let report = sync(&ctx, t + Duration::minutes(6)).await.unwrap();
    assert_eq!(report.candidates, 2);
    assert_eq!(report.dropped_late, 1);
    assert_eq!(report.enqueued, 1);
    assert_eq!(ctx.queue.lock().await.peek().unwrap().payload.show_id, 2);
}

#[tokio::test]
async fn test_sync_rebuilds_queue_and_skips_sampled_rows() {
    let t = base_time();
    let pool = setup_db().await;
    insert_showing(&pool, 1, VENUE_ID, t, None).await;
    insert_showing(&pool, 2, VENUE_ID, t, None).await;

    let provider = Arc::new(ScriptedProvider::new("json", "Lichtburg"));
    let ctx = context(pool.clone(), vec![provider as Arc<dyn Provider>], test_config());

    sync(&ctx, t - Duration::minutes(20)).await.unwrap();
    assert_eq!(ctx.queue.lock().await.len(), 2);

    sqlx::query("UPDATE showings SET seats_sold = 12 WHERE id = 2")
        .execute(&pool)
        .await
        .unwrap();

    let report = sync(&ctx, t - Duration::minutes(19)).await.unwrap();
    assert_eq!(report.enqueued, 1);
    assert_eq!(ctx.queue.lock().await.len(), 1);
}

#[tokio::test]
async fn test_unclassified_row_does_not_abort_pass() {
    let t = base_time();
    let pool = setup_db().await;
    insert_venue(&pool, 2, "Odeon", None).await;
    insert_showing(&pool, 1, VENUE_ID, t, None).await;
    insert_showing(&pool, 2, 2, t, None).await;
    insert_showing(&pool, 3, VENUE_ID, t + Duration::minutes(30), None).await;

    let provider = Arc::new(ScriptedProvider::new("json", "Lichtburg"));
    let ctx = context(pool, vec![provider as Arc<dyn Provider>], test_config());

    let report = sync(&ctx, t - Duration::minutes(20)).await.unwrap();
    assert_eq!(report.candidates, 3);
    assert_eq!(report.enqueued, 2);
    assert_eq!(report.unclassified, 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].show_id, 2);
}

#[tokio::test]
async fn test_stored_provider_tag_wins_over_classification() {
    let t = base_time();
    let pool = setup_db().await;
    insert_showing(&pool, 1, VENUE_ID, t, None).await;
    sqlx::query("UPDATE showings SET provider = 'special' WHERE id = 1")
        .execute(&pool)
        .await
        .unwrap();

    let generic = Arc::new(ScriptedProvider::new("json", "Lichtburg"));
    let special = Arc::new(ScriptedProvider::new("special", "nothing matches this"));
    let ctx = context(
        pool,
        vec![generic as Arc<dyn Provider>, special as Arc<dyn Provider>],
        test_config(),
    );

    sync(&ctx, t - Duration::minutes(20)).await.unwrap();
    assert_eq!(ctx.queue.lock().await.peek().unwrap().payload.provider, "special");
}

#[tokio::test]
async fn test_credential_fetched_once_and_carried_to_probe() {
    let t = base_time();
    let pool = setup_db().await;
    insert_showing(&pool, 1, VENUE_ID, t, None).await;
    insert_showing(&pool, 2, VENUE_ID, t, None).await;

    let provider = Arc::new(ScriptedProvider::new("json", "Lichtburg").with_credential(Some("tok-1")));
    provider.answer(1, Some("Saal 1"), 10);
    provider.answer(2, Some("Saal 1"), 10);
    let ctx = context(pool, vec![provider.clone() as Arc<dyn Provider>], test_config());

    let now = t - Duration::minutes(10);
    let report = sync(&ctx, now).await.unwrap();
    assert_eq!(report.enqueued, 2);
    assert_eq!(provider.credential_calls(), 1);

    // Still fresh on the next pass
    sync(&ctx, now + Duration::seconds(1)).await.unwrap();
    assert_eq!(provider.credential_calls(), 1);

    let tick_report = tick(&ctx, now + Duration::seconds(1)).await.unwrap();
    assert_eq!(tick_report.sampled, 2);
    let seen = provider.seen_credentials.lock().unwrap().clone();
    assert_eq!(seen, vec![Some("tok-1".to_string()); 2]);
}

#[tokio::test]
async fn test_stale_credential_is_refreshed() {
    let t = base_time();
    let pool = setup_db().await;
    insert_showing(&pool, 1, VENUE_ID, t, None).await;

    let provider = Arc::new(ScriptedProvider::new("json", "Lichtburg").with_credential(Some("tok")));
    let config = test_config();
    let ttl = config.credential_ttl();
    let ctx = context(pool, vec![provider.clone() as Arc<dyn Provider>], config);

    let now = t - Duration::minutes(10);
    sync(&ctx, now - ttl).await.unwrap();
    assert_eq!(provider.credential_calls(), 1);

    sync(&ctx, now).await.unwrap();
    assert_eq!(provider.credential_calls(), 2);
}

#[tokio::test]
async fn test_credential_failure_skips_venue_for_the_pass() {
    let t = base_time();
    let pool = setup_db().await;
    insert_showing(&pool, 1, VENUE_ID, t, None).await;
    insert_showing(&pool, 2, VENUE_ID, t, None).await;

    let provider = Arc::new(ScriptedProvider::new("json", "Lichtburg").with_credential(None));
    let ctx = context(pool, vec![provider.clone() as Arc<dyn Provider>], test_config());

    let now = t - Duration::minutes(10);
    let report = sync(&ctx, now).await.unwrap();
    assert_eq!(report.enqueued, 0);
    assert_eq!(report.credential_failures, 2);
    assert_eq!(provider.credential_calls(), 1);

    // Retried on the next pass
    *provider.credential.lock().unwrap() = Some("late-token".to_string());
    let report = sync(&ctx, now + Duration::seconds(30)).await.unwrap();
    assert_eq!(report.enqueued, 2);
    assert_eq!(provider.credential_calls(), 2);
}

#[tokio::test]
async fn test_credential_needs_venue_url() {
    let t = base_time();
    let pool = setup_db().await;
    insert_venue(&pool, 2, "Lichtburg Studio", None).await;
    insert_showing(&pool, 1, 2, t, None).await;

    let provider = Arc::new(ScriptedProvider::new("json", "Lichtburg").with_credential(Some("tok")));
    let ctx = context(pool, vec![provider.clone() as Arc<dyn Provider>], test_config());

    let report = sync(&ctx, t - Duration::minutes(10)).await.unwrap();
    assert_eq!(report.missing_prerequisites, 1);
    assert_eq!(report.enqueued, 0);
    assert_eq!(provider.credential_calls(), 0);
}

#[tokio::test]
async fn test_failed_probe_does_not_affect_siblings() {
    let t = base_time();
    let pool = setup_db().await;
    for id in 1..=3 {
        insert_showing(&pool, id, VENUE_ID, t, None).await;
    }

    let provider = Arc::new(ScriptedProvider::new("json", "Lichtburg"));
    provider.answer(1, Some("Saal 1"), 10);
    provider.answer(3, Some("Saal 1"), 20);
    let ctx = context(pool, vec![provider.clone() as Arc<dyn Provider>], test_config());

    let now = t - Duration::minutes(5);
    sync(&ctx, now).await.unwrap();
    let report = tick(&ctx, now).await.unwrap();

    assert_eq!(report.dispatched, 3);
    assert_eq!(report.sampled, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.failures[0].payload.show_id, 2);
    assert_eq!(ctx.buffer.len().await, 2);
}

#[tokio::test]
async fn test_dispatch_follows_provider_priority() {
    let t = base_time();
    let pool = setup_db().await;
    insert_venue(&pool, 2, "Odeon", Some("https://odeon.test")).await;
    insert_showing(&pool, 1, VENUE_ID, t, None).await;
    insert_showing(&pool, 2, 2, t, None).await;
    insert_showing(&pool, 3, VENUE_ID, t, None).await;

    let log = Arc::new(Mutex::new(Vec::new()));
    let slow = Arc::new(
        ScriptedProvider::new("slow", "Lichtburg")
            .with_priority(50)
            .with_shared_log(log.clone()),
    );
    let fast = Arc::new(
        ScriptedProvider::new("fast", "Odeon")
            .with_priority(1)
            .with_shared_log(log.clone()),
    );
    slow.answer(1, None, 1);
    slow.answer(3, None, 1);
    fast.answer(2, None, 1);

    let mut config = test_config();
    config.probe_concurrency = 1;
    let ctx = context(
        pool,
        vec![slow as Arc<dyn Provider>, fast as Arc<dyn Provider>],
        config,
    );

    let now = t - Duration::minutes(5);
    sync(&ctx, now).await.unwrap();
    tick(&ctx, now).await.unwrap();

    let order = log.lock().unwrap().clone();
    assert_eq!(order.len(), 3);
    assert_eq!(order[0], 2);
}

#[tokio::test]
async fn test_failed_sample_not_retried_within_window() {
    let t = base_time();
    let pool = setup_db().await;
    insert_showing(&pool, 1, VENUE_ID, t, None).await;

    // No scripted answer: every probe of show 1 fails
    let provider = Arc::new(ScriptedProvider::new("json", "Lichtburg"));
    let ctx = context(pool, vec![provider.clone() as Arc<dyn Provider>], test_config());

    let first = t - Duration::minutes(9);
    sync(&ctx, first).await.unwrap();
    let report = tick(&ctx, first).await.unwrap();
    assert_eq!(report.failed, 1);

    let second = t - Duration::minutes(4);
    let resynced = sync(&ctx, second).await.unwrap();
    assert_eq!(resynced.already_dispatched, 1);
    assert_eq!(resynced.enqueued, 0);

    let report = tick(&ctx, second).await.unwrap();
    assert_eq!(report.dispatched, 0);
    assert_eq!(provider.probed_shows(), vec![1]);
}

#[tokio::test]
async fn test_buffered_show_not_sampled_again_before_flush() {
    let t = base_time();
    let pool = setup_db().await;
    insert_showing(&pool, 1, VENUE_ID, t, None).await;

    let provider = Arc::new(ScriptedProvider::new("json", "Lichtburg"));
    provider.answer(1, Some("Saal 1"), 30);
    let ctx = context(pool, vec![provider.clone() as Arc<dyn Provider>], test_config());

    for minutes in [9, 6, 3] {
        let now = t - Duration::minutes(minutes);
        sync(&ctx, now).await.unwrap();
        tick(&ctx, now).await.unwrap();
    }

    assert_eq!(provider.probed_shows(), vec![1]);
    assert_eq!(ctx.buffer.len().await, 1);
}

#[tokio::test]
async fn test_show_requeued_once_its_window_has_passed() {
    let t = base_time();
    let pool = setup_db().await;
    insert_showing(&pool, 1, VENUE_ID, t, None).await;

    let provider = Arc::new(ScriptedProvider::new("json", "Lichtburg"));
    let ctx = context(pool, vec![provider as Arc<dyn Provider>], test_config());

    let now = t - Duration::minutes(9);
    sync(&ctx, now).await.unwrap();
    tick(&ctx, now).await.unwrap();

    // Window end is inclusive; one second later the row is late, not dispatched
    let report = sync(&ctx, t + Duration::minutes(5)).await.unwrap();
    assert_eq!(report.already_dispatched, 1);
    let report = sync(&ctx, t + Duration::minutes(5) + Duration::seconds(1)).await.unwrap();
    assert_eq!(report.already_dispatched, 0);
    assert_eq!(report.dropped_late, 1);
}

#[tokio::test]
async fn test_stale_credential_refreshed_at_dispatch() {
    let t = base_time();
    let pool = setup_db().await;
    insert_showing(&pool, 1, VENUE_ID, t, None).await;

    let provider = Arc::new(ScriptedProvider::new("json", "Lichtburg").with_credential(Some("tok-1")));
    provider.answer(1, Some("Saal 1"), 10);
    let mut config = test_config();
    config.credential_ttl_secs = 60;
    let ctx = context(pool, vec![provider.clone() as Arc<dyn Provider>], config);

    sync(&ctx, t - Duration::minutes(10)).await.unwrap();
    assert_eq!(provider.credential_calls(), 1);

    *provider.credential.lock().unwrap() = Some("tok-2".to_string());
    let report = tick(&ctx, t - Duration::minutes(8)).await.unwrap();
    assert_eq!(report.sampled, 1);
    assert_eq!(provider.credential_calls(), 2);

    let seen = provider.seen_credentials.lock().unwrap().clone();
    assert_eq!(seen, vec![Some("tok-2".to_string())]);
}

#[tokio::test]
async fn test_failed_refresh_keeps_enqueued_credential() {
    let t = base_time();
    let pool = setup_db().await;
    insert_showing(&pool, 1, VENUE_ID, t, None).await;
    insert_showing(&pool, 2, VENUE_ID, t, None).await;

    let provider = Arc::new(ScriptedProvider::new("json", "Lichtburg").with_credential(Some("tok-1")));
    provider.answer(1, Some("Saal 1"), 10);
    provider.answer(2, Some("Saal 1"), 10);
    let mut config = test_config();
    config.credential_ttl_secs = 60;
    let ctx = context(pool, vec![provider.clone() as Arc<dyn Provider>], config);

    sync(&ctx, t - Duration::minutes(10)).await.unwrap();

    *provider.credential.lock().unwrap() = None;
    let report = tick(&ctx, t - Duration::minutes(8)).await.unwrap();
    assert_eq!(report.sampled, 2);
    // One refresh attempt for the venue, not one per task
    assert_eq!(provider.credential_calls(), 2);

    let seen = provider.seen_credentials.lock().unwrap().clone();
    assert_eq!(seen, vec![Some("tok-1".to_string()); 2]);
}
