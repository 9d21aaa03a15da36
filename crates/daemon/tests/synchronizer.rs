//! Poll cadence, transition stamping and cancellation of the state synchronizer.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use common::{advance_ms, settings, settle, start, FakeStore, ScriptedClient, Step};
use traffic_light_core::model::BuildStatus;
use traffic_light_core::{ConfigError, TokioScheduler};
use traffic_light_daemon::ci_client::CiStatusClient;
use traffic_light_daemon::synchronizer::{StateSynchronizer, STARVED_AFTER};

#[tokio::test(start_paused = true)]
async fn polls_immediately_then_every_5000ms() {
    let store = FakeStore::new(settings(5_000, Some(1)));
    let client = ScriptedClient::new(vec![]);
    let _sync = start(store, client.clone());

    settle().await;
    assert_eq!(client.calls(), 1);
    advance_ms(1_000).await;
    assert_eq!(client.calls(), 1);
    advance_ms(5_000).await;
    assert_eq!(client.calls(), 2);
    advance_ms(50_000).await;
    assert_eq!(client.calls(), 12);
}

#[tokio::test(start_paused = true)]
async fn polls_immediately_then_every_30000ms() {
    let store = FakeStore::new(settings(30_000, Some(1)));
    let client = ScriptedClient::new(vec![]);
    let sync = start(store, client.clone());
    assert_eq!(sync.interval(), Duration::from_millis(30_000));

    settle().await;
    assert_eq!(client.calls(), 1);
    advance_ms(1_000).await;
    assert_eq!(client.calls(), 1);
    advance_ms(5_000).await;
    assert_eq!(client.calls(), 1);
    advance_ms(50_000).await;
    assert_eq!(client.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn stamps_only_on_transitions() {
    let store = FakeStore::new(settings(1_000, Some(1)));
    let client = ScriptedClient::new(vec![
        Step::Ok(BuildStatus::Success),
        Step::Ok(BuildStatus::Success),
        Step::Ok(BuildStatus::Fail),
        Step::Ok(BuildStatus::Fail),
        Step::Ok(BuildStatus::Success),
    ]);
    let sync = start(store.clone(), client.clone());

    settle().await;
    advance_ms(1_000).await;
    assert_eq!(store.stamps(), 0);

    store.clock.set(2_000_000);
    advance_ms(1_000).await;
    assert_eq!(store.stamps(), 1);
    assert_eq!(sync.state().await.unwrap().last_changed_status_time, Some(2_000_000));

    advance_ms(1_000).await;
    assert_eq!(store.stamps(), 1);

    store.clock.set(3_000_000);
    advance_ms(1_000).await;
    assert_eq!(client.calls(), 5);
    assert_eq!(store.stamps(), 2);

    let state = sync.state().await.unwrap();
    assert_eq!(state.status, Some(BuildStatus::Success));
    assert_eq!(state.last_changed_status_time, Some(3_000_000));
}

#[tokio::test(start_paused = true)]
async fn first_observation_stamps_a_never_stamped_record() {
    let store = FakeStore::new(settings(1_000, None));
    let client = ScriptedClient::new(vec![Step::Ok(BuildStatus::Success)]);
    let sync = start(store.clone(), client.clone());

    settle().await;
    assert_eq!(store.stamps(), 1);
    assert_eq!(
        sync.state().await.unwrap().last_changed_status_time,
        Some(1_000_000)
    );

    advance_ms(1_000).await;
    assert_eq!(store.stamps(), 1);
}

#[tokio::test(start_paused = true)]
async fn state_reads_timestamp_fresh_from_store() {
    let store = FakeStore::new(settings(60_000, Some(1)));
    let client = ScriptedClient::new(vec![Step::Ok(BuildStatus::Fail)]);
    let sync = start(store.clone(), client.clone());
    settle().await;

    let state = sync.state().await.unwrap();
    assert_eq!(state.status, Some(BuildStatus::Fail));
    assert_eq!(state.items.len(), 3);
    assert_eq!(state.items[0].id, "Build 1");
    assert_eq!(state.last_changed_status_time, Some(1));

    store.set_last_changed(99);
    let state = sync.state().await.unwrap();
    assert_eq!(state.status, Some(BuildStatus::Fail));
    assert_eq!(state.last_changed_status_time, Some(99));
}

#[tokio::test(start_paused = true)]
async fn state_before_first_poll_has_no_status() {
    let store = FakeStore::new(settings(60_000, Some(5)));
    let client = ScriptedClient::new(vec![Step::Delayed(
        Duration::from_millis(10_000),
        BuildStatus::Fail,
    )]);
    let sync = start(store, client);
    settle().await;

    let state = sync.state().await.unwrap();
    assert!(state.items.is_empty());
    assert_eq!(state.status, None);
    assert_eq!(state.last_changed_status_time, Some(5));
}

#[tokio::test(start_paused = true)]
async fn transport_failure_keeps_snapshot_and_is_reported() {
    let store = FakeStore::new(settings(1_000, Some(1)));
    let client = ScriptedClient::new(vec![
        Step::Ok(BuildStatus::Fail),
        Step::Err,
        Step::Err,
        Step::Ok(BuildStatus::Success),
    ]);
    let sync = start(store.clone(), client.clone());
    let health = sync.health();

    settle().await;
    advance_ms(1_000).await;
    assert_eq!(sync.state().await.unwrap().status, Some(BuildStatus::Fail));
    assert_eq!(health.borrow().consecutive_failures, 1);

    advance_ms(1_000).await;
    assert_eq!(health.borrow().consecutive_failures, 2);
    assert!(health.borrow().last_error.as_deref().unwrap().contains("503"));
    assert_eq!(sync.state().await.unwrap().status, Some(BuildStatus::Fail));

    advance_ms(1_000).await;
    assert_eq!(health.borrow().consecutive_failures, 0);
    assert!(health.borrow().last_success_ms.is_some());
    assert_eq!(sync.state().await.unwrap().status, Some(BuildStatus::Success));
    assert_eq!(store.stamps(), 1);
}

#[tokio::test(start_paused = true)]
async fn slow_stale_response_does_not_overwrite_newer_one() {
    let store = FakeStore::new(settings(5_000, Some(1)));
    let client = ScriptedClient::new(vec![
        Step::Delayed(Duration::from_millis(8_000), BuildStatus::Fail),
        Step::Ok(BuildStatus::Success),
    ]);
    let sync = start(store.clone(), client.clone());

    settle().await;
    advance_ms(5_000).await;
    assert_eq!(client.calls(), 2);
    assert_eq!(sync.state().await.unwrap().status, Some(BuildStatus::Success));

    advance_ms(3_000).await;
    assert_eq!(client.calls(), 2);
    assert_eq!(sync.state().await.unwrap().status, Some(BuildStatus::Success));
    assert_eq!(store.stamps(), 0);
}

#[tokio::test(start_paused = true)]
async fn polls_slower_than_interval_show_up_in_health() {
    let store = FakeStore::new(settings(1_000, Some(1)));
    let client = ScriptedClient::new(vec![Step::Delayed(
        Duration::from_millis(2_500),
        BuildStatus::Fail,
    )]);
    let sync = start(store.clone(), client.clone());
    settle().await;

    // Polls issued at t=0..=7000 land at t=2500..=9500, each after a newer one.
    for _ in 0..10 {
        advance_ms(1_000).await;
    }

    let health = sync.health().borrow().clone();
    assert_eq!(health.consecutive_superseded, 8);
    assert!(health.consecutive_superseded >= STARVED_AFTER);
    assert_eq!(health.consecutive_failures, 0);
    assert_eq!(health.last_success_ms, None);
    assert_eq!(sync.state().await.unwrap().status, None);
    assert_eq!(store.stamps(), 0);
}

#[tokio::test(start_paused = true)]
async fn stop_cancels_timer_and_is_idempotent() {
    let store = FakeStore::new(settings(1_000, Some(1)));
    let client = ScriptedClient::new(vec![]);
    let sync = start(store, client.clone());
    settle().await;
    assert_eq!(client.calls(), 1);

    sync.stop();
    sync.stop();
    assert!(sync.is_stopped());

    advance_ms(10_000).await;
    assert_eq!(client.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn in_flight_result_is_dropped_after_stop() {
    let store = FakeStore::new(settings(60_000, None));
    let client = ScriptedClient::new(vec![Step::Delayed(
        Duration::from_millis(1_000),
        BuildStatus::Fail,
    )]);
    let sync = start(store.clone(), client.clone());
    settle().await;

    advance_ms(500).await;
    sync.stop();
    advance_ms(1_000).await;

    assert_eq!(sync.state().await.unwrap().status, None);
    assert_eq!(store.stamps(), 0);
}

#[tokio::test(start_paused = true)]
async fn build_types_are_reread_each_tick() {
    let store = FakeStore::new(settings(1_000, Some(1)));
    let client = ScriptedClient::new(vec![]);
    let _sync = start(store.clone(), client.clone());
    settle().await;
    assert_eq!(
        client.last_seen().unwrap(),
        vec!["Build 1", "Build 2", "Build 3"]
    );

    store.set_build_types(&["Build 3", "Build 1"]);
    advance_ms(1_000).await;
    assert_eq!(client.last_seen().unwrap(), vec!["Build 3", "Build 1"]);
}

#[tokio::test(start_paused = true)]
async fn interval_is_fixed_at_construction() {
    let store = FakeStore::new(settings(5_000, Some(1)));
    let client = ScriptedClient::new(vec![]);
    let _sync = start(store.clone(), client.clone());
    settle().await;

    store.set_interval(1_000);
    advance_ms(1_000).await;
    advance_ms(1_000).await;
    assert_eq!(client.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn settings_read_failure_on_tick_skips_the_tick() {
    let store = FakeStore::new(settings(1_000, Some(1)));
    let client = ScriptedClient::new(vec![Step::Ok(BuildStatus::Fail)]);
    let sync = start(store.clone(), client.clone());
    settle().await;

    store.fail_reads.store(true, Ordering::SeqCst);
    advance_ms(1_000).await;
    assert_eq!(client.calls(), 1);
    assert_eq!(sync.health().borrow().consecutive_failures, 1);
    assert!(matches!(sync.state().await, Err(ConfigError::Invalid(_))));
}

#[tokio::test]
async fn construction_fails_without_settings() {
    let store = FakeStore::new(settings(1_000, None));
    store.fail_reads.store(true, Ordering::SeqCst);
    let client = ScriptedClient::new(vec![]);

    let res = StateSynchronizer::start(
        store,
        move |_| client as Arc<dyn CiStatusClient>,
        &TokioScheduler,
    );
    assert!(matches!(res, Err(ConfigError::Invalid(_))));
}
