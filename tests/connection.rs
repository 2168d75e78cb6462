mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use common::*;
use tauri_plugin_billing::*;
use tokio::time::Instant;

fn assert_elapsed(started: Instant, expected: Duration) {
    let elapsed = started.elapsed();
    assert!(
        elapsed >= expected && elapsed < expected + Duration::from_millis(50),
        "elapsed {elapsed:?}, expected {expected:?}"
    );
}

#[tokio::test(start_paused = true)]
async fn setup_failures_back_off_exponentially() {
    let (ds, _events) = data_source(catalog());
    ds.client().script_connections([
        BillingResponseCode::ServiceUnavailable,
        BillingResponseCode::BillingUnavailable,
        BillingResponseCode::ServiceTimeout,
    ]);

    let started = Instant::now();
    ds.connect().await;

    assert_eq!(ds.client().attempts(), 4);
    assert_elapsed(started, Duration::from_secs(1 + 2 + 4));
    assert!(ds.is_connected());
    assert_eq!(ds.current_backoff(), Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn backoff_is_capped_at_fifteen_minutes() {
    let (ds, _events) = data_source(catalog());
    ds.client()
        .script_connections(std::iter::repeat(BillingResponseCode::Error).take(12));

    let started = Instant::now();
    ds.connect().await;

    // 1 + 2 + ... + 512 seconds, then two waits at the 900 second ceiling
    assert_elapsed(started, Duration::from_secs(1023 + 900 + 900));
    assert_eq!(ds.client().attempts(), 13);
}

#[tokio::test(start_paused = true)]
async fn disconnect_triggers_a_reconnect() {
    let (ds, events) = data_source(catalog());
    let runner = ds.clone();
    tokio::spawn(async move { runner.run(events).await });
    wait_for(|| ds.is_connected()).await;
    assert_eq!(ds.client().attempts(), 1);

    ds.handle_event(BillingEvent::ServiceDisconnected);
    assert!(!ds.is_connected());

    // a second notification while the reconnect is pending is ignored
    ds.handle_event(BillingEvent::ServiceDisconnected);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(ds.is_connected());
    assert_eq!(ds.client().attempts(), 2);
}

#[tokio::test(start_paused = true)]
async fn reconnect_keeps_backing_off_until_it_succeeds() {
    let (ds, events) = data_source(catalog());
    let runner = ds.clone();
    tokio::spawn(async move { runner.run(events).await });
    wait_for(|| ds.is_connected()).await;

    ds.client().script_connections([
        BillingResponseCode::ServiceUnavailable,
        BillingResponseCode::ServiceUnavailable,
    ]);
    let started = Instant::now();
    ds.handle_event(BillingEvent::ServiceDisconnected);

    wait_for(|| ds.is_connected()).await;
    // 1s before the first attempt, then 2s and 4s after the failures
    assert!(started.elapsed() >= Duration::from_secs(7));
    assert_eq!(ds.client().attempts(), 4);
    assert_eq!(ds.current_backoff(), Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn unavailable_client_is_never_connected() {
    let (ds, events) = data_source(catalog());
    ds.client().available.store(false, Ordering::SeqCst);
    let runner = ds.clone();
    tokio::spawn(async move { runner.run(events).await });

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(ds.client().attempts(), 0);
    assert!(!ds.is_connected());

    // a disconnect does not start a retry loop either
    ds.handle_event(BillingEvent::ServiceDisconnected);
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(ds.client().attempts(), 0);
    assert!(!ds.is_connected());
}
