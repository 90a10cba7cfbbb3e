//! Architectural Contract Test: Advertisement Liveness
//!
//! The capability flag is a liveness signal, not just a value signal.
//!
//! Constraints verified:
//! - The advertise key is written on every loop iteration, never skipped
//!   because the value is unchanged
//! - The written value tracks the configured flag verbatim ("1"/"0")
//! - An advertise write failure is absorbed; the loop keeps scanning

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use ipsetting_core::IpSettingFeature;
use ipsetting_core::keys::DEFAULT_ADVERTISE_KEY;

async fn run_with_events(store: Arc<ScriptedStore>, enabled: bool, events: usize) {
    let mut config = test_config(20);
    config.enabled = enabled;

    let applier = Arc::new(CountingApplier::new());
    let (feature, _event_rx) = IpSettingFeature::new(store.clone(), applier, config)
        .expect("feature construction succeeds");

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let handle = tokio::spawn(async move { feature.run_with_shutdown(Some(shutdown_rx)).await });

    for _ in 0..events {
        store.fire("xenserver/device/vif");
        tokio::time::sleep(Duration::from_millis(80)).await;
    }
    tokio::time::sleep(Duration::from_millis(80)).await;

    shutdown_tx.send(()).unwrap();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn advertise_written_every_iteration() {
    let store = Arc::new(ScriptedStore::new());
    run_with_events(store.clone(), true, 3).await;

    let writes = store.writes_to(DEFAULT_ADVERTISE_KEY);
    // One write before the first event wait, one per completed iteration
    assert!(
        writes.len() >= 3,
        "expected repeated advertise writes, got {}",
        writes.len()
    );
    assert!(writes.iter().all(|v| v == "1"));
}

#[tokio::test]
async fn disabled_feature_advertises_zero() {
    let store = Arc::new(ScriptedStore::new());
    run_with_events(store.clone(), false, 1).await;

    let writes = store.writes_to(DEFAULT_ADVERTISE_KEY);
    assert!(!writes.is_empty());
    assert!(writes.iter().all(|v| v == "0"));
}

#[tokio::test]
async fn advertise_failure_does_not_disturb_scans() {
    let store = Arc::new(ScriptedStore::new());
    store.fail_writes();
    store.set_listing("0\0");

    run_with_events(store.clone(), true, 2).await;

    // The flag never landed, but scans proceeded regardless
    assert!(store.writes_to(DEFAULT_ADVERTISE_KEY).is_empty());
    assert!(store.directory_calls() >= 1);
}
