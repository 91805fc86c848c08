//! Tests for the watch process wrapper.
//!
//! These spawn ordinary Unix tools (`cat`, `sh`) in place of `kubectl`.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use futures::StreamExt;

use lookout_common::config::{DisplayConfig, ThreadConfig};
use lookout_common::error::LookoutError;
use lookout_common::time::{ManualClock, RecordingSleeper};
use lookout_common::types::{Category, WorkloadKey};
use lookout_engine::LookoutEngine;
use lookout_notifier::ResilientSender;
use lookout_notifier::memory::MemoryTransport;
use lookout_watcher::WatchCommand;

fn fixture() -> String {
    format!("{}/tests/fixtures/watch.json", env!("CARGO_MANIFEST_DIR"))
}

#[tokio::test]
async fn test_streams_fixture_until_clean_exit() {
    let watch = WatchCommand::new("cat", [fixture()]);
    let snapshots: Vec<_> = watch.spawn().unwrap().collect().await;

    assert_eq!(snapshots.len(), 5);
    let first = snapshots[0].as_ref().unwrap();
    assert_eq!(first.key, WorkloadKey::new("shop", "checkout"));
    assert_eq!(first.updated, None);
    assert!(snapshots.iter().all(|s| s.is_ok()));
}

#[tokio::test]
async fn test_nonzero_exit_ends_with_error() {
    let watch = WatchCommand::new(
        "sh",
        ["-c", r#"echo '{"metadata": {"name": "a", "namespace": "n"}}'; exit 3"#],
    );
    let snapshots: Vec<_> = watch.spawn().unwrap().collect().await;

    assert_eq!(snapshots.len(), 2);
    assert!(snapshots[0].is_ok());
    assert!(matches!(snapshots[1], Err(LookoutError::Watch(_))));
}

#[tokio::test]
async fn test_missing_program_fails_to_spawn() {
    let watch = WatchCommand::new("kube-lookout-no-such-binary", Vec::<String>::new());
    assert!(matches!(watch.spawn(), Err(LookoutError::Watch(_))));
}

#[tokio::test]
async fn test_engine_consumes_watch_output() {
    let transport = MemoryTransport::new();
    let sleeper = RecordingSleeper::new();
    let sender = ResilientSender::new(Arc::new(transport.clone()), Arc::new(sleeper.clone()));
    let mut engine = LookoutEngine::new(
        DisplayConfig::default(),
        ThreadConfig::default(),
        sender,
        Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap())),
        Arc::new(sleeper),
    );

    let watch = WatchCommand::new("cat", [fixture()]);
    engine.run(watch.spawn().unwrap()).await.unwrap();

    // checkout rolled out and finished; search is degraded; coredns ignored
    assert_eq!(engine.tracked().len(Category::Rollout), 0);
    assert!(!engine.heads().is_open(Category::Rollout));
    assert!(engine.tracked().contains(Category::Degraded, &WorkloadKey::new("shop", "search")));
    assert!(engine.heads().is_open(Category::Degraded));
    assert!(
        transport
            .sent()
            .iter()
            .all(|m| !m.content().header.contains("coredns"))
    );
}
