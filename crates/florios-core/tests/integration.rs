//! Integration tests for florios-core.
//!
//! These tests drive the full pipeline through a file-backed feed:
//! source fetch → ingest → session merge → history → derived views.

use std::sync::Arc;
use std::time::{Duration, Instant};

use florios_core::{
    Connectivity, FileSource, HistoryField, MonitorConfig, MonitorSession, Poller, Rgb,
    TelemetrySource, lock_session, poll_once, shared,
};
use serde_json::json;

fn write_feed(file: &tempfile::NamedTempFile, value: serde_json::Value) {
    std::fs::write(file.path(), value.to_string()).unwrap();
}

#[test]
fn file_feed_pipeline_builds_views() {
    let file = tempfile::NamedTempFile::new().unwrap();
    write_feed(
        &file,
        json!([
            {"bottle_id": "B1", "timestamp": 1_000, "remaining_volume": 375.0, "fill_h": 500.0,
             "infusion_rate": 2.5},
            {"bottle_id": "B2", "timestamp": 1_000, "remaining_volume": 12.0, "fill_h": 500.0,
             "infusion_rate": 1.0},
            {"bottle_id": "B1", "timestamp": 990, "remaining_volume": 380.0, "fill_h": 500.0},
            {"timestamp": 1_000, "remaining_volume": 1.0}
        ]),
    );

    let session = shared(MonitorSession::default());
    let source = FileSource::new(file.path());
    let report = poll_once(&source, &session).unwrap();
    assert_eq!(report.created, 2);

    let snapshot = lock_session(&session).snapshot();
    assert_eq!(snapshot.connectivity, Connectivity::Connected);
    assert!(snapshot.any_low_volume());

    let views = snapshot.views(1_000);
    assert_eq!(views.len(), 2);
    let b1 = &views[0];
    assert_eq!(b1.device_id, "B1");
    assert_eq!(b1.percentage, Some(75.0));
    assert_eq!(b1.color, Rgb::new(134, 189, 51));
    assert_eq!(b1.rate, "2.5");
    assert_eq!(b1.time_remaining, "2h 30m");
    assert!(!b1.low_volume);
    assert!(views[1].low_volume);
}

#[test]
fn repeated_polls_grow_history_and_keep_start_time() {
    let file = tempfile::NamedTempFile::new().unwrap();
    let session = shared(MonitorSession::new(
        MonitorConfig::default().with_history_capacity(5),
    ));
    let source = FileSource::new(file.path());

    for step in 0..8i64 {
        write_feed(
            &file,
            json!([{"bottle_id": "B7", "timestamp": 2_000 + step * 30,
                    "remaining_volume": 300.0 - step as f64, "fill_h": 500.0}]),
        );
        poll_once(&source, &session).unwrap();
    }

    let guard = lock_session(&session);
    let entry = guard.device("B7").unwrap();
    assert_eq!(entry.state.start_time, 2_000);
    assert_eq!(entry.history.len(), 5);

    let series = entry
        .history
        .elapsed_series(entry.state.start_time, HistoryField::RemainingVolume);
    assert_eq!(series.first(), Some(&(1.5, 297.0)));
    assert_eq!(series.last(), Some(&(3.5, 293.0)));
}

#[test]
fn outage_freezes_last_known_state() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("feed.json");
    std::fs::write(
        &path,
        json!([{"bottle_id": "B7", "timestamp": 5_000, "remaining_volume": 240.0,
                "fill_h": 500.0, "infusion_rate": 2.0}])
        .to_string(),
    )
    .unwrap();

    let session = shared(MonitorSession::default());
    let source = FileSource::new(&path);
    poll_once(&source, &session).unwrap();
    let before = lock_session(&session).device("B7").unwrap().clone();

    // Malformed payload, then an empty list, then the feed disappears.
    std::fs::write(&path, "<html>offline</html>").unwrap();
    assert!(poll_once(&source, &session).is_err());
    std::fs::write(&path, "[]").unwrap();
    poll_once(&source, &session).unwrap();
    std::fs::remove_file(&path).unwrap();
    assert!(poll_once(&source, &session).is_err());

    let guard = lock_session(&session);
    assert_eq!(guard.device("B7").unwrap(), &before);
    assert_eq!(guard.connectivity(), Connectivity::Disconnected);
    assert_eq!(guard.stats().failed_cycles, 2);
    assert_eq!(guard.stats().ok_cycles, 2);
}

#[test]
fn background_poller_recovers_after_outage() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("feed.json");

    let session = shared(MonitorSession::default());
    let source: Box<dyn TelemetrySource> = Box::new(FileSource::new(&path));
    let handle =
        Poller::spawn(source, Arc::clone(&session), Duration::from_millis(25)).unwrap();

    let wait_until = |pred: &dyn Fn(&MonitorSession) -> bool| {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if pred(&lock_session(&session)) {
                return true;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        false
    };

    assert!(wait_until(&|s| s.stats().failed_cycles > 0));
    assert!(!lock_session(&session).connectivity().is_connected());

    std::fs::write(
        &path,
        json!([{"bottle_id": 7, "timestamp": "2026-01-09 12:40:07", "remaining_volume": 90.0}])
            .to_string(),
    )
    .unwrap();
    assert!(wait_until(&|s| s.connectivity().is_connected() && !s.is_empty()));
    handle.stop();

    let guard = lock_session(&session);
    let entry = guard.device("7").unwrap();
    assert_eq!(entry.state.observed_at, 1_767_962_407);
    assert_eq!(entry.history.len(), 1);
}
