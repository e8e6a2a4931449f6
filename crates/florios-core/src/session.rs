//! Cross-poll session state.
//!
//! A [`MonitorSession`] owns everything the monitor knows: one
//! [`DeviceEntry`] (latest state plus its trend history) per device, the
//! connectivity of the last cycle, and cycle counters. The poller is the only
//! writer; presentation layers read [`SessionSnapshot`]s.
//!
//! # Merge rule
//!
//! For each device in a snapshot:
//! - unseen device → new entry, `start_time = observed_at`, one history point;
//! - strictly newer record → fields replaced, `start_time` kept, one point;
//! - equal or older record → nothing changes.
//!
//! Devices missing from a snapshot keep their last state. Nothing is pruned.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use log::debug;
use serde::Serialize;
use serde_json::Value;

use crate::config::MonitorConfig;
use crate::error::FeedError;
use crate::history::DeviceHistory;
use crate::ingest::{LatestRecords, ingest};
use crate::metrics::{DeviceView, low_volume_alert};
use crate::record::{DeviceId, DeviceState};

// ---------------------------------------------------------------------------
// Entries and reports
// ---------------------------------------------------------------------------

/// State and history of one device. Always updated together.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceEntry {
    pub state: DeviceState,
    pub history: DeviceHistory,
}

/// Outcome of the most recent poll cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Connectivity {
    Connected,
    #[default]
    Disconnected,
}

impl Connectivity {
    pub fn is_connected(self) -> bool {
        self == Self::Connected
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Connected => "Connected",
            Self::Disconnected => "Disconnected",
        }
    }
}

/// What one merge did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct MergeReport {
    /// Devices seen for the first time.
    pub created: usize,
    /// Devices advanced to a strictly newer observation.
    pub updated: usize,
    /// Records ignored because they were not newer than the stored state.
    pub stale: usize,
}

impl MergeReport {
    pub fn changed(&self) -> usize {
        self.created + self.updated
    }
}

/// Poll cycle bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct CycleStats {
    pub ok_cycles: u64,
    pub failed_cycles: u64,
    /// Epoch seconds of the last successful cycle.
    pub last_success: Option<i64>,
    /// Message of the last failure, cleared by the next success.
    pub last_error: Option<String>,
}

// ---------------------------------------------------------------------------
// MonitorSession
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct MonitorSession {
    config: MonitorConfig,
    devices: BTreeMap<DeviceId, DeviceEntry>,
    connectivity: Connectivity,
    stats: CycleStats,
}

impl Default for MonitorSession {
    fn default() -> Self {
        Self::new(MonitorConfig::default())
    }
}

impl MonitorSession {
    pub fn new(config: MonitorConfig) -> Self {
        Self {
            config,
            devices: BTreeMap::new(),
            connectivity: Connectivity::Disconnected,
            stats: CycleStats::default(),
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Merge one snapshot's latest records into the session.
    pub fn merge(&mut self, records: LatestRecords) -> MergeReport {
        let mut report = MergeReport::default();
        let capacity = self.config.history_capacity;

        for (id, record) in records {
            match self.devices.entry(id) {
                Entry::Vacant(slot) => {
                    let state = DeviceState::first_sighting(record);
                    let mut history = DeviceHistory::new(capacity);
                    history.append_from(&state);
                    debug!(
                        "new device {} first seen at {}",
                        state.device_id, state.start_time
                    );
                    slot.insert(DeviceEntry { state, history });
                    report.created += 1;
                }
                Entry::Occupied(mut slot) => {
                    let entry = slot.get_mut();
                    let observed_at = record.observed_at;
                    if entry.state.advance(record) {
                        entry.history.append_from(&entry.state);
                        report.updated += 1;
                    } else {
                        debug!(
                            "device {}: ignoring observation at {} (have {})",
                            entry.state.device_id, observed_at, entry.state.observed_at
                        );
                        report.stale += 1;
                    }
                }
            }
        }
        report
    }

    /// Ingest and merge a raw poll response, then mark the cycle successful.
    pub fn apply_snapshot(&mut self, payload: &Value, now: i64) -> MergeReport {
        let report = self.merge(ingest(payload));
        self.record_success(now);
        report
    }

    pub fn record_success(&mut self, now: i64) {
        self.connectivity = Connectivity::Connected;
        self.stats.ok_cycles += 1;
        self.stats.last_success = Some(now);
        self.stats.last_error = None;
    }

    /// Mark the cycle failed. Device state is not touched.
    pub fn record_failure(&mut self, error: &FeedError) {
        self.connectivity = Connectivity::Disconnected;
        self.stats.failed_cycles += 1;
        self.stats.last_error = Some(error.to_string());
    }

    pub fn connectivity(&self) -> Connectivity {
        self.connectivity
    }

    pub fn stats(&self) -> &CycleStats {
        &self.stats
    }

    pub fn device(&self, id: &str) -> Option<&DeviceEntry> {
        self.devices.get(id)
    }

    /// Entries ordered by device id.
    pub fn devices(&self) -> impl Iterator<Item = &DeviceEntry> {
        self.devices.values()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn any_low_volume(&self) -> bool {
        let threshold = self.config.low_volume_threshold;
        self.devices
            .values()
            .any(|e| low_volume_alert(&e.state, threshold))
    }

    /// Copy of the session for one render or one response.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            connectivity: self.connectivity,
            stats: self.stats.clone(),
            low_volume_threshold: self.config.low_volume_threshold,
            history_capacity: self.config.history_capacity,
            devices: self.devices.values().cloned().collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// SessionSnapshot
// ---------------------------------------------------------------------------

/// Read-only copy of a session, detached from the lock.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub connectivity: Connectivity,
    pub stats: CycleStats,
    pub low_volume_threshold: f64,
    pub history_capacity: usize,
    /// Ordered by device id.
    pub devices: Vec<DeviceEntry>,
}

impl SessionSnapshot {
    pub fn device(&self, id: &str) -> Option<&DeviceEntry> {
        self.devices.iter().find(|e| e.state.device_id == id)
    }

    pub fn view(&self, entry: &DeviceEntry, now: i64) -> DeviceView {
        DeviceView::derive(&entry.state, self.low_volume_threshold, now)
    }

    pub fn views(&self, now: i64) -> Vec<DeviceView> {
        self.devices.iter().map(|e| self.view(e, now)).collect()
    }

    pub fn any_low_volume(&self) -> bool {
        self.devices
            .iter()
            .any(|e| low_volume_alert(&e.state, self.low_volume_threshold))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::latest_per_device;
    use crate::record::TelemetryRecord;
    use serde_json::json;

    fn rec(id: &str, ts: i64, vol: f64) -> TelemetryRecord {
        TelemetryRecord::new(id, ts)
            .with_remaining_volume(vol)
            .with_fill_capacity(500.0)
            .with_infusion_rate(2.0)
    }

    fn batch(records: Vec<TelemetryRecord>) -> LatestRecords {
        latest_per_device(records)
    }

    #[test]
    fn first_merge_creates_entries() {
        let mut session = MonitorSession::default();
        let report = session.merge(batch(vec![rec("A", 100, 480.0), rec("B", 101, 300.0)]));
        assert_eq!(report, MergeReport { created: 2, updated: 0, stale: 0 });
        assert_eq!(session.len(), 2);

        let a = session.device("A").unwrap();
        assert_eq!(a.state.start_time, 100);
        assert_eq!(a.history.len(), 1);
    }

    #[test]
    fn newer_record_updates_and_appends() {
        let mut session = MonitorSession::default();
        session.merge(batch(vec![rec("A", 100, 480.0)]));
        let report = session.merge(batch(vec![rec("A", 102, 476.0)]));
        assert_eq!(report.updated, 1);

        let a = session.device("A").unwrap();
        assert_eq!(a.state.observed_at, 102);
        assert_eq!(a.state.remaining_volume, Some(476.0));
        assert_eq!(a.history.len(), 2);
    }

    #[test]
    fn start_time_never_changes() {
        let mut session = MonitorSession::default();
        for (i, ts) in (1_000..1_040).step_by(2).enumerate() {
            session.merge(batch(vec![rec("A", ts, 500.0 - i as f64)]));
            assert_eq!(session.device("A").unwrap().state.start_time, 1_000);
        }
    }

    #[test]
    fn stale_and_duplicate_records_are_noops() {
        let mut session = MonitorSession::default();
        session.merge(batch(vec![rec("A", 200, 400.0)]));
        let before = session.device("A").unwrap().clone();

        let dup = session.merge(batch(vec![rec("A", 200, 1.0)]));
        let old = session.merge(batch(vec![rec("A", 150, 2.0)]));
        assert_eq!(dup.stale, 1);
        assert_eq!(old.stale, 1);
        assert_eq!(session.device("A").unwrap(), &before);
    }

    #[test]
    fn absent_devices_retained() {
        let mut session = MonitorSession::default();
        session.merge(batch(vec![rec("A", 1, 100.0), rec("B", 1, 200.0)]));
        session.merge(batch(vec![rec("A", 5, 90.0)]));
        let b = session.device("B").unwrap();
        assert_eq!(b.state.observed_at, 1);
        assert_eq!(b.state.remaining_volume, Some(200.0));
    }

    #[test]
    fn history_bounded_by_config_capacity() {
        let config = MonitorConfig::default().with_history_capacity(4);
        let mut session = MonitorSession::new(config);
        for ts in 0..10 {
            session.merge(batch(vec![rec("A", ts, 100.0 - ts as f64)]));
        }
        let times: Vec<i64> = session
            .device("A")
            .unwrap()
            .history
            .iter()
            .map(|p| p.time)
            .collect();
        assert_eq!(times, vec![6, 7, 8, 9]);
    }

    #[test]
    fn record_without_volume_updates_state_only() {
        let mut session = MonitorSession::default();
        session.merge(batch(vec![rec("A", 1, 100.0)]));
        session.merge(batch(vec![TelemetryRecord::new("A", 2)]));
        let a = session.device("A").unwrap();
        assert_eq!(a.state.observed_at, 2);
        assert_eq!(a.state.remaining_volume, None);
        assert_eq!(a.history.len(), 1);
    }

    #[test]
    fn empty_or_failed_cycle_preserves_state() {
        let mut session = MonitorSession::default();
        session.apply_snapshot(
            &json!([{
                "bottle_id": "B7",
                "timestamp": 1_000,
                "remaining_volume": 240.0,
                "fill_h": 500.0,
                "infusion_rate": 2.0,
            }]),
            1_000,
        );
        let before = session.device("B7").unwrap().clone();

        let report = session.apply_snapshot(&json!({"detail": "not a list"}), 1_002);
        assert_eq!(report, MergeReport::default());
        session.apply_snapshot(&Value::Null, 1_004);
        session.apply_snapshot(&json!([]), 1_006);
        session.record_failure(&FeedError::Transport("connection refused".into()));

        assert_eq!(session.device("B7").unwrap(), &before);
        assert_eq!(session.connectivity(), Connectivity::Disconnected);
    }

    #[test]
    fn connectivity_follows_last_cycle() {
        let mut session = MonitorSession::default();
        assert_eq!(session.connectivity(), Connectivity::Disconnected);

        session.apply_snapshot(&json!([]), 10);
        assert!(session.connectivity().is_connected());
        assert_eq!(session.stats().last_success, Some(10));

        session.record_failure(&FeedError::Status(503));
        assert!(!session.connectivity().is_connected());
        assert_eq!(session.stats().failed_cycles, 1);
        assert_eq!(
            session.stats().last_error.as_deref(),
            Some("feed returned HTTP 503")
        );

        session.apply_snapshot(&json!([]), 12);
        assert!(session.connectivity().is_connected());
        assert_eq!(session.stats().ok_cycles, 2);
        assert_eq!(session.stats().last_error, None);
    }

    #[test]
    fn low_volume_detection() {
        let mut session = MonitorSession::default();
        session.merge(batch(vec![rec("A", 1, 300.0), rec("B", 1, 0.0)]));
        assert!(!session.any_low_volume());
        session.merge(batch(vec![rec("A", 2, 12.0)]));
        assert!(session.any_low_volume());
        assert!(session.snapshot().any_low_volume());
    }

    #[test]
    fn snapshot_is_detached_and_ordered() {
        let mut session = MonitorSession::default();
        session.merge(batch(vec![rec("C", 1, 1.0), rec("A", 1, 1.0), rec("B", 1, 1.0)]));
        let snap = session.snapshot();
        session.merge(batch(vec![rec("A", 9, 0.5)]));

        let ids: Vec<&str> = snap.devices.iter().map(|e| e.state.device_id.as_str()).collect();
        assert_eq!(ids, vec!["A", "B", "C"]);
        assert_eq!(snap.device("A").unwrap().state.observed_at, 1);
        assert_eq!(snap.views(1).len(), 3);
    }
}
