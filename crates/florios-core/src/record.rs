//! Telemetry records and the latest-wins per-device state derived from them.

use serde::Serialize;

/// Stable identifier of one monitored bottle.
pub type DeviceId = String;

/// One element of a poll response: a single device at a single instant.
///
/// Serializes with the feed's field names so exported records can be fed back
/// through [`crate::ingest::ingest`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryRecord {
    #[serde(rename = "bottle_id")]
    pub device_id: DeviceId,
    /// Epoch seconds.
    #[serde(rename = "timestamp")]
    pub observed_at: i64,
    pub current_level: Option<f64>,
    pub remaining_volume: Option<f64>,
    #[serde(rename = "fill_h")]
    pub fill_capacity: Option<f64>,
    /// ml/min. Only the magnitude is meaningful for display.
    pub infusion_rate: Option<f64>,
    /// Seconds until empty, as estimated by the feed.
    #[serde(rename = "time_remaining")]
    pub time_remaining_hint: Option<f64>,
    /// 0-100, as reported by the feed.
    #[serde(rename = "current_percentage")]
    pub current_percentage_hint: Option<f64>,
}

impl TelemetryRecord {
    /// A record with only the identity fields set.
    pub fn new(device_id: impl Into<DeviceId>, observed_at: i64) -> Self {
        Self {
            device_id: device_id.into(),
            observed_at,
            current_level: None,
            remaining_volume: None,
            fill_capacity: None,
            infusion_rate: None,
            time_remaining_hint: None,
            current_percentage_hint: None,
        }
    }

    pub fn with_remaining_volume(mut self, ml: f64) -> Self {
        self.remaining_volume = Some(ml);
        self
    }

    pub fn with_current_level(mut self, ml: f64) -> Self {
        self.current_level = Some(ml);
        self
    }

    pub fn with_fill_capacity(mut self, ml: f64) -> Self {
        self.fill_capacity = Some(ml);
        self
    }

    pub fn with_infusion_rate(mut self, ml_per_min: f64) -> Self {
        self.infusion_rate = Some(ml_per_min);
        self
    }

    pub fn with_time_remaining_hint(mut self, secs: f64) -> Self {
        self.time_remaining_hint = Some(secs);
        self
    }

    pub fn with_percentage_hint(mut self, pct: f64) -> Self {
        self.current_percentage_hint = Some(pct);
        self
    }
}

/// Latest known state of one device within a monitoring session.
///
/// `start_time` is the timestamp of the first record seen for the device and
/// never changes afterwards, so `start_time <= observed_at` always holds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceState {
    pub device_id: DeviceId,
    pub observed_at: i64,
    pub start_time: i64,
    pub current_level: Option<f64>,
    pub remaining_volume: Option<f64>,
    pub fill_capacity: Option<f64>,
    pub infusion_rate: Option<f64>,
    pub time_remaining_hint: Option<f64>,
    pub current_percentage_hint: Option<f64>,
}

impl DeviceState {
    /// State for a device seen for the first time.
    pub fn first_sighting(record: TelemetryRecord) -> Self {
        Self {
            start_time: record.observed_at,
            device_id: record.device_id,
            observed_at: record.observed_at,
            current_level: record.current_level,
            remaining_volume: record.remaining_volume,
            fill_capacity: record.fill_capacity,
            infusion_rate: record.infusion_rate,
            time_remaining_hint: record.time_remaining_hint,
            current_percentage_hint: record.current_percentage_hint,
        }
    }

    /// Replace the observed fields with `record` if it is strictly newer.
    ///
    /// Returns `false` (and changes nothing) for stale or duplicate records.
    pub fn advance(&mut self, record: TelemetryRecord) -> bool {
        if record.observed_at <= self.observed_at {
            return false;
        }
        self.observed_at = record.observed_at;
        self.current_level = record.current_level;
        self.remaining_volume = record.remaining_volume;
        self.fill_capacity = record.fill_capacity;
        self.infusion_rate = record.infusion_rate;
        self.time_remaining_hint = record.time_remaining_hint;
        self.current_percentage_hint = record.current_percentage_hint;
        true
    }
}
