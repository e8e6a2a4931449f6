//! Snapshot ingestion: one poll response in, one latest record per device out.
//!
//! The feed is loose about types (identifiers arrive as strings or integers,
//! numbers occasionally as strings), so records are read field by field from
//! a [`serde_json::Value`] rather than through a derived `Deserialize`. A bad
//! element is dropped on its own and never aborts the rest of the snapshot.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use chrono::{DateTime, NaiveDateTime};
use log::debug;
use serde_json::{Map, Value};

use crate::error::RecordError;
use crate::record::{DeviceId, TelemetryRecord};

/// Latest record per device for one snapshot, ordered by device id.
pub type LatestRecords = BTreeMap<DeviceId, TelemetryRecord>;

/// Textual timestamp format some feeds emit instead of epoch seconds.
///
/// These carry no offset and are read as UTC, so the stored instant does not
/// depend on the timezone of the machine running the monitor. Display layers
/// convert to local time with [`crate::metrics::format_clock`].
const TEXT_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Reduce a raw poll response to the latest record per device.
///
/// Anything other than a JSON array (including `null` for "no body") yields
/// an empty map: no data this cycle, which is not an error.
pub fn ingest(payload: &Value) -> LatestRecords {
    let Some(items) = payload.as_array() else {
        debug!("snapshot is not an array, treating as empty");
        return LatestRecords::new();
    };

    let records = items.iter().enumerate().filter_map(|(i, item)| {
        match parse_record(item) {
            Ok(record) => Some(record),
            Err(e) => {
                debug!("skipping snapshot element {i}: {e}");
                None
            }
        }
    });
    latest_per_device(records)
}

/// Fold parsed records into one per device, keeping the greatest
/// `observed_at`. On equal timestamps the later record in iteration order
/// wins.
pub fn latest_per_device<I>(records: I) -> LatestRecords
where
    I: IntoIterator<Item = TelemetryRecord>,
{
    let mut latest = LatestRecords::new();
    for record in records {
        match latest.entry(record.device_id.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(record);
            }
            Entry::Occupied(mut slot) => {
                if record.observed_at >= slot.get().observed_at {
                    slot.insert(record);
                }
            }
        }
    }
    latest
}

/// Parse one snapshot element.
pub fn parse_record(item: &Value) -> Result<TelemetryRecord, RecordError> {
    let obj = item.as_object().ok_or(RecordError::NotAnObject)?;

    let device_id = device_id(obj).ok_or(RecordError::MissingDeviceId)?;
    let observed_at = timestamp(obj).ok_or(RecordError::MissingTimestamp)?;

    Ok(TelemetryRecord {
        device_id,
        observed_at,
        current_level: number(obj, "current_level")?,
        remaining_volume: number(obj, "remaining_volume")?,
        fill_capacity: number(obj, "fill_h")?,
        infusion_rate: number(obj, "infusion_rate")?,
        time_remaining_hint: number(obj, "time_remaining")?,
        current_percentage_hint: number(obj, "current_percentage")?,
    })
}

fn device_id(obj: &Map<String, Value>) -> Option<DeviceId> {
    match obj.get("bottle_id")? {
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() { None } else { Some(s.to_string()) }
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn timestamp(obj: &Map<String, Value>) -> Option<i64> {
    let secs = match obj.get("timestamp")? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => {
            let s = s.trim();
            match s.parse::<f64>() {
                Ok(v) => v,
                Err(_) => {
                    return NaiveDateTime::parse_from_str(s, TEXT_TIMESTAMP_FORMAT)
                        .ok()
                        .map(|dt| dt.and_utc().timestamp());
                }
            }
        }
        _ => return None,
    };
    if !secs.is_finite() {
        return None;
    }
    // Saturated casts land outside chrono's range and are rejected there.
    DateTime::from_timestamp(secs.floor() as i64, 0).map(|dt| dt.timestamp())
}

/// Optional numeric field. Absent and `null` are `Ok(None)`; a value that is
/// present but not a finite number rejects the whole record.
fn number(obj: &Map<String, Value>, key: &'static str) -> Result<Option<f64>, RecordError> {
    let v = match obj.get(key) {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(_) => None,
    };
    match v {
        Some(v) if v.is_finite() => Ok(Some(v)),
        _ => Err(RecordError::NonNumeric(key)),
    }
}
