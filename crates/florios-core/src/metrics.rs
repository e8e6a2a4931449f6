//! Derived presentation values. Every function here is pure.
//!
//! | Value          | Source                                         |
//! |----------------|------------------------------------------------|
//! | percentage     | feed hint, else remaining / capacity           |
//! | urgency color  | red → yellow → green over the percentage       |
//! | time remaining | feed hint, else remaining / rate               |
//! | rate           | magnitude of the flow, one decimal             |
//! | low volume     | `0 < remaining < threshold`                    |

use std::fmt;

use chrono::{DateTime, TimeZone};
use serde::Serialize;

use crate::record::{DeviceId, DeviceState};

/// Rates below this magnitude (ml/min) are sensor noise.
pub const RATE_NOISE_FLOOR: f64 = 0.01;

/// Placeholder shown when a value cannot be derived.
pub const NO_DATA: &str = "--";

/// An 8-bit RGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const RED: Rgb = Rgb::new(239, 68, 68);
    pub const YELLOW: Rgb = Rgb::new(234, 180, 8);
    pub const GREEN: Rgb = Rgb::new(34, 197, 94);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rgb({}, {}, {})", self.r, self.g, self.b)
    }
}

/// Percentage remaining: the feed's hint when present, otherwise
/// `round(remaining / capacity * 100)`. A hint of 0 is a real reading and is
/// returned as is. Not clamped.
pub fn percentage(state: &DeviceState) -> Option<f64> {
    if let Some(hint) = state.current_percentage_hint {
        return Some(hint);
    }
    let remaining = state.remaining_volume?;
    let capacity = state.fill_capacity.filter(|c| *c != 0.0)?;
    let pct = (remaining / capacity * 100.0).round();
    pct.is_finite().then_some(pct)
}

/// Two-segment gradient: red at 0%, yellow at 50%, green at 100%.
/// The input is clamped to [0, 100]; NaN is treated as 0.
pub fn urgency_color(pct: f64) -> Rgb {
    let pct = if pct.is_nan() { 0.0 } else { pct.clamp(0.0, 100.0) };
    if pct >= 50.0 {
        let ratio = (pct - 50.0) / 50.0;
        blend(Rgb::GREEN, Rgb::YELLOW, ratio)
    } else {
        let ratio = pct / 50.0;
        blend(Rgb::YELLOW, Rgb::RED, ratio)
    }
}

/// `to` at ratio 1, `from` at ratio 0, each channel rounded on its own.
fn blend(to: Rgb, from: Rgb, ratio: f64) -> Rgb {
    let channel = |to: u8, from: u8| -> u8 {
        let (to, from) = (to as f64, from as f64);
        (to + (from - to) * (1.0 - ratio)).round() as u8
    };
    Rgb::new(
        channel(to.r, from.r),
        channel(to.g, from.g),
        channel(to.b, from.b),
    )
}

/// `"{h}h {m}m"` from one hour up, `"{m}m"` below.
pub fn format_minutes(total_minutes: u64) -> String {
    let hours = total_minutes / 60;
    if hours > 0 {
        format!("{hours}h {}m", total_minutes % 60)
    } else {
        format!("{total_minutes}m")
    }
}

/// Time until empty for a device.
pub fn time_remaining_display(state: &DeviceState) -> String {
    format_time_remaining(
        state.time_remaining_hint,
        state.remaining_volume,
        state.infusion_rate,
    )
}

/// Time until empty from a hint in seconds, falling back to
/// `volume / rate` (ml over ml/min).
pub fn format_time_remaining(
    hint_secs: Option<f64>,
    remaining_volume: Option<f64>,
    infusion_rate: Option<f64>,
) -> String {
    if let Some(secs) = hint_secs.filter(|s| s.is_finite() && *s > 0.0) {
        return format_minutes((secs / 60.0).floor() as u64);
    }

    let rate = infusion_rate.filter(|r| r.is_finite() && *r > 0.0);
    let volume = remaining_volume.filter(|v| v.is_finite() && *v > 0.0);
    match (volume, rate) {
        (Some(volume), Some(rate)) => {
            let minutes = volume / rate;
            if minutes < 1.0 {
                "< 1m".to_string()
            } else {
                format_minutes(minutes.floor() as u64)
            }
        }
        _ => NO_DATA.to_string(),
    }
}

/// Flow rate magnitude to one decimal, or `"--"` for no meaningful flow.
pub fn rate_display(infusion_rate: Option<f64>) -> String {
    match infusion_rate {
        Some(rate) if rate.is_finite() && rate.abs() >= RATE_NOISE_FLOOR => {
            format!("{:.1}", rate.abs())
        }
        _ => NO_DATA.to_string(),
    }
}

/// A bottle running low but not yet empty. An empty bottle is a separate
/// condition and is not flagged here.
pub fn low_volume_alert(state: &DeviceState, threshold: f64) -> bool {
    state
        .remaining_volume
        .is_some_and(|v| v > 0.0 && v < threshold)
}

/// Time since the first sighting of a device.
pub fn elapsed_display(start_time: i64, now: i64) -> String {
    let Some(secs) = now.checked_sub(start_time).filter(|d| *d >= 0) else {
        return NO_DATA.to_string();
    };
    let secs = secs as u64;
    if secs < 60 {
        "< 1m".to_string()
    } else {
        format_minutes(secs / 60)
    }
}

/// Wall-clock `HH:MM:SS` of an epoch-seconds timestamp in `tz`.
pub fn format_clock<Tz>(ts: i64, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    match DateTime::from_timestamp(ts, 0) {
        Some(dt) => dt.with_timezone(tz).format("%H:%M:%S").to_string(),
        None => NO_DATA.to_string(),
    }
}

/// Everything a presentation layer shows for one device, computed from a
/// single consistent state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceView {
    pub device_id: DeviceId,
    pub percentage: Option<f64>,
    pub color: Rgb,
    pub rate: String,
    pub time_remaining: String,
    pub elapsed: String,
    pub low_volume: bool,
}

impl DeviceView {
    /// A device without a computable percentage is colored as empty.
    pub fn derive(state: &DeviceState, low_volume_threshold: f64, now: i64) -> Self {
        let pct = percentage(state);
        Self {
            device_id: state.device_id.clone(),
            percentage: pct,
            color: urgency_color(pct.unwrap_or(0.0)),
            rate: rate_display(state.infusion_rate),
            time_remaining: time_remaining_display(state),
            elapsed: elapsed_display(state.start_time, now),
            low_volume: low_volume_alert(state, low_volume_threshold),
        }
    }
}
