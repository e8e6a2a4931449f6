//! Bounded per-device trend history.

use std::collections::VecDeque;

use serde::Serialize;

use crate::record::DeviceState;

/// Default number of points retained per device.
pub const DEFAULT_HISTORY_CAPACITY: usize = 50;

/// One past observation of a device.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HistoryPoint {
    /// Epoch seconds.
    pub time: i64,
    pub remaining_volume: f64,
    pub infusion_rate: Option<f64>,
}

impl HistoryPoint {
    /// Point for a state, or `None` when the state carries no usable volume
    /// (absent, non-finite or negative).
    pub fn from_state(state: &DeviceState) -> Option<Self> {
        let volume = state.remaining_volume.filter(|v| v.is_finite() && *v >= 0.0)?;
        Some(Self {
            time: state.observed_at,
            remaining_volume: volume,
            infusion_rate: state.infusion_rate.filter(|r| r.is_finite()),
        })
    }
}

/// Which history value a chart series plots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryField {
    RemainingVolume,
    InfusionRate,
}

impl HistoryField {
    pub fn value_of(self, point: &HistoryPoint) -> Option<f64> {
        match self {
            Self::RemainingVolume => Some(point.remaining_volume),
            Self::InfusionRate => point.infusion_rate,
        }
    }
}

/// FIFO ring of [`HistoryPoint`]s: insertion-ordered, oldest evicted first,
/// never longer than its capacity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceHistory {
    points: VecDeque<HistoryPoint>,
    capacity: usize,
}

impl Default for DeviceHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl DeviceHistory {
    /// Empty history holding at most `capacity` points (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            points: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a point, then drop the oldest until within capacity.
    pub fn push(&mut self, point: HistoryPoint) {
        self.points.push_back(point);
        while self.points.len() > self.capacity {
            self.points.pop_front();
        }
    }

    /// Append the point for `state`. Returns `false` when the state has no
    /// usable volume and nothing was appended.
    ///
    /// Calling this twice for the same observation appends twice.
    pub fn append_from(&mut self, state: &DeviceState) -> bool {
        match HistoryPoint::from_state(state) {
            Some(point) => {
                self.push(point);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Oldest first.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &HistoryPoint> + ExactSizeIterator {
        self.points.iter()
    }

    /// Newest first, as shown in the history table.
    pub fn newest_first(&self) -> Vec<HistoryPoint> {
        self.points.iter().rev().copied().collect()
    }

    pub fn latest(&self) -> Option<&HistoryPoint> {
        self.points.back()
    }

    /// Chart series: `(minutes since start_time, value)` sorted by time, with
    /// values rounded to 0.1. Points lacking the field, or whose offset from
    /// `start_time` does not fit in an `i64`, are skipped.
    pub fn elapsed_series(&self, start_time: i64, field: HistoryField) -> Vec<(f64, f64)> {
        let mut series: Vec<(f64, f64)> = self
            .points
            .iter()
            .filter_map(|p| {
                let value = field.value_of(p)?;
                let minutes = p.time.checked_sub(start_time)? as f64 / 60.0;
                Some((minutes, round_tenth(value)))
            })
            .collect();
        series.sort_by(|a, b| a.0.total_cmp(&b.0));
        series
    }
}

fn round_tenth(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}
