//! Monitor configuration.

use std::time::Duration;

use crate::error::ConfigError;
use crate::history::DEFAULT_HISTORY_CAPACITY;

/// Default time between poll cycles.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Default low-volume alert threshold, in ml.
pub const DEFAULT_LOW_VOLUME_THRESHOLD: f64 = 20.0;

/// Settings shared by the poll scheduler, the session and the presentation
/// layers.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorConfig {
    /// Time between the starts of consecutive poll cycles.
    pub poll_interval: Duration,
    /// Maximum points retained per device history.
    pub history_capacity: usize,
    /// Remaining volume (ml) below which a non-empty bottle is flagged.
    pub low_volume_threshold: f64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            low_volume_threshold: DEFAULT_LOW_VOLUME_THRESHOLD,
        }
    }
}

impl MonitorConfig {
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self
    }

    pub fn with_low_volume_threshold(mut self, threshold: f64) -> Self {
        self.low_volume_threshold = threshold;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval.is_zero() {
            return Err(ConfigError::ZeroInterval);
        }
        if self.history_capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if !self.low_volume_threshold.is_finite() || self.low_volume_threshold < 0.0 {
            return Err(ConfigError::InvalidThreshold(self.low_volume_threshold));
        }
        Ok(())
    }
}
