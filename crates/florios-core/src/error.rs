//! Error types for the feed, ingestion and configuration.
//!
//! Nothing here is fatal to a running monitor: a [`FeedError`] abandons one
//! poll cycle, a [`RecordError`] drops one record, and a [`ConfigError`] is
//! only raised while the monitor is being set up.

use thiserror::Error;

/// Failure to obtain a snapshot from the telemetry feed.
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("feed returned HTTP {0}")]
    Status(u16),

    #[error("malformed payload: {0}")]
    Payload(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl FeedError {
    /// Whether the condition is expected to clear on its own (the next cycle
    /// may succeed without anything changing on our side).
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            FeedError::Transport(_) | FeedError::Status(_) | FeedError::Io(_)
        )
    }
}

impl From<reqwest::Error> for FeedError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => FeedError::Status(status.as_u16()),
            None => FeedError::Transport(e.to_string()),
        }
    }
}

/// Why a single element of a snapshot was skipped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error("record is not an object")]
    NotAnObject,

    #[error("missing device identifier")]
    MissingDeviceId,

    #[error("missing or non-numeric timestamp")]
    MissingTimestamp,

    #[error("field `{0}` is not numeric")]
    NonNumeric(&'static str),
}

/// Invalid monitor configuration.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("poll interval must be greater than zero")]
    ZeroInterval,

    #[error("history capacity must be at least one point")]
    ZeroCapacity,

    #[error("low-volume threshold must be a finite, non-negative volume (got {0})")]
    InvalidThreshold(f64),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_status_and_io_are_transient() {
        assert!(FeedError::Transport("connection refused".into()).is_transient());
        assert!(FeedError::Status(503).is_transient());
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert!(FeedError::Io(io).is_transient());
    }

    #[test]
    fn payload_error_is_not_transient() {
        assert!(!FeedError::Payload("expected value at line 1".into()).is_transient());
    }

    #[test]
    fn feed_error_display() {
        let e = FeedError::Status(502);
        assert_eq!(e.to_string(), "feed returned HTTP 502");
        let e = FeedError::Transport("timed out".into());
        assert!(e.to_string().contains("timed out"));
    }

    #[test]
    fn record_error_names_field() {
        let e = RecordError::NonNumeric("remaining_volume");
        assert_eq!(e.to_string(), "field `remaining_volume` is not numeric");
    }

    #[test]
    fn config_error_display() {
        let e = ConfigError::InvalidThreshold(-1.0);
        assert!(e.to_string().contains("-1"));
    }
}
