//! # florios-core
//!
//! **Live infusion-bottle telemetry, reconciled.**
//!
//! `florios-core` turns repeated snapshots of an infusion telemetry feed into
//! a consistent per-bottle view: latest state, a bounded trend history, and
//! derived display metrics (fill percentage, urgency color, time remaining,
//! elapsed time).
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use florios_core::{HttpSource, MonitorSession, Poller, lock_session, shared};
//!
//! let session = shared(MonitorSession::default());
//! let source = HttpSource::new("http://localhost:8000/api/data/").unwrap();
//! let poller = Poller::spawn(
//!     Box::new(source),
//!     Arc::clone(&session),
//!     std::time::Duration::from_secs(2),
//! )
//! .unwrap();
//!
//! let snapshot = lock_session(&session).snapshot();
//! for view in snapshot.views(chrono::Utc::now().timestamp()) {
//!     println!("{} {:?}% {}", view.device_id, view.percentage, view.time_remaining);
//! }
//! poller.stop();
//! ```
//!
//! ## Architecture
//!
//! Source → ingest (latest per device) → session merge → history + metrics
//!
//! Every feed implements [`TelemetrySource`]. The [`Poller`] runs one
//! fetch-and-merge cycle per interval on its own thread; readers take
//! [`SessionSnapshot`]s under a short lock.

pub mod config;
pub mod error;
pub mod history;
pub mod ingest;
pub mod metrics;
pub mod poller;
pub mod record;
pub mod session;
pub mod source;

pub use config::{DEFAULT_LOW_VOLUME_THRESHOLD, DEFAULT_POLL_INTERVAL, MonitorConfig};
pub use error::{ConfigError, FeedError, RecordError};
pub use history::{DEFAULT_HISTORY_CAPACITY, DeviceHistory, HistoryField, HistoryPoint};
pub use ingest::{LatestRecords, ingest, latest_per_device, parse_record};
pub use metrics::{
    DeviceView, NO_DATA, Rgb, elapsed_display, format_clock, format_minutes,
    format_time_remaining, low_volume_alert, percentage, rate_display, time_remaining_display,
    urgency_color,
};
pub use poller::{Poller, PollerHandle, SharedSession, lock_session, poll_once, shared};
pub use record::{DeviceId, DeviceState, TelemetryRecord};
pub use session::{
    Connectivity, CycleStats, DeviceEntry, MergeReport, MonitorSession, SessionSnapshot,
};
pub use source::{DEFAULT_HTTP_TIMEOUT, FileSource, HttpSource, TelemetrySource};

/// Library version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
