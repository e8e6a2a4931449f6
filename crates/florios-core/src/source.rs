//! Telemetry feeds.
//!
//! Every feed implements [`TelemetrySource`]: a parameterless read that
//! returns the current full snapshot of all known devices as JSON. The core
//! never looks at how the snapshot was obtained.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::Value;

use crate::error::FeedError;

/// Default request timeout for [`HttpSource`].
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(5);

/// A read-only snapshot feed.
pub trait TelemetrySource: Send {
    /// Human-readable name (URL, path, ...).
    fn name(&self) -> &str;

    /// Fetch the current snapshot. Any error abandons the poll cycle.
    fn fetch(&self) -> Result<Value, FeedError>;
}

impl<T: TelemetrySource + ?Sized> TelemetrySource for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn fetch(&self) -> Result<Value, FeedError> {
        (**self).fetch()
    }
}

fn parse_body(body: &str) -> Result<Value, FeedError> {
    serde_json::from_str(body).map_err(|e| FeedError::Payload(e.to_string()))
}

// ---------------------------------------------------------------------------
// HTTP
// ---------------------------------------------------------------------------

/// GET a JSON snapshot over HTTP.
///
/// Uses a blocking client; it must live on a plain thread, not inside an
/// async runtime.
pub struct HttpSource {
    url: String,
    client: reqwest::blocking::Client,
}

impl HttpSource {
    pub fn new(url: impl Into<String>) -> Result<Self, FeedError> {
        Self::with_timeout(url, DEFAULT_HTTP_TIMEOUT)
    }

    pub fn with_timeout(url: impl Into<String>, timeout: Duration) -> Result<Self, FeedError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl TelemetrySource for HttpSource {
    fn name(&self) -> &str {
        &self.url
    }

    fn fetch(&self) -> Result<Value, FeedError> {
        let response = self
            .client
            .get(&self.url)
            // Tunnelled feeds otherwise answer with an HTML interstitial.
            .header("ngrok-skip-browser-warning", "true")
            .send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::Status(status.as_u16()));
        }
        let body = response.text()?;
        parse_body(&body)
    }
}

// ---------------------------------------------------------------------------
// File
// ---------------------------------------------------------------------------

/// Re-read a JSON snapshot file on every fetch.
pub struct FileSource {
    path: PathBuf,
    name: String,
}

impl FileSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let name = path.display().to_string();
        Self { path, name }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TelemetrySource for FileSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch(&self) -> Result<Value, FeedError> {
        let body = std::fs::read_to_string(&self.path)?;
        parse_body(&body)
    }
}
