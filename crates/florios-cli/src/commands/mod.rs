pub mod monitor;
pub mod poll;
pub mod serve;
pub mod watch;

use std::path::PathBuf;
use std::time::Duration;

use clap::Args;

use florios_core::{
    ConfigError, DEFAULT_HISTORY_CAPACITY, DEFAULT_LOW_VOLUME_THRESHOLD, FileSource, HttpSource,
    MonitorConfig, TelemetrySource,
};

/// Environment variable read when neither `--url` nor `--file` is given.
pub const FEED_URL_ENV: &str = "FLORIOS_URL";

/// Feed selection and monitor tuning shared by every command.
#[derive(Args, Debug, Clone)]
pub struct FeedArgs {
    /// Telemetry endpoint to poll (falls back to $FLORIOS_URL)
    #[arg(long, conflicts_with = "file")]
    pub url: Option<String>,

    /// Poll a JSON snapshot file instead of an HTTP endpoint
    #[arg(long)]
    pub file: Option<PathBuf>,

    /// Seconds between poll cycles
    #[arg(long, default_value = "2")]
    pub interval: f64,

    /// Points retained per device history
    #[arg(long, default_value_t = DEFAULT_HISTORY_CAPACITY)]
    pub history: usize,

    /// Remaining volume (ml) below which a bottle is flagged
    #[arg(long, default_value_t = DEFAULT_LOW_VOLUME_THRESHOLD)]
    pub low_threshold: f64,

    /// HTTP request timeout in seconds
    #[arg(long, default_value = "5")]
    pub timeout: f64,
}

fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::ZERO)
}

/// Build and validate the monitor configuration from the command line.
pub fn make_config(args: &FeedArgs) -> Result<MonitorConfig, ConfigError> {
    let config = MonitorConfig::default()
        .with_poll_interval(secs(args.interval))
        .with_history_capacity(args.history)
        .with_low_volume_threshold(args.low_threshold);
    config.validate()?;
    Ok(config)
}

/// Pick the feed: `--file`, then `--url`, then `$FLORIOS_URL`.
pub fn make_source(
    args: &FeedArgs,
    env_url: Option<String>,
) -> Result<Box<dyn TelemetrySource>, String> {
    if let Some(path) = &args.file {
        return Ok(Box::new(FileSource::new(path)));
    }
    let url = args
        .url
        .clone()
        .or(env_url)
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .ok_or_else(|| format!("no feed given: pass --url, --file or set {FEED_URL_ENV}"))?;

    let timeout = secs(args.timeout);
    let timeout = if timeout.is_zero() {
        florios_core::DEFAULT_HTTP_TIMEOUT
    } else {
        timeout
    };
    HttpSource::with_timeout(url, timeout)
        .map(|s| Box::new(s) as Box<dyn TelemetrySource>)
        .map_err(|e| format!("cannot create HTTP client: {e}"))
}

/// Config and source for a command, or exit with status 1.
pub fn setup(args: &FeedArgs) -> (MonitorConfig, Box<dyn TelemetrySource>) {
    let config = match make_config(args) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Invalid configuration: {e}");
            std::process::exit(1);
        }
    };
    let source = match make_source(args, std::env::var(FEED_URL_ENV).ok()) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };
    (config, source)
}

/// `env_logger` on stderr, `info` unless `RUST_LOG` says otherwise.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();
}
