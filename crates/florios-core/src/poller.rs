//! Poll scheduler: fetch-and-merge cycles on a fixed interval.
//!
//! One background thread runs every cycle, so merges are serialized by
//! construction. A failed fetch flips connectivity and leaves device state
//! alone; the next tick retries with no backoff and no retry limit.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::error::FeedError;
use crate::session::{MergeReport, MonitorSession};
use crate::source::TelemetrySource;

/// Session shared between the poller and its readers.
pub type SharedSession = Arc<Mutex<MonitorSession>>;

pub fn shared(session: MonitorSession) -> SharedSession {
    Arc::new(Mutex::new(session))
}

/// Lock a session, recovering the data if a previous holder panicked.
pub fn lock_session(session: &Mutex<MonitorSession>) -> MutexGuard<'_, MonitorSession> {
    match session.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn now_epoch() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Run one cycle: fetch outside the lock, merge under it.
pub fn poll_once<S>(source: &S, session: &Mutex<MonitorSession>) -> Result<MergeReport, FeedError>
where
    S: TelemetrySource + ?Sized,
{
    let fetched = source.fetch();
    let mut guard = lock_session(session);
    match fetched {
        Ok(payload) => {
            let report = guard.apply_snapshot(&payload, now_epoch());
            if report.changed() > 0 {
                info!(
                    "{}: {} new, {} updated, {} stale ({} devices)",
                    source.name(),
                    report.created,
                    report.updated,
                    report.stale,
                    guard.len()
                );
            } else {
                debug!("{}: no new observations", source.name());
            }
            Ok(report)
        }
        Err(e) => {
            guard.record_failure(&e);
            warn!("{}: poll failed: {e}", source.name());
            Err(e)
        }
    }
}

enum Control {
    Refresh,
    Stop,
}

/// Background poll loop.
pub struct Poller;

impl Poller {
    /// Start polling: one cycle immediately, then one every `interval`.
    ///
    /// If a cycle takes longer than `interval` the next one starts as soon as
    /// it returns; cycles never overlap.
    pub fn spawn(
        source: Box<dyn TelemetrySource>,
        session: SharedSession,
        interval: Duration,
    ) -> std::io::Result<PollerHandle> {
        let (tx, rx) = mpsc::channel::<Control>();
        let paused = Arc::new(AtomicBool::new(false));
        let thread_paused = Arc::clone(&paused);

        let thread = thread::Builder::new()
            .name("florios-poller".into())
            .spawn(move || {
                info!("polling {} every {:?}", source.name(), interval);
                loop {
                    let started = Instant::now();
                    if !thread_paused.load(Ordering::Relaxed) {
                        let _ = poll_once(&*source, &session);
                    }
                    let wait = interval.saturating_sub(started.elapsed());
                    match rx.recv_timeout(wait) {
                        Ok(Control::Refresh) | Err(RecvTimeoutError::Timeout) => {}
                        Ok(Control::Stop) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                debug!("poller for {} stopped", source.name());
            })?;

        Ok(PollerHandle {
            tx,
            paused,
            thread: Some(thread),
        })
    }
}

/// Controls a running [`Poller`]. Dropping the handle stops the thread.
pub struct PollerHandle {
    tx: Sender<Control>,
    paused: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl PollerHandle {
    /// Run a cycle now instead of waiting for the next tick.
    pub fn refresh(&self) {
        let _ = self.tx.send(Control::Refresh);
    }

    /// Skip cycles while paused. The timer keeps ticking.
    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::Relaxed);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }

    /// Stop the poll thread and wait for an in-flight cycle to finish.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let _ = self.tx.send(Control::Stop);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
