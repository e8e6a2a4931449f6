//! `florios watch`: headless polling that logs every cycle.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use log::{info, warn};

use florios_core::{MonitorSession, Poller, lock_session, shared};

use super::FeedArgs;

/// Run the watch command.
pub fn run(feed: &FeedArgs) {
    let (config, source) = super::setup(feed);
    let session = shared(MonitorSession::new(config.clone()));

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    }) {
        warn!("cannot install Ctrl+C handler: {e}");
    }

    let poller = match Poller::spawn(source, Arc::clone(&session), config.poll_interval) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error starting poller: {e}");
            std::process::exit(1);
        }
    };

    let mut seen_cycles = 0u64;
    while running.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(100));

        let snapshot = lock_session(&session).snapshot();
        let cycles = snapshot.stats.ok_cycles + snapshot.stats.failed_cycles;
        if cycles == seen_cycles || !snapshot.connectivity.is_connected() {
            seen_cycles = cycles;
            continue;
        }
        seen_cycles = cycles;

        let now = chrono::Utc::now().timestamp();
        for view in snapshot.views(now) {
            let pct = view
                .percentage
                .map(|p| format!("{p:.0}%"))
                .unwrap_or_else(|| florios_core::NO_DATA.to_string());
            let line = format!(
                "{}  {pct:>5}  rate {}  left {}  elapsed {}",
                view.device_id, view.rate, view.time_remaining, view.elapsed
            );
            if view.low_volume {
                warn!("{line}  LOW VOLUME");
            } else {
                info!("{line}");
            }
        }
    }

    poller.stop();
    info!("stopped after {seen_cycles} cycles");
}
