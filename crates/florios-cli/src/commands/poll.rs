//! `florios poll`: one cycle printed as JSON.

use florios_core::{MonitorSession, lock_session, poll_once, shared};

use super::FeedArgs;

/// Run the poll command: one fetch-and-merge cycle, printed as the derived model.
pub fn run(feed: &FeedArgs) {
    let (config, source) = super::setup(feed);
    let session = shared(MonitorSession::new(config));

    if let Err(e) = poll_once(&*source, &session) {
        eprintln!("Poll failed: {e}");
        std::process::exit(1);
    }

    let snapshot = lock_session(&session).snapshot();
    let now = chrono::Utc::now().timestamp();
    let devices: Vec<serde_json::Value> = snapshot
        .devices
        .iter()
        .map(|entry| {
            serde_json::json!({
                "state": entry.state,
                "view": snapshot.view(entry, now),
                "history": entry.history.newest_first(),
            })
        })
        .collect();

    let json = serde_json::json!({
        "source": source.name(),
        "connectivity": snapshot.connectivity,
        "low_volume": snapshot.any_low_volume(),
        "devices": devices,
    });

    match serde_json::to_string_pretty(&json) {
        Ok(s) => println!("{s}"),
        Err(e) => {
            eprintln!("Error encoding output: {e}");
            std::process::exit(1);
        }
    }
}
