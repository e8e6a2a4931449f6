//! `florios monitor`: interactive dashboard over the live session.

use std::path::PathBuf;

use florios_core::{MonitorSession, shared};

use super::FeedArgs;

/// Run the monitor command.
pub fn run(feed: &FeedArgs, export_dir: PathBuf) {
    let (config, source) = super::setup(feed);
    let session = shared(MonitorSession::new(config.clone()));
    let mut app =
        crate::tui::app::App::new(session, source.name(), config).with_export_dir(export_dir);
    if let Err(e) = app.run(source) {
        eprintln!("TUI error: {e}");
        std::process::exit(1);
    }
}
