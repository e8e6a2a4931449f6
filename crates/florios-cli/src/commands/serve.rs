//! `florios serve`: background poller behind the HTTP view.

use std::sync::Arc;

use florios_core::{MonitorSession, Poller, shared};

use super::FeedArgs;

/// Run the serve command.
pub fn run(feed: &FeedArgs, host: &str, port: u16) {
    let (config, source) = super::setup(feed);
    let source_name = source.name().to_string();
    let session = shared(MonitorSession::new(config.clone()));

    let base = format!("http://{host}:{port}");
    println!("💧 Florios Server v{}", florios_core::VERSION);
    println!("   {base}");
    println!("   polling {source_name} every {:?}", config.poll_interval);
    println!();
    println!("   Endpoints:");
    println!("     GET /                       API index (try: curl {base})");
    println!("     GET /health                 Connectivity and cycle counters");
    println!("     GET /devices                Latest state and metrics per device");
    println!("     GET /devices/{{id}}           One device");
    println!("     GET /devices/{{id}}/history   Trend history, newest first");
    println!();

    // The feed client is blocking, so polling stays on its own thread.
    let poller = match Poller::spawn(source, Arc::clone(&session), config.poll_interval) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error starting poller: {e}");
            std::process::exit(1);
        }
    };

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error starting runtime: {e}");
            std::process::exit(1);
        }
    };
    let result = rt.block_on(florios_server::run_server(session, host, port));
    poller.stop();

    if let Err(e) = result {
        eprintln!("Server error on {host}:{port}: {e}");
        std::process::exit(1);
    }
}
