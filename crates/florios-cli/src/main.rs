//! CLI for florios: live infusion bottle monitoring.

mod commands;
mod tui;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use commands::FeedArgs;

#[derive(Parser)]
#[command(name = "florios")]
#[command(about = "florios: live infusion bottle monitoring")]
#[command(version = florios_core::VERSION)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive dashboard: device table, trend chart, history, alerts
    Monitor {
        #[command(flatten)]
        feed: FeedArgs,

        /// Directory for snapshot exports (s key)
        #[arg(long, default_value = ".")]
        export_dir: PathBuf,
    },

    /// Poll headless and log every cycle until Ctrl+C
    Watch {
        #[command(flatten)]
        feed: FeedArgs,
    },

    /// Run a single poll cycle and print the derived model as JSON
    Poll {
        #[command(flatten)]
        feed: FeedArgs,
    },

    /// Poll in the background and serve the session over HTTP
    Serve {
        #[command(flatten)]
        feed: FeedArgs,

        /// Port to listen on
        #[arg(long, default_value = "8042")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },
}

fn main() {
    let cli = Cli::parse();

    // The dashboard owns the terminal, so it runs without a logger.
    if !matches!(cli.command, Commands::Monitor { .. }) {
        commands::init_logging();
    }

    match cli.command {
        Commands::Monitor { feed, export_dir } => commands::monitor::run(&feed, export_dir),
        Commands::Watch { feed } => commands::watch::run(&feed),
        Commands::Poll { feed } => commands::poll::run(&feed),
        Commands::Serve { feed, port, host } => commands::serve::run(&feed, &host, port),
    }
}
