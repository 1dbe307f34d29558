//! facetrack — face-tracking camera recorder.

mod app;
mod config;

use clap::{Parser, Subcommand};
use config::Config;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "facetrack", version, about = "Face-tracking camera recorder")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Record from the camera with the face-tracking overlay
    Record {
        /// Stop automatically after this many seconds instead of on Ctrl-C
        #[arg(short, long)]
        duration: Option<u64>,
    },
    /// List stored recordings
    List,
    /// Write a recording to a playable file
    Download {
        /// Recording id (see `list`)
        id: String,
        /// Output directory (default: current directory)
        #[arg(short, long)]
        out: Option<std::path::PathBuf>,
    },
    /// Delete a recording
    Delete {
        /// Recording id (see `list`)
        id: String,
    },
    /// Enumerate video capture devices
    Devices,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();

    match cli.command {
        Command::Record { duration } => app::record(&config, duration).await,
        Command::List => app::list(&config),
        Command::Download { id, out } => app::download(&config, id.as_str(), out),
        Command::Delete { id } => app::delete(&config, id.as_str()),
        Command::Devices => app::devices(),
    }
}
