use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

mod dispatch;
mod host;
mod render;

use dispatch::run_cli;

#[derive(Parser, Debug)]
#[command(name = "livepush")]
#[command(
    about = "Live-update client for web bundles, driven from the command line",
    long_about = None
)]
struct Cli {
    /// Storage root holding the update ledger and downloaded packages.
    #[arg(long, default_value = ".")]
    root: PathBuf,
    #[arg(long, default_value = "livepush.toml")]
    config: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show the configured deployment settings.
    Config,
    /// Verify a signed release attestation and print its content hash.
    Verify {
        token: PathBuf,
        #[arg(long)]
        public_key: Option<PathBuf>,
    },
    PackageHash {
        path: String,
    },
    BinaryHash,
    Unzip {
        archive: PathBuf,
        target: PathBuf,
    },
    /// Stage a downloaded archive and record it as the current pending package.
    Deploy {
        archive: PathBuf,
        #[arg(long)]
        label: String,
        #[arg(long)]
        package_hash: String,
        #[arg(long)]
        app_version: Option<String>,
        #[arg(long)]
        deployment_key: Option<String>,
    },
    Install {
        start_location: String,
        #[arg(long, default_value = "on_next_restart")]
        mode: String,
        #[arg(long, default_value_t = 0)]
        minimum_background_duration: u64,
    },
    PreInstall {
        start_location: String,
    },
    IsFailedUpdate {
        package_hash: String,
    },
    /// Submit the outcome of a status report send.
    Report {
        #[arg(value_enum)]
        outcome: ReportOutcome,
        /// JSON status report.
        report: PathBuf,
    },
    Status,
    /// Run lifecycle events in one process: start, resume, pause, ready, destroy,
    /// restart, page-loaded, sleep=<secs>.
    Run {
        #[arg(required = true)]
        events: Vec<String>,
    },
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum ReportOutcome {
    Succeeded,
    Failed,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    run_cli(cli).await
}
