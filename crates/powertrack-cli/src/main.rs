//! powertrack - GNIP PowerTrack export CLI
//!
//! Creates and manages historical jobs, pages through the search API, and
//! downloads result files into a single CSV of located tweets.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use powertrack_core::{CancelToken, ProgressContext, SharedProgress};

mod cmd;
mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "powertrack")]
#[command(about = "Export geolocated tweets from GNIP PowerTrack to CSV")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Config file path (default: ./powertrack.toml or ~/.config/powertrack/config.toml)
    #[arg(short, long, global = true)]
    config: Option<std::path::PathBuf>,

    /// Output folder
    #[arg(short, long, global = true)]
    output: Option<std::path::PathBuf>,

    /// Read timeout in seconds for stall detection
    #[arg(long, global = true)]
    read_timeout: Option<u64>,

    /// Attempts per shard for transient failures (0 = unlimited)
    #[arg(long, global = true)]
    max_retries: Option<u32>,
}

#[derive(Subcommand)]
enum Command {
    /// Download result-file URLs into one CSV
    Export(cmd::export::ExportArgs),
    /// Manage historical jobs
    Jobs(cmd::jobs::JobsArgs),
    /// Export one search API query
    Search(cmd::search::SearchArgs),
    /// Run a category job from a category file
    Categories(cmd::categories::CategoriesArgs),
    /// Show current configuration
    Config,
}

/// Shared state handed to every subcommand
pub struct Ctx {
    pub config: Config,
    pub progress: SharedProgress,
    pub cancel: CancelToken,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Progress context (TTY auto-detect)
    let progress = Arc::new(ProgressContext::new());

    // Logging:
    //   TTY:     quiet (warn) unless --debug, progress bars show activity
    //   non-TTY: info unless --debug, logs are the only progress indicator
    let is_tty = progress.is_tty();
    let multi = if is_tty { Some(progress.multi()) } else { None };
    let quiet = if is_tty { !cli.debug } else { false };
    powertrack_core::init_logging(quiet, cli.debug, multi);

    match run(cli, progress) {
        Ok(code) => code,
        Err(e) => {
            log::error!("{e:#}");
            ExitCode::from(2)
        }
    }
}

fn run(cli: Cli, progress: SharedProgress) -> Result<ExitCode> {
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::load()?,
    };

    // CLI overrides config file
    if let Some(folder) = cli.output {
        config.output.folder = folder;
    }
    if let Some(secs) = cli.read_timeout {
        config.http.read_timeout = secs;
    }
    if let Some(n) = cli.max_retries {
        config.http.max_retries = n;
    }

    let cancel = CancelToken::new();
    setup_signal_handler(&cancel)?;

    let ctx = Ctx {
        config,
        progress,
        cancel,
    };

    match cli.command {
        Command::Export(args) => cmd::export::run(args, &ctx),
        Command::Jobs(args) => cmd::jobs::run(args, &ctx),
        Command::Search(args) => cmd::search::run(args, &ctx),
        Command::Categories(args) => cmd::categories::run(args, &ctx),
        Command::Config => {
            cmd::print_config(&ctx.config);
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// First SIGINT/SIGTERM cancels the token; a second one exits with 130.
fn setup_signal_handler(cancel: &CancelToken) -> Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::flag;

    let stop = cancel.flag();
    for sig in [SIGINT, SIGTERM] {
        // Registered first so it sees the flag before this signal sets it
        flag::register_conditional_shutdown(sig, 130, stop.clone())?;
        flag::register(sig, stop.clone())?;
    }
    Ok(())
}
