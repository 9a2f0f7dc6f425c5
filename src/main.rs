//! Swing Sentinel - main entry point
//!
//! This binary provides three subcommands:
//! - watch: Run a decision cycle on a fixed interval (default)
//! - once: Run exactly one cycle and exit
//! - status: Show the journal's open position

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use swing_sentinel::config::JournalBackend;

mod commands;

#[derive(Parser, Debug)]
#[command(name = "swing-sentinel")]
#[command(about = "Swing-trading decision engine with trailing-stop tracking", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Seconds between the end of one cycle and the start of the next
    #[arg(long, global = true)]
    interval: Option<u64>,

    /// Journal file path
    #[arg(long, global = true)]
    journal: Option<PathBuf>,

    /// Journal backend
    #[arg(long, global = true, value_enum)]
    journal_backend: Option<JournalBackend>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Commands {
    /// Run cycles forever on the configured interval
    Watch,

    /// Run a single cycle and exit
    Once,

    /// Show the current position from the journal
    Status,
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Watch => "watch",
            Commands::Once => "once",
            Commands::Status => "status",
        }
    }
}

fn setup_logging(verbose: bool, command_name: &str) -> Result<()> {
    // Create logs directory
    std::fs::create_dir_all("logs")?;

    // Create log file with naming pattern: {command}_{date}.log
    let log_filename = format!(
        "{}_{}.log",
        command_name,
        chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
    );
    let log_path = PathBuf::from("logs").join(&log_filename);

    // Set log level - filter out noisy external crates
    let level = if verbose { "debug" } else { "info" };
    let filter_str = format!(
        "{},hyper=warn,hyper_util=warn,reqwest=warn,rustls=warn,h2=warn",
        level
    );
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter_str));

    let file_appender = tracing_appender::rolling::never("logs", &log_filename);

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_line_number(true)
        .with_ansi(true);

    // File layer - same format but without ANSI colors
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(file_appender)
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    info!("Logging initialized");
    info!("Log file: {}", log_path.display());

    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Watch);

    setup_logging(cli.verbose, command.name())?;

    let overrides = commands::Overrides {
        config: cli.config,
        interval: cli.interval,
        journal: cli.journal,
        journal_backend: cli.journal_backend,
    };

    match command {
        Commands::Watch => commands::watch::run(overrides),
        Commands::Once => commands::watch::run_once(overrides),
        Commands::Status => commands::status::run(overrides),
    }
}
