//! Command implementations

pub mod status;
pub mod watch;

use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::info;

use swing_sentinel::binance::BinanceClient;
use swing_sentinel::config::JournalBackend;
use swing_sentinel::cycle::SwingCycle;
use swing_sentinel::journal::open_journal;
use swing_sentinel::notify::build_notifier;
use swing_sentinel::Config;

/// Startup-only overrides from the command line
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub config: Option<PathBuf>,
    pub interval: Option<u64>,
    pub journal: Option<PathBuf>,
    pub journal_backend: Option<JournalBackend>,
}

/// Load the configuration once and apply command-line overrides
pub fn load_config(overrides: &Overrides) -> Result<Config> {
    let mut config = Config::load(overrides.config.as_deref())?;

    if let Some(path) = &overrides.config {
        info!("Loaded configuration from: {}", path.display());
    }

    if let Some(interval) = overrides.interval {
        info!("Overriding cycle interval to: {}s", interval);
        config.schedule.interval_secs = interval;
    }

    if let Some(path) = &overrides.journal {
        info!("Overriding journal path to: {}", path.display());
        config.journal.path = path.clone();
    }

    if let Some(backend) = overrides.journal_backend {
        info!("Overriding journal backend to: {:?}", backend);
        config.journal.backend = backend;
    }

    config.validate()?;
    Ok(config)
}

/// Wire the cycle to Binance, the configured journal and notifier
pub fn build_cycle(config: &Config) -> Result<SwingCycle> {
    let data = BinanceClient::new().context("Failed to create Binance client")?;
    let journal = open_journal(&config.journal).context("Failed to open journal")?;
    let notifier = build_notifier(&config.telegram);

    let cycle = SwingCycle::new(config, Box::new(data), journal, notifier)
        .context("Invalid risk parameters")?;
    Ok(cycle)
}

pub(crate) fn build_runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")
}
