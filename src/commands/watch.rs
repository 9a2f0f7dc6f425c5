//! `watch` (periodic loop) and `once` (single cycle) commands

use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{error, info, warn};

use swing_sentinel::cycle::SwingCycle;
use swing_sentinel::Config;

use super::{build_cycle, build_runtime, load_config, Overrides};

/// Run a single cycle and exit
pub fn run_once(overrides: Overrides) -> Result<()> {
    let config = load_config(&overrides)?;
    let runtime = build_runtime()?;

    runtime.block_on(async {
        let cycle = build_cycle(&config)?;
        let outcome = cycle.run_cycle().await.context("Cycle failed")?;
        println!("{}", outcome);
        Ok::<(), anyhow::Error>(())
    })
}

/// Run cycles forever, sleeping the configured interval between them
pub fn run(overrides: Overrides) -> Result<()> {
    let config = load_config(&overrides)?;
    let runtime = build_runtime()?;
    runtime.block_on(run_async(config))
}

async fn run_async(config: Config) -> Result<()> {
    info!("╔══════════════════════════════════════════════════════════════╗");
    info!("║                SWING SENTINEL - WATCH MODE                   ║");
    info!("╠══════════════════════════════════════════════════════════════╣");
    info!("║ Symbol: {:<52} ║", config.market.symbol);
    info!(
        "║ Timeframes: {:<48} ║",
        format!(
            "{} / {}",
            config.market.lower_timeframe, config.market.higher_timeframe
        )
    );
    info!("║ Journal: {:<51} ║", config.journal.path.display().to_string());
    info!("║ Cycle Interval: {:<44} ║", format!("{} seconds", config.schedule.interval_secs));
    info!("╚══════════════════════════════════════════════════════════════╝");

    let cycle = build_cycle(&config)?;

    let shutdown_flag = Arc::new(AtomicBool::new(false));
    let shutdown_flag_clone = shutdown_flag.clone();
    let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C, initiating shutdown...");
                shutdown_flag_clone.store(true, Ordering::SeqCst);
                let _ = shutdown_tx.send(()).await;
            }
            Err(e) => {
                error!("Error setting up signal handler: {}", e);
            }
        }
    });

    let pause = Duration::from_secs(config.schedule.interval_secs);
    let mut cycle_count: u64 = 0;

    info!("Starting watch loop...");

    loop {
        cycle_count += 1;
        run_guarded(&cycle, cycle_count).await;

        // a Ctrl+C during the cycle lets it finish, then stops here
        if shutdown_flag.load(Ordering::SeqCst) {
            break;
        }

        info!("Next cycle in {}s", pause.as_secs());
        tokio::select! {
            _ = sleep(pause) => {}
            _ = shutdown_rx.recv() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    info!("Watch loop ended after {} cycles.", cycle_count);
    Ok(())
}

/// Run one cycle, logging instead of propagating any failure
async fn run_guarded(cycle: &SwingCycle, cycle_count: u64) {
    match cycle.run_cycle().await {
        Ok(outcome) => info!("Cycle #{} done: {}", cycle_count, outcome),
        Err(e) if e.is_data_unavailable() => {
            warn!("Cycle #{} skipped, no state change: {}", cycle_count, e)
        }
        Err(e) => error!("Cycle #{} error: {}", cycle_count, e),
    }
}
