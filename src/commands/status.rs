//! `status` command: show what the journal currently says

use anyhow::{Context, Result};
use tracing::info;

use swing_sentinel::journal::open_journal;
use swing_sentinel::PositionStatus;

use super::{load_config, Overrides};

pub fn run(overrides: Overrides) -> Result<()> {
    let config = load_config(&overrides)?;
    let journal = open_journal(&config.journal).context("Failed to open journal")?;

    let positions = journal.positions().context("Failed to read journal")?;
    let closed = positions
        .iter()
        .filter(|p| p.status == PositionStatus::ClosedByStop)
        .count();
    info!("Journal holds {} positions ({} closed)", positions.len(), closed);

    println!("\n{}", "=".repeat(60));
    println!("POSITION STATUS - {}", config.market.symbol);
    println!("{}", "=".repeat(60));

    match journal.find_latest_open_position()? {
        Some(p) => {
            println!("Status:            {}", p.status);
            println!("Opened:            {}", p.opened_at.format("%Y-%m-%d %H:%M:%S"));
            println!("Entry Price:       {:.2}", p.entry_price);
            println!("Initial Stop:      {:.2}", p.initial_stop);
            println!("Current Stop:      {:.2}", p.current_stop);
            println!("Size:              {:.8}", p.size);
            println!("Risk Budget:       {:.2}", p.risk_budget);
            println!(
                "Locked-in P&L:     {:.2}",
                p.unrealized_pnl(p.current_stop)
            );
        }
        None => println!("Flat: no open position"),
    }

    println!("Closed positions:  {}", closed);
    println!("{}", "=".repeat(60));
    Ok(())
}
