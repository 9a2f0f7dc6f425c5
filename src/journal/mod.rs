//! Position journal
//!
//! The journal is the source of truth for "is there an open position". The
//! cycle rehydrates from it at start and writes every state change back
//! before notifying. Two backends share the [`Journal`] contract: a flat CSV
//! file readable in a spreadsheet, and a SQLite database.

mod csv;
mod sqlite;

pub use self::csv::CsvJournal;
pub use self::sqlite::SqliteJournal;

use thiserror::Error;
use tracing::info;

use crate::config::{JournalBackend, JournalConfig};
use crate::{Position, PositionStatus};

#[derive(Debug, Error)]
pub enum JournalError {
    #[error("journal I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("journal CSV error: {0}")]
    Csv(#[from] ::csv::Error),

    #[error("journal database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("corrupt journal record {record}: {reason}")]
    Corrupt { record: usize, reason: String },

    #[error("no open position to update")]
    NoOpenPosition,
}

/// Append-mostly record store of positions
pub trait Journal: Send + Sync {
    /// Record a freshly opened position
    fn append_new_position(&self, position: &Position) -> Result<(), JournalError>;

    /// The most recent record whose status is OPEN
    fn find_latest_open_position(&self) -> Result<Option<Position>, JournalError>;

    /// Update stop and status of the most recent OPEN record
    fn update_latest_open_position(
        &self,
        current_stop: f64,
        status: PositionStatus,
    ) -> Result<(), JournalError>;

    /// Every record, oldest first
    fn positions(&self) -> Result<Vec<Position>, JournalError>;
}

/// Open the configured backend, creating the store if needed
pub fn open_journal(config: &JournalConfig) -> Result<Box<dyn Journal>, JournalError> {
    let journal: Box<dyn Journal> = match config.backend {
        JournalBackend::Csv => Box::new(CsvJournal::new(&config.path)?),
        JournalBackend::Sqlite => Box::new(SqliteJournal::open(&config.path)?),
    };
    info!(
        "Journal: {:?} backend at {}",
        config.backend,
        config.path.display()
    );
    Ok(journal)
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Prices and money are journaled to the cent
pub(crate) fn round_price(value: f64) -> f64 {
    round_to(value, 2)
}

/// Stops are floored to the cent so a stored stop never rises above the
/// computed one. The epsilon absorbs representation error such as
/// `100.29 * 100.0 == 10028.999999999998`.
pub(crate) fn round_stop(value: f64) -> f64 {
    ((value * 100.0) + 1e-6).floor() / 100.0
}

pub(crate) fn round_size(value: f64) -> f64 {
    round_to(value, 8)
}
