// SQLite journal backend
// One row per position in a `positions` table; "latest" means highest id.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use super::{Journal, JournalError};
use crate::{Position, PositionStatus, Side};

const COLUMNS: &str = "opened_at, side, entry_price, initial_stop, current_stop, target_price, \
                       position_size, risk_budget, theoretical_loss, status";

pub struct SqliteJournal {
    conn: Mutex<Connection>,
}

impl SqliteJournal {
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self, JournalError> {
        let db_path = db_path.as_ref();

        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(db_path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        let journal = Self::from_connection(conn)?;
        info!("SQLite journal opened at {}", db_path.display());
        Ok(journal)
    }

    pub fn open_in_memory() -> Result<Self, JournalError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, JournalError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS positions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                opened_at TEXT NOT NULL,
                side TEXT NOT NULL,
                entry_price REAL NOT NULL,
                initial_stop REAL NOT NULL,
                current_stop REAL NOT NULL,
                target_price REAL,
                position_size REAL NOT NULL,
                risk_budget REAL NOT NULL,
                theoretical_loss REAL NOT NULL,
                status TEXT NOT NULL DEFAULT 'OPEN',
                created_at TEXT DEFAULT CURRENT_TIMESTAMP,
                updated_at TEXT DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_positions_status ON positions(status)",
            [],
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // a panic mid-statement leaves nothing half-written in SQLite
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Raw row as stored; converted to a [`Position`] outside the rusqlite closure
struct StoredRow {
    id: i64,
    opened_at: String,
    side: String,
    entry_price: f64,
    initial_stop: f64,
    current_stop: f64,
    target_price: Option<f64>,
    size: f64,
    risk_budget: f64,
    theoretical_loss: f64,
    status: String,
}

impl StoredRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            opened_at: row.get(1)?,
            side: row.get(2)?,
            entry_price: row.get(3)?,
            initial_stop: row.get(4)?,
            current_stop: row.get(5)?,
            target_price: row.get(6)?,
            size: row.get(7)?,
            risk_budget: row.get(8)?,
            theoretical_loss: row.get(9)?,
            status: row.get(10)?,
        })
    }

    fn into_position(self) -> Result<Position, JournalError> {
        let record = self.id as usize;
        let corrupt = move |reason: String| JournalError::Corrupt { record, reason };

        let opened_at = DateTime::parse_from_rfc3339(&self.opened_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| corrupt(format!("bad timestamp '{}': {}", self.opened_at, e)))?;

        Ok(Position {
            opened_at,
            side: self.side.parse::<Side>().map_err(corrupt)?,
            entry_price: self.entry_price,
            initial_stop: self.initial_stop,
            current_stop: self.current_stop,
            target_price: self.target_price,
            size: self.size,
            risk_budget: self.risk_budget,
            theoretical_loss: self.theoretical_loss,
            status: self.status.parse::<PositionStatus>().map_err(corrupt)?,
        })
    }
}

impl Journal for SqliteJournal {
    fn append_new_position(&self, position: &Position) -> Result<(), JournalError> {
        let conn = self.conn();
        conn.execute(
            &format!(
                "INSERT INTO positions ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                COLUMNS
            ),
            params![
                position.opened_at.to_rfc3339(),
                position.side.as_str(),
                position.entry_price,
                position.initial_stop,
                position.current_stop,
                position.target_price,
                position.size,
                position.risk_budget,
                position.theoretical_loss,
                position.status.as_str(),
            ],
        )?;

        debug!("Position saved: id={}", conn.last_insert_rowid());
        Ok(())
    }

    fn find_latest_open_position(&self) -> Result<Option<Position>, JournalError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT id, {} FROM positions WHERE status = ?1 ORDER BY id DESC LIMIT 1",
            COLUMNS
        ))?;

        let row = stmt.query_row(params![PositionStatus::Open.as_str()], StoredRow::from_row);

        match row {
            Ok(row) => row.into_position().map(Some),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn update_latest_open_position(
        &self,
        current_stop: f64,
        status: PositionStatus,
    ) -> Result<(), JournalError> {
        let conn = self.conn();
        let updated = conn.execute(
            "UPDATE positions
             SET current_stop = ?1, status = ?2, updated_at = CURRENT_TIMESTAMP
             WHERE id = (SELECT MAX(id) FROM positions WHERE status = ?3)",
            params![current_stop, status.as_str(), PositionStatus::Open.as_str()],
        )?;

        if updated == 0 {
            return Err(JournalError::NoOpenPosition);
        }

        debug!("Position updated: stop={:.2} status={}", current_stop, status);
        Ok(())
    }

    fn positions(&self) -> Result<Vec<Position>, JournalError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT id, {} FROM positions ORDER BY id ASC",
            COLUMNS
        ))?;

        let rows = stmt
            .query_map([], StoredRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter().map(StoredRow::into_position).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn position(entry: f64, stop: f64) -> Position {
        Position {
            opened_at: Utc::now(),
            side: Side::Long,
            entry_price: entry,
            initial_stop: stop,
            current_stop: stop,
            target_price: None,
            size: 5.0 / (entry - stop),
            risk_budget: 5.0,
            theoretical_loss: -5.0,
            status: PositionStatus::Open,
        }
    }

    #[test]
    fn test_empty_journal() {
        let journal = SqliteJournal::open_in_memory().unwrap();
        assert!(journal.find_latest_open_position().unwrap().is_none());
        assert!(matches!(
            journal.update_latest_open_position(1.0, PositionStatus::Open),
            Err(JournalError::NoOpenPosition)
        ));
    }

    #[test]
    fn test_latest_open_is_highest_id() {
        let journal = SqliteJournal::open_in_memory().unwrap();
        journal.append_new_position(&position(105.0, 98.0)).unwrap();
        journal
            .update_latest_open_position(98.0, PositionStatus::ClosedByStop)
            .unwrap();
        journal.append_new_position(&position(120.0, 110.0)).unwrap();

        let open = journal.find_latest_open_position().unwrap().unwrap();
        assert_eq!(open.entry_price, 120.0);

        journal
            .update_latest_open_position(112.5, PositionStatus::Open)
            .unwrap();

        let all = journal.positions().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].status, PositionStatus::ClosedByStop);
        assert_eq!(all[0].current_stop, 98.0);
        assert_eq!(all[1].current_stop, 112.5);
        assert_eq!(all[1].initial_stop, 110.0);
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("journal.db");

        let original = position(105.0, 98.0);
        SqliteJournal::open(&path)
            .unwrap()
            .append_new_position(&original)
            .unwrap();

        let reopened = SqliteJournal::open(&path).unwrap();
        let open = reopened.find_latest_open_position().unwrap().unwrap();
        assert_eq!(open.opened_at, original.opened_at);
        assert_eq!(open.size, original.size);
        assert_eq!(open.target_price, None);
    }
}
