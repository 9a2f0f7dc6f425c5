//! CSV journal backend
//!
//! One row per position, appended on entry. Stop updates rewrite the whole
//! file through a temporary sibling and an atomic rename, so a crash mid-write
//! leaves either the old or the new journal, never a truncated one.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{round_price, round_size, round_stop, Journal, JournalError};
use crate::{Position, PositionStatus, Side};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// On-disk row. Field names double as the header.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct JournalRow {
    timestamp: String,
    side: String,
    entry_price: f64,
    initial_stop: f64,
    #[serde(default)]
    current_stop: Option<f64>,
    #[serde(default)]
    target_price: Option<f64>,
    position_size: f64,
    risk_budget: f64,
    theoretical_loss: f64,
    status: String,
}

impl From<&Position> for JournalRow {
    fn from(p: &Position) -> Self {
        Self {
            timestamp: p.opened_at.format(TIMESTAMP_FORMAT).to_string(),
            side: p.side.as_str().to_string(),
            entry_price: round_price(p.entry_price),
            initial_stop: round_stop(p.initial_stop),
            current_stop: Some(round_stop(p.current_stop)),
            target_price: p.target_price.map(round_price),
            position_size: round_size(p.size),
            risk_budget: round_price(p.risk_budget),
            theoretical_loss: round_price(p.theoretical_loss),
            status: p.status.as_str().to_string(),
        }
    }
}

impl JournalRow {
    fn status(&self) -> Result<PositionStatus, String> {
        self.status.parse()
    }

    fn to_position(&self) -> Result<Position, String> {
        Ok(Position {
            opened_at: parse_timestamp(&self.timestamp)?,
            side: self.side.parse::<Side>()?,
            entry_price: self.entry_price,
            initial_stop: self.initial_stop,
            current_stop: self.current_stop.unwrap_or(self.initial_stop),
            target_price: self.target_price,
            size: self.position_size,
            risk_budget: self.risk_budget,
            theoretical_loss: self.theoretical_loss,
            status: self.status()?,
        })
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    let raw = raw.trim();
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT)
                .map(|ndt| DateTime::<Utc>::from_naive_utc_and_offset(ndt, Utc))
        })
        .map_err(|e| format!("bad timestamp '{}': {}", raw, e))
}

/// Journal stored as a CSV file
#[derive(Debug, Clone)]
pub struct CsvJournal {
    path: PathBuf,
}

impl CsvJournal {
    /// Use `path` as the journal; the file is created on first append
    pub fn new(path: impl AsRef<Path>) -> Result<Self, JournalError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_rows(&self) -> Result<Vec<JournalRow>, JournalError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let mut reader = ::csv::ReaderBuilder::new()
            .trim(::csv::Trim::All)
            .from_path(&self.path)?;

        let mut rows = Vec::new();
        for result in reader.deserialize::<JournalRow>() {
            rows.push(result?);
        }
        Ok(rows)
    }

    fn write_rows(&self, rows: &[JournalRow]) -> Result<(), JournalError> {
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        {
            let mut writer = ::csv::Writer::from_path(&tmp)?;
            for row in rows {
                writer.serialize(row)?;
            }
            writer.flush()?;
        }

        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl Journal for CsvJournal {
    fn append_new_position(&self, position: &Position) -> Result<(), JournalError> {
        let write_header = fs::metadata(&self.path).map(|m| m.len() == 0).unwrap_or(true);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut writer = ::csv::WriterBuilder::new()
            .has_headers(write_header)
            .from_writer(file);
        writer.serialize(JournalRow::from(position))?;
        writer.flush()?;

        debug!("Appended position to {}", self.path.display());
        Ok(())
    }

    fn find_latest_open_position(&self) -> Result<Option<Position>, JournalError> {
        let rows = self.read_rows()?;
        for (idx, row) in rows.iter().enumerate().rev() {
            let status = row.status().map_err(|reason| JournalError::Corrupt {
                record: idx + 1,
                reason,
            })?;
            if status == PositionStatus::Open {
                return row
                    .to_position()
                    .map(Some)
                    .map_err(|reason| JournalError::Corrupt {
                        record: idx + 1,
                        reason,
                    });
            }
        }
        Ok(None)
    }

    fn update_latest_open_position(
        &self,
        current_stop: f64,
        status: PositionStatus,
    ) -> Result<(), JournalError> {
        let mut rows = self.read_rows()?;

        let idx = rows
            .iter()
            .rposition(|row| row.status() == Ok(PositionStatus::Open))
            .ok_or(JournalError::NoOpenPosition)?;

        rows[idx].current_stop = Some(round_stop(current_stop));
        rows[idx].status = status.as_str().to_string();
        self.write_rows(&rows)?;

        debug!(
            "Updated journal record {}: stop={:.2} status={}",
            idx + 1,
            current_stop,
            status
        );
        Ok(())
    }

    fn positions(&self) -> Result<Vec<Position>, JournalError> {
        self.read_rows()?
            .iter()
            .enumerate()
            .map(|(idx, row)| {
                row.to_position().map_err(|reason| JournalError::Corrupt {
                    record: idx + 1,
                    reason,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn position(entry: f64, stop: f64) -> Position {
        Position {
            opened_at: Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap(),
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

    fn journal(dir: &TempDir) -> CsvJournal {
        CsvJournal::new(dir.path().join("journal_trading.csv")).unwrap()
    }

    #[test]
    fn test_missing_file_means_no_position() {
        let dir = TempDir::new().unwrap();
        let journal = journal(&dir);
        assert!(journal.find_latest_open_position().unwrap().is_none());
        assert!(journal.positions().unwrap().is_empty());
    }

    #[test]
    fn test_append_writes_header_once() {
        let dir = TempDir::new().unwrap();
        let journal = journal(&dir);
        journal.append_new_position(&position(105.0, 98.0)).unwrap();
        journal.append_new_position(&position(110.0, 100.0)).unwrap();

        let contents = fs::read_to_string(journal.path()).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[0],
            "timestamp,side,entry_price,initial_stop,current_stop,target_price,\
             position_size,risk_budget,theoretical_loss,status"
        );
        assert!(lines[1].starts_with("2024-03-01 08:00:00,LONG,105"));
        assert!(lines[1].contains(",,0.71428571,"));
        assert!(lines[1].ends_with(",OPEN"));
    }

    #[test]
    fn test_round_trip_and_update() {
        let dir = TempDir::new().unwrap();
        let journal = journal(&dir);
        journal.append_new_position(&position(105.0, 98.0)).unwrap();

        let open = journal.find_latest_open_position().unwrap().unwrap();
        assert_eq!(open.entry_price, 105.0);
        assert_eq!(open.current_stop, 98.0);
        assert_eq!(open.opened_at, position(105.0, 98.0).opened_at);

        journal
            .update_latest_open_position(101.256, PositionStatus::Open)
            .unwrap();
        let open = journal.find_latest_open_position().unwrap().unwrap();
        assert_eq!(open.current_stop, 101.25);
        assert_eq!(open.initial_stop, 98.0);

        journal
            .update_latest_open_position(101.25, PositionStatus::ClosedByStop)
            .unwrap();
        assert!(journal.find_latest_open_position().unwrap().is_none());

        let all = journal.positions().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].status, PositionStatus::ClosedByStop);
        assert!(!dir.path().join("journal_trading.csv.tmp").exists());
    }

    #[test]
    fn test_stored_stop_stays_below_close() {
        let dir = TempDir::new().unwrap();
        let journal = journal(&dir);
        journal.append_new_position(&position(100.0, 99.996)).unwrap();

        let open = journal.find_latest_open_position().unwrap().unwrap();
        assert_eq!(open.initial_stop, 99.99);
        assert!(open.current_stop < 100.0);

        journal
            .update_latest_open_position(99.999, PositionStatus::Open)
            .unwrap();
        let open = journal.find_latest_open_position().unwrap().unwrap();
        assert_eq!(open.current_stop, 99.99);
    }

    #[test]
    fn test_update_without_open_position_fails() {
        let dir = TempDir::new().unwrap();
        let journal = journal(&dir);
        let err = journal
            .update_latest_open_position(100.0, PositionStatus::Open)
            .unwrap_err();
        assert!(matches!(err, JournalError::NoOpenPosition));
    }

    #[test]
    fn test_reads_legacy_rows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("journal_trading.csv");
        fs::write(
            &path,
            "timestamp,side,entry_price,initial_stop,current_stop,target_price,\
             position_size,risk_budget,theoretical_loss,status\n\
             2024-01-01 00:00:00,BUY,100,95,96,,1,5,-5,CLOSED_SL\n\
             2024-02-01 04:00:00,LONG,200,190,,,0.5,5,-5,open\n",
        )
        .unwrap();

        let journal = CsvJournal::new(&path).unwrap();
        let all = journal.positions().unwrap();
        assert_eq!(all[0].status, PositionStatus::ClosedByStop);

        let open = journal.find_latest_open_position().unwrap().unwrap();
        assert_eq!(open.entry_price, 200.0);
        assert_eq!(open.current_stop, 190.0);
    }

    #[test]
    fn test_unknown_status_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("journal_trading.csv");
        fs::write(
            &path,
            "timestamp,side,entry_price,initial_stop,current_stop,target_price,\
             position_size,risk_budget,theoretical_loss,status\n\
             2024-01-01 00:00:00,LONG,100,95,96,,1,5,-5,PENDING\n",
        )
        .unwrap();

        let err = CsvJournal::new(&path)
            .unwrap()
            .find_latest_open_position()
            .unwrap_err();
        assert!(matches!(err, JournalError::Corrupt { record: 1, .. }));
    }
}
