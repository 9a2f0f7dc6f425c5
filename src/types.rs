//! Core data types shared by the decision engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Validation errors for candle data
#[derive(Debug, Error, PartialEq)]
pub enum CandleValidationError {
    #[error("high ({high}) must be >= low ({low})")]
    HighLessThanLow { high: f64, low: f64 },

    #[error("volume ({0}) must be >= 0")]
    NegativeVolume(f64),

    #[error("close ({close}) must be between low ({low}) and high ({high})")]
    CloseOutOfRange { close: f64, low: f64, high: f64 },

    #[error("prices must be positive and finite: open={open}, high={high}, low={low}, close={close}")]
    NonPositivePrice {
        open: f64,
        high: f64,
        low: f64,
        close: f64,
    },
}

/// OHLCV candlestick data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub datetime: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn new(
        datetime: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            datetime,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Validate the candle data
    pub fn validate(&self) -> Result<(), CandleValidationError> {
        let prices = [self.open, self.high, self.low, self.close];
        if prices.iter().any(|p| !p.is_finite() || *p <= 0.0) {
            return Err(CandleValidationError::NonPositivePrice {
                open: self.open,
                high: self.high,
                low: self.low,
                close: self.close,
            });
        }

        if self.high < self.low {
            return Err(CandleValidationError::HighLessThanLow {
                high: self.high,
                low: self.low,
            });
        }

        if self.volume < 0.0 {
            return Err(CandleValidationError::NegativeVolume(self.volume));
        }

        if self.close < self.low || self.close > self.high {
            return Err(CandleValidationError::CloseOutOfRange {
                close: self.close,
                low: self.low,
                high: self.high,
            });
        }

        Ok(())
    }
}

/// Trade direction. Only longs are ever opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Long,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Long => "LONG",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Side {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LONG" | "BUY" => Ok(Side::Long),
            other => Err(format!("unsupported side '{}'", other)),
        }
    }
}

/// Lifecycle status of a tracked position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionStatus {
    Open,
    ClosedByStop,
}

impl PositionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionStatus::Open => "OPEN",
            PositionStatus::ClosedByStop => "CLOSED_BY_STOP",
        }
    }
}

impl fmt::Display for PositionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PositionStatus {
    type Err = String;

    /// Accepts the legacy `CLOSED_SL` spelling written by older journals.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "OPEN" => Ok(PositionStatus::Open),
            "CLOSED_BY_STOP" | "CLOSED_SL" => Ok(PositionStatus::ClosedByStop),
            other => Err(format!("unknown position status '{}'", other)),
        }
    }
}

/// The single unit of trading state.
///
/// Created by the position sizer, mutated only through [`Position::ratchet_stop`]
/// and [`Position::close_by_stop`], frozen once closed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub opened_at: DateTime<Utc>,
    pub side: Side,
    pub entry_price: f64,
    pub initial_stop: f64,
    pub current_stop: f64,
    /// Always `None`: exits are purely trailing.
    pub target_price: Option<f64>,
    pub size: f64,
    pub risk_budget: f64,
    pub theoretical_loss: f64,
    pub status: PositionStatus,
}

impl Position {
    pub fn is_open(&self) -> bool {
        self.status == PositionStatus::Open
    }

    /// Distance between entry and the initial structural stop
    pub fn risk_distance(&self) -> f64 {
        self.entry_price - self.initial_stop
    }

    /// Move the trailing stop up. Returns `false` (and leaves the position
    /// untouched) if the position is closed or the new stop would not be higher.
    pub fn ratchet_stop(&mut self, new_stop: f64) -> bool {
        if !self.is_open() || !new_stop.is_finite() || new_stop <= self.current_stop {
            return false;
        }
        self.current_stop = new_stop;
        true
    }

    /// Mark the position as stopped out; the stop itself is kept unchanged.
    pub fn close_by_stop(&mut self) -> bool {
        if !self.is_open() {
            return false;
        }
        self.status = PositionStatus::ClosedByStop;
        true
    }

    pub fn unrealized_pnl(&self, current_price: f64) -> f64 {
        (current_price - self.entry_price) * self.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_position() -> Position {
        Position {
            opened_at: Utc::now(),
            side: Side::Long,
            entry_price: 105.0,
            initial_stop: 98.0,
            current_stop: 98.0,
            target_price: None,
            size: 5.0 / 7.0,
            risk_budget: 5.0,
            theoretical_loss: -5.0,
            status: PositionStatus::Open,
        }
    }

    #[test]
    fn test_status_round_trip_and_legacy_spelling() {
        assert_eq!("OPEN".parse::<PositionStatus>(), Ok(PositionStatus::Open));
        assert_eq!(
            " closed_sl ".parse::<PositionStatus>(),
            Ok(PositionStatus::ClosedByStop)
        );
        assert_eq!(PositionStatus::ClosedByStop.to_string(), "CLOSED_BY_STOP");
        assert!("PENDING".parse::<PositionStatus>().is_err());
    }

    #[test]
    fn test_ratchet_never_retreats() {
        let mut pos = open_position();
        assert!(pos.ratchet_stop(100.0));
        assert!(!pos.ratchet_stop(99.0));
        assert!(!pos.ratchet_stop(100.0));
        assert_eq!(pos.current_stop, 100.0);
    }

    #[test]
    fn test_closed_position_is_frozen() {
        let mut pos = open_position();
        assert!(pos.close_by_stop());
        assert!(!pos.close_by_stop());
        assert!(!pos.ratchet_stop(101.0));
        assert_eq!(pos.current_stop, 98.0);
        assert_eq!(pos.status, PositionStatus::ClosedByStop);
    }

    #[test]
    fn test_candle_validation() {
        let now = Utc::now();
        assert!(Candle::new(now, 10.0, 11.0, 9.0, 10.5, 1.0).validate().is_ok());
        assert_eq!(
            Candle::new(now, 10.0, 9.0, 11.0, 10.0, 1.0).validate(),
            Err(CandleValidationError::HighLessThanLow {
                high: 9.0,
                low: 11.0
            })
        );
        assert!(Candle::new(now, 10.0, 11.0, 9.0, f64::NAN, 1.0)
            .validate()
            .is_err());
        assert!(Candle::new(now, 10.0, 11.0, 9.0, 10.0, -1.0)
            .validate()
            .is_err());
    }
}
