//! Risk budget and position sizing
//!
//! # Currency-Agnostic Design
//!
//! All sizing is **currency-agnostic**: the risk budget and the candle prices
//! only have to share a denomination.
//!
//! Position sizing formula:
//! ```text
//! initial_stop     = min(low) over the last `stop_lookback` closed candles
//! position_size    = risk_budget / (entry_price - initial_stop)
//! theoretical_loss = (initial_stop - entry_price) * position_size   // == -risk_budget
//! ```

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, warn};

use crate::{Candle, Position, PositionStatus, Side};

#[derive(Debug, Error, PartialEq)]
pub enum RiskError {
    #[error("capital must be positive, got {0}")]
    NonPositiveCapital(f64),

    #[error("risk fraction must be within (0, 1], got {0}")]
    FractionOutOfRange(f64),

    #[error("risk budget must be positive, got {0}")]
    NonPositiveBudget(f64),
}

/// Process-wide risk configuration, fixed for the process lifetime
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskParameters {
    capital: f64,
    risk_fraction: f64,
    risk_budget: f64,
}

impl RiskParameters {
    /// Derive the budget as whole currency units of `capital × fraction`
    /// unless an absolute `budget_override` is supplied.
    pub fn new(
        capital: f64,
        risk_fraction: f64,
        budget_override: Option<f64>,
    ) -> Result<Self, RiskError> {
        if !(capital.is_finite() && capital > 0.0) {
            return Err(RiskError::NonPositiveCapital(capital));
        }
        if !(risk_fraction > 0.0 && risk_fraction <= 1.0) {
            return Err(RiskError::FractionOutOfRange(risk_fraction));
        }

        // epsilon keeps 0.29 * 100 from flooring to 28
        let risk_budget =
            budget_override.unwrap_or_else(|| (capital * risk_fraction + 1e-9).floor());
        if !(risk_budget.is_finite() && risk_budget > 0.0) {
            return Err(RiskError::NonPositiveBudget(risk_budget));
        }

        Ok(Self {
            capital,
            risk_fraction,
            risk_budget,
        })
    }

    pub fn capital(&self) -> f64 {
        self.capital
    }

    pub fn risk_fraction(&self) -> f64 {
        self.risk_fraction
    }

    /// Currency amount at stake on a single position
    pub fn risk_budget(&self) -> f64 {
        self.risk_budget
    }
}

/// Converts the risk budget and a structural stop into a [`Position`]
#[derive(Debug, Clone)]
pub struct PositionSizer {
    risk: RiskParameters,
    stop_lookback: usize,
}

impl PositionSizer {
    pub fn new(risk: RiskParameters, stop_lookback: usize) -> Self {
        Self {
            risk,
            stop_lookback,
        }
    }

    /// Lowest low over the last `stop_lookback` candles
    pub fn structural_stop(&self, recent: &[Candle]) -> Option<f64> {
        if self.stop_lookback == 0 || recent.len() < self.stop_lookback {
            return None;
        }
        recent[recent.len() - self.stop_lookback..]
            .iter()
            .map(|c| c.low)
            .fold(None, |acc: Option<f64>, low| {
                Some(acc.map_or(low, |current| current.min(low)))
            })
    }

    /// Size a new long position opened now
    pub fn size(&self, entry_price: f64, recent: &[Candle]) -> Option<Position> {
        self.size_at(entry_price, recent, Utc::now())
    }

    /// Size a new long position. Returns `None` when the entry does not sit
    /// strictly above the structural stop.
    pub fn size_at(
        &self,
        entry_price: f64,
        recent: &[Candle],
        opened_at: DateTime<Utc>,
    ) -> Option<Position> {
        let initial_stop = self.structural_stop(recent)?;

        if !entry_price.is_finite() || entry_price <= initial_stop {
            warn!(
                "Structural stop {:.2} is not below entry {:.2}, signal discarded",
                initial_stop, entry_price
            );
            return None;
        }

        let risk_budget = self.risk.risk_budget();
        let risk_distance = entry_price - initial_stop;
        let size = risk_budget / risk_distance;
        let theoretical_loss = (initial_stop - entry_price) * size;

        debug!(
            "Sized position: entry={:.2} stop={:.2} distance={:.2} size={:.8} budget={:.2}",
            entry_price, initial_stop, risk_distance, size, risk_budget
        );

        Some(Position {
            opened_at,
            side: Side::Long,
            entry_price,
            initial_stop,
            current_stop: initial_stop,
            target_price: None,
            size,
            risk_budget,
            theoretical_loss,
            status: PositionStatus::Open,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::Duration;

    fn candles_with_lows(lows: &[f64]) -> Vec<Candle> {
        let start = Utc::now() - Duration::hours(4 * lows.len() as i64);
        lows.iter()
            .enumerate()
            .map(|(i, &low)| {
                Candle::new(
                    start + Duration::hours(4 * i as i64),
                    low + 2.0,
                    low + 4.0,
                    low,
                    low + 3.0,
                    1.0,
                )
            })
            .collect()
    }

    fn sizer(budget: f64) -> PositionSizer {
        PositionSizer::new(RiskParameters::new(500.0, 0.01, Some(budget)).unwrap(), 3)
    }

    #[test]
    fn test_worked_example() {
        let candles = candles_with_lows(&[120.0, 100.0, 98.0, 101.0]);
        let pos = sizer(5.0).size(105.0, &candles).unwrap();

        assert_eq!(pos.initial_stop, 98.0);
        assert_eq!(pos.current_stop, 98.0);
        assert_eq!(pos.target_price, None);
        assert_eq!(pos.status, PositionStatus::Open);
        assert_relative_eq!(pos.size, 5.0 / 7.0, epsilon = 1e-12);
        assert_relative_eq!(pos.theoretical_loss, -5.0, epsilon = 1e-9);
        assert_relative_eq!(pos.risk_distance(), 7.0);
    }

    #[test]
    fn test_only_last_lookback_candles_count() {
        // the 90 low is outside the 3-candle window
        let candles = candles_with_lows(&[90.0, 100.0, 98.0, 101.0]);
        assert_eq!(sizer(5.0).structural_stop(&candles), Some(98.0));
    }

    #[test]
    fn test_rejects_entry_at_or_below_stop() {
        let candles = candles_with_lows(&[100.0, 98.0, 101.0]);
        assert!(sizer(5.0).size(98.0, &candles).is_none());
        assert!(sizer(5.0).size(97.5, &candles).is_none());
        assert!(sizer(5.0).size(f64::NAN, &candles).is_none());
    }

    #[test]
    fn test_rejects_short_history() {
        let candles = candles_with_lows(&[100.0, 98.0]);
        assert!(sizer(5.0).size(105.0, &candles).is_none());
    }

    #[test]
    fn test_budget_derivation() {
        let params = RiskParameters::new(500.0, 0.01, None).unwrap();
        assert_eq!(params.risk_budget(), 5.0);

        let params = RiskParameters::new(100.0, 0.29, None).unwrap();
        assert_eq!(params.risk_budget(), 29.0);

        let params = RiskParameters::new(5000.0, 0.01, Some(75.0)).unwrap();
        assert_eq!(params.risk_budget(), 75.0);
    }

    #[test]
    fn test_invalid_parameters() {
        assert_eq!(
            RiskParameters::new(0.0, 0.01, None),
            Err(RiskError::NonPositiveCapital(0.0))
        );
        assert_eq!(
            RiskParameters::new(500.0, 0.0, None),
            Err(RiskError::FractionOutOfRange(0.0))
        );
        // 50 * 0.01 floors to zero whole units
        assert_eq!(
            RiskParameters::new(50.0, 0.01, None),
            Err(RiskError::NonPositiveBudget(0.0))
        );
    }
}
