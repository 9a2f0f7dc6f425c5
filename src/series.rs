//! Indicator engine
//!
//! Turns raw candle series into [`EnrichedSeries`]: the candles plus the
//! derived columns the rule consumes. The lower timeframe carries the trend
//! average, momentum and volatility columns; the higher timeframe carries the
//! trend-direction column. Both series keep every column at candle length so
//! indices line up.

use thiserror::Error;

use crate::config::StrategyConfig;
use crate::indicators::{atr, ema, rsi, supertrend_direction, TrendDirection};
use crate::Candle;

/// Extra candles required beyond the largest lookback
pub const WARMUP_MARGIN: usize = 2;

/// Which timeframe a series was built for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeriesRole {
    Lower,
    Higher,
}

impl std::fmt::Display for SeriesRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SeriesRole::Lower => f.write_str("lower"),
            SeriesRole::Higher => f.write_str("higher"),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IndicatorError {
    #[error("{role} timeframe series has {got} candles, at least {needed} required")]
    InsufficientHistory {
        role: SeriesRole,
        needed: usize,
        got: usize,
    },
}

/// A candle series augmented with derived indicator columns
#[derive(Debug, Clone)]
pub struct EnrichedSeries {
    pub role: SeriesRole,
    pub candles: Vec<Candle>,
    pub ema: Vec<Option<f64>>,
    pub rsi: Vec<Option<f64>>,
    pub atr: Vec<Option<f64>>,
    pub trend: Vec<Option<TrendDirection>>,
}

impl EnrichedSeries {
    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.last()
    }

    /// The last `n` candles (fewer if the series is shorter)
    pub fn recent(&self, n: usize) -> &[Candle] {
        let start = self.candles.len().saturating_sub(n);
        &self.candles[start..]
    }

    pub fn ema_at(&self, idx: usize) -> Option<f64> {
        defined(self.ema.get(idx).copied().flatten())
    }

    pub fn rsi_at(&self, idx: usize) -> Option<f64> {
        defined(self.rsi.get(idx).copied().flatten())
    }

    pub fn atr_at(&self, idx: usize) -> Option<f64> {
        defined(self.atr.get(idx).copied().flatten())
    }

    pub fn latest_atr(&self) -> Option<f64> {
        self.len().checked_sub(1).and_then(|idx| self.atr_at(idx))
    }

    /// Trend state of the most recent candle
    pub fn latest_trend(&self) -> Option<TrendDirection> {
        self.trend.last().copied().flatten()
    }
}

fn defined(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

/// Computes enriched series with the configured lookbacks
#[derive(Debug, Clone)]
pub struct IndicatorEngine {
    settings: StrategyConfig,
}

impl IndicatorEngine {
    pub fn new(settings: StrategyConfig) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &StrategyConfig {
        &self.settings
    }

    /// Minimum lower-timeframe candles: largest lookback, the structural
    /// stop window and the margin.
    pub fn lower_min_candles(&self) -> usize {
        let s = &self.settings;
        s.ema_period.max(s.rsi_period).max(s.atr_period) + s.stop_lookback + WARMUP_MARGIN
    }

    pub fn higher_min_candles(&self) -> usize {
        self.settings.supertrend_period + WARMUP_MARGIN
    }

    /// Build the lower-timeframe series (trend average, momentum, volatility)
    pub fn enrich_lower(&self, candles: Vec<Candle>) -> Result<EnrichedSeries, IndicatorError> {
        check_length(SeriesRole::Lower, &candles, self.lower_min_candles())?;

        let (high, low, close) = split_prices(&candles);
        let len = candles.len();

        Ok(EnrichedSeries {
            role: SeriesRole::Lower,
            ema: ema(&close, self.settings.ema_period),
            rsi: rsi(&close, self.settings.rsi_period),
            atr: atr(&high, &low, &close, self.settings.atr_period),
            trend: vec![None; len],
            candles,
        })
    }

    /// Build the higher-timeframe series (trend direction)
    pub fn enrich_higher(&self, candles: Vec<Candle>) -> Result<EnrichedSeries, IndicatorError> {
        check_length(SeriesRole::Higher, &candles, self.higher_min_candles())?;

        let (high, low, close) = split_prices(&candles);
        let len = candles.len();

        Ok(EnrichedSeries {
            role: SeriesRole::Higher,
            ema: vec![None; len],
            rsi: vec![None; len],
            atr: vec![None; len],
            trend: supertrend_direction(
                &high,
                &low,
                &close,
                self.settings.supertrend_period,
                self.settings.supertrend_multiplier,
            ),
            candles,
        })
    }
}

fn check_length(role: SeriesRole, candles: &[Candle], needed: usize) -> Result<(), IndicatorError> {
    if candles.len() < needed {
        return Err(IndicatorError::InsufficientHistory {
            role,
            needed,
            got: candles.len(),
        });
    }
    Ok(())
}

fn split_prices(candles: &[Candle]) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
    let high = candles.iter().map(|c| c.high).collect();
    let low = candles.iter().map(|c| c.low).collect();
    let close = candles.iter().map(|c| c.close).collect();
    (high, low, close)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn candles(count: usize) -> Vec<Candle> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        (0..count)
            .map(|i| {
                let close = 100.0 + i as f64;
                Candle::new(
                    start + Duration::hours(4 * i as i64),
                    close - 0.5,
                    close + 1.0,
                    close - 1.0,
                    close,
                    10.0,
                )
            })
            .collect()
    }

    #[test]
    fn test_minimums_follow_lookbacks() {
        let engine = IndicatorEngine::new(StrategyConfig::default());
        assert_eq!(engine.lower_min_candles(), 50 + 3 + WARMUP_MARGIN);
        assert_eq!(engine.higher_min_candles(), 10 + WARMUP_MARGIN);
    }

    #[test]
    fn test_insufficient_history_is_explicit() {
        let engine = IndicatorEngine::new(StrategyConfig::default());
        let err = engine.enrich_lower(candles(20)).unwrap_err();
        assert_eq!(
            err,
            IndicatorError::InsufficientHistory {
                role: SeriesRole::Lower,
                needed: 55,
                got: 20
            }
        );
        assert!(engine.enrich_higher(candles(11)).is_err());
    }

    #[test]
    fn test_lower_columns_align_with_candles() {
        let engine = IndicatorEngine::new(StrategyConfig::default());
        let series = engine.enrich_lower(candles(120)).unwrap();

        assert_eq!(series.ema.len(), 120);
        assert_eq!(series.rsi.len(), 120);
        assert_eq!(series.atr.len(), 120);
        assert_eq!(series.ema_at(48), None);
        assert!(series.ema_at(49).is_some());
        assert_eq!(series.rsi_at(13), None);
        assert!(series.rsi_at(14).is_some());
        assert!(series.latest_atr().unwrap() > 0.0);
        assert_eq!(series.latest_trend(), None);
        assert_eq!(series.recent(3).len(), 3);
        assert_eq!(series.recent(3)[2].close, 219.0);
    }

    #[test]
    fn test_higher_series_trend_up() {
        let engine = IndicatorEngine::new(StrategyConfig::default());
        let series = engine.enrich_higher(candles(60)).unwrap();
        assert_eq!(series.latest_trend(), Some(TrendDirection::Up));
        assert_eq!(series.latest_atr(), None);
    }
}
