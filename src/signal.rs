//! Entry signal detection
//!
//! A long entry requires all three conditions on the latest closed candles:
//! 1. Higher-timeframe trend direction is up (absolute veto otherwise)
//! 2. Lower-timeframe close is above the lower-timeframe EMA
//! 3. Lower-timeframe RSI crosses from at-or-below the level to strictly above it
//!
//! Undefined indicator values never produce a signal.

use tracing::{debug, info};

use crate::indicators::TrendDirection;
use crate::series::{EnrichedSeries, IndicatorEngine};

/// Why the rule did or did not fire
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SignalCheck {
    Entry { close: f64, ema: f64, rsi: f64 },
    InsufficientWarmup,
    InvalidPrice(f64),
    TrendNotUp(Option<TrendDirection>),
    BelowTrendLine { close: f64, ema: Option<f64> },
    NoMomentumCross {
        previous: Option<f64>,
        current: Option<f64>,
    },
}

impl SignalCheck {
    pub fn is_entry(&self) -> bool {
        matches!(self, SignalCheck::Entry { .. })
    }
}

impl std::fmt::Display for SignalCheck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let fmt_opt = |v: Option<f64>| v.map_or_else(|| "n/a".to_string(), |v| format!("{:.2}", v));
        match self {
            SignalCheck::Entry { close, ema, rsi } => write!(
                f,
                "entry: close {:.2} > EMA {:.2}, RSI crossed up to {:.1}",
                close, ema, rsi
            ),
            SignalCheck::InsufficientWarmup => f.write_str("not enough history for indicators"),
            SignalCheck::InvalidPrice(price) => write!(f, "invalid current price {}", price),
            SignalCheck::TrendNotUp(trend) => match trend {
                Some(dir) => write!(f, "higher timeframe trend is {}", dir),
                None => f.write_str("higher timeframe trend undefined"),
            },
            SignalCheck::BelowTrendLine { close, ema } => {
                write!(f, "close {:.2} not above EMA {}", close, fmt_opt(*ema))
            }
            SignalCheck::NoMomentumCross { previous, current } => write!(
                f,
                "no RSI cross (previous {}, current {})",
                fmt_opt(*previous),
                fmt_opt(*current)
            ),
        }
    }
}

/// Values the rule reads from the latest closed candles
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalInputs {
    pub trend: Option<TrendDirection>,
    pub close: f64,
    pub ema: Option<f64>,
    pub rsi_previous: Option<f64>,
    pub rsi_current: Option<f64>,
}

impl SignalInputs {
    /// Extract the inputs; `None` when the lower series has fewer than two candles.
    pub fn from_series(lower: &EnrichedSeries, higher: &EnrichedSeries) -> Option<Self> {
        let last = lower.len().checked_sub(1)?;
        let prev = last.checked_sub(1)?;

        Some(Self {
            trend: higher.latest_trend(),
            close: lower.candles[last].close,
            ema: lower.ema_at(last),
            rsi_previous: lower.rsi_at(prev),
            rsi_current: lower.rsi_at(last),
        })
    }
}

/// Pure entry predicate over enriched series
#[derive(Debug, Clone)]
pub struct SignalDetector {
    cross_level: f64,
    lower_min: usize,
    higher_min: usize,
}

impl SignalDetector {
    pub fn new(cross_level: f64, lower_min: usize, higher_min: usize) -> Self {
        Self {
            cross_level,
            lower_min,
            higher_min,
        }
    }

    pub fn from_engine(engine: &IndicatorEngine) -> Self {
        Self::new(
            engine.settings().rsi_cross_level,
            engine.lower_min_candles(),
            engine.higher_min_candles(),
        )
    }

    /// `true` only when every entry condition holds
    pub fn detect(
        &self,
        lower: &EnrichedSeries,
        higher: &EnrichedSeries,
        current_price: f64,
    ) -> bool {
        self.assess(lower, higher, current_price).is_entry()
    }

    /// [`SignalDetector::check`] plus the cycle log line for the outcome
    pub fn assess(
        &self,
        lower: &EnrichedSeries,
        higher: &EnrichedSeries,
        current_price: f64,
    ) -> SignalCheck {
        let check = self.check(lower, higher, current_price);
        if check.is_entry() {
            info!("Signal detected: {}", check);
        } else {
            info!("No signal: {}", check);
        }
        check
    }

    /// Evaluate the rule and report which condition decided it
    pub fn check(
        &self,
        lower: &EnrichedSeries,
        higher: &EnrichedSeries,
        current_price: f64,
    ) -> SignalCheck {
        if lower.len() < self.lower_min || higher.len() < self.higher_min {
            debug!(
                "Warm-up not reached: lower {}/{} higher {}/{}",
                lower.len(),
                self.lower_min,
                higher.len(),
                self.higher_min
            );
            return SignalCheck::InsufficientWarmup;
        }
        if !(current_price.is_finite() && current_price > 0.0) {
            return SignalCheck::InvalidPrice(current_price);
        }

        match SignalInputs::from_series(lower, higher) {
            Some(inputs) => self.evaluate(&inputs),
            None => SignalCheck::InsufficientWarmup,
        }
    }

    /// Apply the three conditions in veto order
    pub fn evaluate(&self, inputs: &SignalInputs) -> SignalCheck {
        if inputs.trend != Some(TrendDirection::Up) {
            return SignalCheck::TrendNotUp(inputs.trend);
        }

        let ema = match inputs.ema {
            Some(ema) if inputs.close > ema => ema,
            other => {
                return SignalCheck::BelowTrendLine {
                    close: inputs.close,
                    ema: other,
                }
            }
        };

        match (inputs.rsi_previous, inputs.rsi_current) {
            (Some(previous), Some(current))
                if previous <= self.cross_level && current > self.cross_level =>
            {
                SignalCheck::Entry {
                    close: inputs.close,
                    ema,
                    rsi: current,
                }
            }
            (previous, current) => SignalCheck::NoMomentumCross { previous, current },
        }
    }
}
