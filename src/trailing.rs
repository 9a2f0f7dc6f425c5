//! Trailing-stop state machine
//!
//! States are [`TrackingState::NoPosition`] and [`TrackingState::Tracking`].
//! The journal is the only memory between cycles: each cycle rehydrates the
//! state from the latest OPEN record, and [`TrailingStop::evaluate`] decides
//! what happens to a tracked position given the latest closed candle.
//!
//! Per cycle, in priority order:
//! 1. ATR undefined or non-positive: skip the cycle, nothing changes
//! 2. `low <= current_stop`: stopped out, stop kept as is
//! 3. `current_stop < close - k × ATR < close`: ratchet the stop up
//! 4. otherwise hold

use tracing::debug;

use crate::series::EnrichedSeries;
use crate::Position;

/// Tracking state rehydrated from the journal at cycle start
#[derive(Debug, Clone, PartialEq)]
pub enum TrackingState {
    NoPosition,
    Tracking(Position),
}

impl TrackingState {
    pub fn rehydrate(latest_open: Option<Position>) -> Self {
        match latest_open {
            Some(position) if position.is_open() => TrackingState::Tracking(position),
            _ => TrackingState::NoPosition,
        }
    }
}

/// Latest closed lower-timeframe candle as seen by the stop logic
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatestBar {
    pub low: f64,
    pub close: f64,
    pub atr: Option<f64>,
}

impl LatestBar {
    pub fn from_series(lower: &EnrichedSeries) -> Option<Self> {
        let last = lower.last()?;
        Some(Self {
            low: last.low,
            close: last.close,
            atr: lower.latest_atr(),
        })
    }
}

/// Outcome of one evaluation of a tracked position
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StopDecision {
    /// Volatility is not usable yet; no update, no closure
    AwaitingVolatility { atr: Option<f64> },
    /// Candle low touched the stop
    StopOut { stop: f64, low: f64 },
    /// Stop moves up; `notify` when the move clears the notification threshold
    Ratchet {
        previous: f64,
        new_stop: f64,
        notify: bool,
    },
    /// Nothing to do; the candidate was rejected
    Hold { candidate: f64 },
}

#[derive(Debug, Clone)]
pub struct TrailingStop {
    atr_multiple: f64,
    notify_threshold: f64,
}

impl TrailingStop {
    pub fn new(atr_multiple: f64, notify_threshold: f64) -> Self {
        Self {
            atr_multiple,
            notify_threshold,
        }
    }

    pub fn candidate_stop(&self, close: f64, atr: f64) -> f64 {
        close - self.atr_multiple * atr
    }

    /// Whether a move from `previous` to `new_stop` is large enough to report
    pub fn worth_notifying(&self, previous: f64, new_stop: f64) -> bool {
        previous > 0.0 && (new_stop - previous) / previous > self.notify_threshold
    }

    pub fn evaluate(&self, position: &Position, bar: &LatestBar) -> StopDecision {
        let atr = match bar.atr {
            Some(atr) if atr.is_finite() && atr > 0.0 => atr,
            other => return StopDecision::AwaitingVolatility { atr: other },
        };

        let current_stop = position.current_stop;
        if bar.low <= current_stop {
            return StopDecision::StopOut {
                stop: current_stop,
                low: bar.low,
            };
        }

        let candidate = self.candidate_stop(bar.close, atr);
        debug!(
            "Trailing candidate {:.2} (close {:.2} - {} x ATR {:.2}), current stop {:.2}",
            candidate, bar.close, self.atr_multiple, atr, current_stop
        );

        if candidate > current_stop && candidate < bar.close {
            StopDecision::Ratchet {
                previous: current_stop,
                new_stop: candidate,
                notify: self.worth_notifying(current_stop, candidate),
            }
        } else {
            StopDecision::Hold { candidate }
        }
    }

    /// Apply a decision to the position. Returns `true` when it changed.
    pub fn apply(&self, position: &mut Position, decision: &StopDecision) -> bool {
        match *decision {
            StopDecision::StopOut { .. } => position.close_by_stop(),
            StopDecision::Ratchet { new_stop, .. } => position.ratchet_stop(new_stop),
            StopDecision::AwaitingVolatility { .. } | StopDecision::Hold { .. } => false,
        }
    }
}
