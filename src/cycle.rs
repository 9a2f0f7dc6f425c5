//! One decision cycle
//!
//! ```text
//! fetch lower + higher candles ──► enrich ──► rehydrate from journal
//!                                                 │
//!                       ┌─────────────────────────┴──────────────┐
//!                 no open position                          open position
//!                       │                                        │
//!             signal ─► size ─► append ─► notify     stop-out / ratchet / hold
//! ```
//!
//! Data problems abort the cycle before the journal is touched. The journal
//! is written before any notification goes out, and a failed notification
//! never undoes the write.

use chrono::{DateTime, Utc};
use std::fmt;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{Config, MarketConfig};
use crate::data::{MarketData, MarketDataError};
use crate::journal::{Journal, JournalError};
use crate::notify::{entry_message, exit_message, stop_update_message, MessageContext, Notifier};
use crate::risk::{PositionSizer, RiskError, RiskParameters};
use crate::series::{EnrichedSeries, IndicatorEngine, IndicatorError};
use crate::signal::{SignalCheck, SignalDetector};
use crate::trailing::{LatestBar, StopDecision, TrackingState, TrailingStop};
use crate::{Position, PositionStatus};

#[derive(Debug, Error)]
pub enum CycleError {
    #[error("market data unavailable: {0}")]
    DataUnavailable(#[from] MarketDataError),

    #[error("market data unavailable: {0}")]
    InsufficientHistory(#[from] IndicatorError),

    #[error("journal failure: {0}")]
    Journal(#[from] JournalError),
}

impl CycleError {
    /// Data errors leave the journal untouched by construction
    pub fn is_data_unavailable(&self) -> bool {
        matches!(
            self,
            CycleError::DataUnavailable(_) | CycleError::InsufficientHistory(_)
        )
    }
}

/// What a completed cycle did
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// Flat, and the entry rule did not fire
    NoSignal(SignalCheck),
    /// Signal fired but the entry was not above the structural stop
    SizingRejected { entry: f64, stop: Option<f64> },
    Opened { position: Position, notified: bool },
    Ratcheted {
        previous: f64,
        new_stop: f64,
        notified: bool,
    },
    StoppedOut { stop: f64, low: f64, notified: bool },
    Held { stop: f64, candidate: f64 },
    /// Open position, but ATR is not usable on the latest candle
    AwaitingVolatility,
}

impl fmt::Display for CycleOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleOutcome::NoSignal(check) => write!(f, "no signal ({})", check),
            CycleOutcome::SizingRejected { entry, stop } => match stop {
                Some(stop) => write!(f, "sizing rejected: entry {:.2} <= stop {:.2}", entry, stop),
                None => write!(f, "sizing rejected: no structural stop for entry {:.2}", entry),
            },
            CycleOutcome::Opened { position, .. } => write!(
                f,
                "opened long {:.8} @ {:.2}, stop {:.2}",
                position.size, position.entry_price, position.initial_stop
            ),
            CycleOutcome::Ratcheted {
                previous, new_stop, ..
            } => write!(f, "stop raised {:.2} -> {:.2}", previous, new_stop),
            CycleOutcome::StoppedOut { stop, low, .. } => {
                write!(f, "stopped out: low {:.2} <= stop {:.2}", low, stop)
            }
            CycleOutcome::Held { stop, candidate } => {
                write!(f, "holding stop {:.2} (candidate {:.2})", stop, candidate)
            }
            CycleOutcome::AwaitingVolatility => f.write_str("ATR undefined, position untouched"),
        }
    }
}

/// The decision engine wired to its collaborators
pub struct SwingCycle {
    market: MarketConfig,
    engine: IndicatorEngine,
    detector: SignalDetector,
    sizer: PositionSizer,
    trailing: TrailingStop,
    data: Box<dyn MarketData>,
    journal: Box<dyn Journal>,
    notifier: Box<dyn Notifier>,
}

impl SwingCycle {
    pub fn new(
        config: &Config,
        data: Box<dyn MarketData>,
        journal: Box<dyn Journal>,
        notifier: Box<dyn Notifier>,
    ) -> Result<Self, RiskError> {
        let risk = RiskParameters::new(
            config.risk.capital,
            config.risk.risk_fraction,
            config.risk.risk_budget,
        )?;
        let strategy = config.strategy.clone();
        let engine = IndicatorEngine::new(strategy.clone());
        let detector = SignalDetector::from_engine(&engine);

        info!(
            "Cycle configured: {} {}/{}, risk budget {:.2} ({:.2} x {})",
            config.market.symbol,
            config.market.lower_timeframe,
            config.market.higher_timeframe,
            risk.risk_budget(),
            risk.capital(),
            risk.risk_fraction()
        );

        Ok(Self {
            market: config.market.clone(),
            engine,
            detector,
            sizer: PositionSizer::new(risk, strategy.stop_lookback),
            trailing: TrailingStop::new(strategy.trailing_atr_multiple, strategy.notify_threshold),
            data,
            journal,
            notifier,
        })
    }

    pub async fn run_cycle(&self) -> Result<CycleOutcome, CycleError> {
        self.run_cycle_at(Utc::now()).await
    }

    /// Run one pass; `now` stamps any position opened in this cycle
    pub async fn run_cycle_at(&self, now: DateTime<Utc>) -> Result<CycleOutcome, CycleError> {
        info!("=== Cycle start: {} ===", self.market.symbol);

        let (lower, higher) = self.load_series().await?;

        let state = TrackingState::rehydrate(self.journal.find_latest_open_position()?);

        let outcome = match state {
            TrackingState::NoPosition => self.seek_entry(&lower, &higher, now).await?,
            TrackingState::Tracking(position) => self.track(position, &lower).await?,
        };

        info!("Cycle outcome: {}", outcome);
        Ok(outcome)
    }

    async fn load_series(&self) -> Result<(EnrichedSeries, EnrichedSeries), CycleError> {
        let m = &self.market;
        let lower_candles = self
            .data
            .fetch_candles(&m.symbol, &m.lower_timeframe, m.lower_limit)
            .await?;
        let higher_candles = self
            .data
            .fetch_candles(&m.symbol, &m.higher_timeframe, m.higher_limit)
            .await?;

        info!(
            "Fetched {} {} candles and {} {} candles",
            lower_candles.len(),
            m.lower_timeframe,
            higher_candles.len(),
            m.higher_timeframe
        );

        let lower = self.engine.enrich_lower(lower_candles)?;
        let higher = self.engine.enrich_higher(higher_candles)?;
        Ok((lower, higher))
    }

    async fn seek_entry(
        &self,
        lower: &EnrichedSeries,
        higher: &EnrichedSeries,
        now: DateTime<Utc>,
    ) -> Result<CycleOutcome, CycleError> {
        let current_price = match lower.last() {
            Some(candle) => candle.close,
            None => return Ok(CycleOutcome::NoSignal(SignalCheck::InsufficientWarmup)),
        };

        let check = self.detector.assess(lower, higher, current_price);
        if !check.is_entry() {
            return Ok(CycleOutcome::NoSignal(check));
        }

        let recent = lower.recent(self.engine.settings().stop_lookback);
        let position = match self.sizer.size_at(current_price, recent, now) {
            Some(position) => position,
            None => {
                return Ok(CycleOutcome::SizingRejected {
                    entry: current_price,
                    stop: self.sizer.structural_stop(recent),
                })
            }
        };

        self.journal.append_new_position(&position)?;
        info!(
            "Position opened: entry={:.2} stop={:.2} distance={:.2} size={:.8} risk={:.2}",
            position.entry_price,
            position.initial_stop,
            position.risk_distance(),
            position.size,
            position.risk_budget
        );

        let notified = self
            .notify(entry_message(&self.message_context(), &position))
            .await;

        Ok(CycleOutcome::Opened { position, notified })
    }

    async fn track(
        &self,
        mut position: Position,
        lower: &EnrichedSeries,
    ) -> Result<CycleOutcome, CycleError> {
        debug!(
            "Tracking position opened {} at {:.2}, stop {:.2}",
            position.opened_at, position.entry_price, position.current_stop
        );

        let bar = match LatestBar::from_series(lower) {
            Some(bar) => bar,
            None => return Ok(CycleOutcome::AwaitingVolatility),
        };

        let decision = self.trailing.evaluate(&position, &bar);
        match decision {
            StopDecision::AwaitingVolatility { atr } => {
                warn!("ATR not usable ({:?}), skipping stop management", atr);
                Ok(CycleOutcome::AwaitingVolatility)
            }
            StopDecision::StopOut { stop, low } => {
                self.trailing.apply(&mut position, &decision);
                self.journal
                    .update_latest_open_position(position.current_stop, PositionStatus::ClosedByStop)?;
                info!("Position closed by stop: low {:.2} <= stop {:.2}", low, stop);

                let notified = self
                    .notify(exit_message(&self.message_context(), low, stop))
                    .await;
                Ok(CycleOutcome::StoppedOut {
                    stop,
                    low,
                    notified,
                })
            }
            StopDecision::Ratchet {
                previous,
                new_stop,
                notify,
            } => {
                self.trailing.apply(&mut position, &decision);
                self.journal
                    .update_latest_open_position(position.current_stop, PositionStatus::Open)?;
                info!("Trailing stop raised {:.2} -> {:.2}", previous, new_stop);

                let notified = if notify {
                    self.notify(stop_update_message(
                        &self.message_context(),
                        previous,
                        new_stop,
                        bar.close,
                    ))
                    .await
                } else {
                    debug!("Stop move below notification threshold");
                    false
                };
                Ok(CycleOutcome::Ratcheted {
                    previous,
                    new_stop,
                    notified,
                })
            }
            StopDecision::Hold { candidate } => Ok(CycleOutcome::Held {
                stop: position.current_stop,
                candidate,
            }),
        }
    }

    async fn notify(&self, text: String) -> bool {
        let delivered = self.notifier.send(&text).await;
        if !delivered {
            warn!("Notification not delivered; journal already updated");
        }
        delivered
    }

    fn message_context(&self) -> MessageContext<'_> {
        MessageContext {
            symbol: &self.market.symbol,
            timeframe: &self.market.lower_timeframe,
        }
    }
}
