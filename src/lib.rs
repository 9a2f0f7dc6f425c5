//! Swing Sentinel
//!
//! A single-instrument swing-trading decision engine. Each cycle reads closed
//! candles on two timeframes, decides whether to open a long position or how
//! to manage the open one, journals the decision and notifies the operator.
//! It never places orders.

pub mod binance;
pub mod config;
pub mod cycle;
pub mod data;
pub mod indicators;
pub mod journal;
pub mod notify;
pub mod risk;
pub mod series;
pub mod signal;
pub mod trailing;
pub mod types;

pub use config::Config;
pub use cycle::{CycleError, CycleOutcome, SwingCycle};
pub use types::*;
