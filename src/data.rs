//! Market data collaborator
//!
//! The cycle only needs ordered closed candles per timeframe. Any source that
//! can produce them implements [`MarketData`]; [`prepare_candles`] normalises
//! whatever comes back before indicators see it.

use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;

use crate::{Candle, CandleValidationError};

#[derive(Debug, Error)]
pub enum MarketDataError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("exchange API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("unsupported timeframe '{0}'")]
    UnsupportedTimeframe(String),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("no candles returned for {symbol} {timeframe}")]
    Empty { symbol: String, timeframe: String },

    #[error("invalid candle at {index}: {source}")]
    InvalidCandle {
        index: usize,
        #[source]
        source: CandleValidationError,
    },
}

/// Source of closed OHLCV candles, ascending by time
#[async_trait]
pub trait MarketData: Send + Sync {
    /// Fetch up to `limit` most recent closed candles
    async fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: &str,
        limit: u32,
    ) -> Result<Vec<Candle>, MarketDataError>;
}

/// Sort ascending, drop duplicate timestamps and reject invalid candles
pub fn prepare_candles(mut candles: Vec<Candle>) -> Result<Vec<Candle>, MarketDataError> {
    let before = candles.len();
    candles.sort_by_key(|c| c.datetime);
    candles.dedup_by_key(|c| c.datetime);
    if candles.len() != before {
        warn!("Dropped {} duplicate candles", before - candles.len());
    }

    for (index, candle) in candles.iter().enumerate() {
        candle
            .validate()
            .map_err(|source| MarketDataError::InvalidCandle { index, source })?;
    }

    Ok(candles)
}
