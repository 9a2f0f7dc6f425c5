//! Binance API client for fetching kline (candlestick) data
//!
//! No API key required for public market data endpoints.
//!
//! # Example
//! ```no_run
//! use swing_sentinel::binance::BinanceClient;
//! use swing_sentinel::data::MarketData;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = BinanceClient::new()?;
//!     let candles = client.fetch_candles("BTCUSDT", "4h", 120).await?;
//!     println!("Fetched {} closed candles", candles.len());
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use std::time::Duration as StdDuration;
use tracing::debug;

use super::types::{is_valid_interval, BinanceKline};
use crate::data::{prepare_candles, MarketData, MarketDataError};
use crate::Candle;

/// Base URL for Binance API
const BINANCE_API_BASE: &str = "https://api.binance.com/api/v3";

/// Maximum klines per request (Binance limit)
const MAX_KLINES_PER_REQUEST: u32 = 1000;

/// Binance API client
#[derive(Debug, Clone)]
pub struct BinanceClient {
    client: Client,
    base_url: String,
}

impl BinanceClient {
    /// Create a new Binance client
    pub fn new() -> Result<Self, MarketDataError> {
        Self::with_base_url(BINANCE_API_BASE)
    }

    /// Create a client against another endpoint (mirrors, testnets)
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, MarketDataError> {
        let client = Client::builder()
            .timeout(StdDuration::from_secs(30))
            .build()?;

        Ok(BinanceClient {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Fetch raw klines (candlestick data) from Binance
    ///
    /// # Arguments
    /// * `symbol` - Binance trading pair (e.g., "BTCUSDT")
    /// * `interval` - Timeframe (e.g., "4h", "1d")
    /// * `limit` - Number of klines to fetch (max 1000)
    pub async fn get_klines(
        &self,
        symbol: &str,
        interval: &str,
        limit: u32,
    ) -> Result<Vec<BinanceKline>, MarketDataError> {
        if !is_valid_interval(interval) {
            return Err(MarketDataError::UnsupportedTimeframe(interval.to_string()));
        }

        let url = format!("{}/klines", self.base_url);
        let limit = limit.clamp(1, MAX_KLINES_PER_REQUEST);
        let params = [
            ("symbol", symbol.to_string()),
            ("interval", interval.to_string()),
            ("limit", limit.to_string()),
        ];

        debug!(
            "Fetching klines: symbol={}, interval={}, limit={}",
            symbol, interval, limit
        );

        let response = self.client.get(&url).query(&params).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(MarketDataError::Api { status, body });
        }

        let raw_data: Vec<Vec<serde_json::Value>> = response.json().await?;

        raw_data
            .iter()
            .map(|row| {
                BinanceKline::from_raw(row)
                    .ok_or_else(|| MarketDataError::Malformed(format!("kline row {:?}", row)))
            })
            .collect()
    }
}

#[async_trait]
impl MarketData for BinanceClient {
    async fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: &str,
        limit: u32,
    ) -> Result<Vec<Candle>, MarketDataError> {
        // one extra row: the newest kline is usually still forming
        let klines = self.get_klines(symbol, timeframe, limit.saturating_add(1)).await?;
        let now_ms = Utc::now().timestamp_millis();

        let mut candles = klines
            .iter()
            .filter(|k| k.is_closed_at(now_ms))
            .map(|k| {
                k.to_candle().ok_or_else(|| {
                    MarketDataError::Malformed(format!("open time {}", k.open_time))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let excess = candles.len().saturating_sub(limit as usize);
        candles.drain(..excess);

        if candles.is_empty() {
            return Err(MarketDataError::Empty {
                symbol: symbol.to_string(),
                timeframe: timeframe.to_string(),
            });
        }

        debug!(
            "{} {}: {} closed candles (of {} fetched)",
            symbol,
            timeframe,
            candles.len(),
            klines.len()
        );

        prepare_candles(candles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = BinanceClient::with_base_url("https://example.invalid/api/v3/").unwrap();
        assert_eq!(client.base_url, "https://example.invalid/api/v3");
    }

    #[tokio::test]
    async fn test_unsupported_interval_fails_before_request() {
        let client = BinanceClient::with_base_url("https://example.invalid").unwrap();
        let err = client.get_klines("BTCUSDT", "2d", 10).await.unwrap_err();
        assert!(matches!(err, MarketDataError::UnsupportedTimeframe(tf) if tf == "2d"));
    }
}
