//! Binance API types for klines (candlestick) data

use chrono::DateTime;

use crate::Candle;

/// Binance kline/candlestick data
/// API returns an array: [open_time, open, high, low, close, volume, close_time,
///                        quote_volume, trades, taker_buy_base, taker_buy_quote, ignore]
#[derive(Debug, Clone, PartialEq)]
pub struct BinanceKline {
    pub open_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub close_time: i64,
}

impl BinanceKline {
    /// Parse from raw JSON array returned by Binance API
    pub fn from_raw(raw: &[serde_json::Value]) -> Option<Self> {
        if raw.len() < 7 {
            return None;
        }

        Some(BinanceKline {
            open_time: raw[0].as_i64()?,
            open: raw[1].as_str()?.parse().ok()?,
            high: raw[2].as_str()?.parse().ok()?,
            low: raw[3].as_str()?.parse().ok()?,
            close: raw[4].as_str()?.parse().ok()?,
            volume: raw[5].as_str()?.parse().ok()?,
            close_time: raw[6].as_i64()?,
        })
    }

    /// A kline is closed once its close time has passed
    pub fn is_closed_at(&self, now_ms: i64) -> bool {
        self.close_time < now_ms
    }

    pub fn to_candle(&self) -> Option<Candle> {
        let datetime = DateTime::from_timestamp_millis(self.open_time)?;
        Some(Candle::new(
            datetime,
            self.open,
            self.high,
            self.low,
            self.close,
            self.volume,
        ))
    }
}

/// Valid Binance intervals
pub const BINANCE_INTERVALS: &[&str] = &[
    "1m", "3m", "5m", "15m", "30m", "1h", "2h", "4h", "6h", "8h", "12h", "1d", "3d", "1w", "1M",
];

/// Check if interval is valid for Binance
pub fn is_valid_interval(interval: &str) -> bool {
    BINANCE_INTERVALS.contains(&interval)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_raw_kline() {
        let raw = json!([
            1_700_000_000_000i64,
            "36000.10",
            "36500.00",
            "35800.50",
            "36200.00",
            "123.456",
            1_700_014_399_999i64,
            "0",
            10,
            "0",
            "0",
            "0"
        ]);
        let kline = BinanceKline::from_raw(raw.as_array().unwrap()).unwrap();

        assert_eq!(kline.open_time, 1_700_000_000_000);
        assert_eq!(kline.low, 35800.5);
        assert!(kline.is_closed_at(1_700_014_400_000));
        assert!(!kline.is_closed_at(1_700_010_000_000));

        let candle = kline.to_candle().unwrap();
        assert_eq!(candle.datetime.timestamp_millis(), 1_700_000_000_000);
        assert_eq!(candle.close, 36200.0);
    }

    #[test]
    fn test_parse_rejects_short_or_non_numeric_rows() {
        let short = json!([1, "1", "2"]);
        assert!(BinanceKline::from_raw(short.as_array().unwrap()).is_none());

        let bad = json!([1, "x", "2", "1", "1", "1", 2]);
        assert!(BinanceKline::from_raw(bad.as_array().unwrap()).is_none());
    }

    #[test]
    fn test_valid_intervals() {
        assert!(is_valid_interval("4h"));
        assert!(is_valid_interval("1d"));
        assert!(!is_valid_interval("2d"));
    }
}
