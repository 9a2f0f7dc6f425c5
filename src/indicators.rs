//! Technical indicators
//!
//! Every function takes plain price slices and returns a series of the same
//! length. Values that are not yet defined because the indicator is still
//! warming up are `None`; consumers treat them as "no signal".
//!
//! Available indicators:
//! - Moving Averages: EMA (via the `ta` crate)
//! - Momentum: RSI with Wilder's smoothing
//! - Volatility: True Range, ATR with Wilder's smoothing
//! - Trend: SuperTrend direction

use serde::{Deserialize, Serialize};
use ta::indicators::ExponentialMovingAverage;
use ta::Next;

/// Binary state of a trend-direction oscillator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrendDirection {
    Up,
    Down,
}

impl std::fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrendDirection::Up => f.write_str("up"),
            TrendDirection::Down => f.write_str("down"),
        }
    }
}

// =============================================================================
// Moving Averages
// =============================================================================

/// Calculate Exponential Moving Average
///
/// Seeded with the simple average of the first `period` values at index
/// `period - 1`, then `EMA = k × value + (1 - k) × prev` with `k = 2 / (period + 1)`.
pub fn ema(values: &[f64], period: usize) -> Vec<Option<f64>> {
    if values.is_empty() || period == 0 {
        return vec![];
    }

    let mut result = vec![None; values.len()];
    if values.len() < period {
        return result;
    }

    let mut indicator = match ExponentialMovingAverage::new(period) {
        Ok(i) => i,
        Err(_) => return result,
    };

    // the first input initialises the ta average as-is
    let seed = values[..period].iter().sum::<f64>() / period as f64;
    result[period - 1] = Some(indicator.next(seed));

    for (i, &value) in values.iter().enumerate().skip(period) {
        result[i] = Some(indicator.next(value));
    }

    result
}

// =============================================================================
// Volatility Indicators
// =============================================================================

/// Calculate True Range
///
/// TR = max(high - low, |high - prev_close|, |low - prev_close|);
/// the first bar has no previous close and uses high - low.
pub fn true_range(high: &[f64], low: &[f64], close: &[f64]) -> Vec<f64> {
    let mut tr = Vec::with_capacity(high.len());

    for i in 0..high.len() {
        let tr_value = if i == 0 {
            high[i] - low[i]
        } else {
            let hl = high[i] - low[i];
            let hc = (high[i] - close[i - 1]).abs();
            let lc = (low[i] - close[i - 1]).abs();
            hl.max(hc).max(lc)
        };
        tr.push(tr_value);
    }

    tr
}

/// Apply Wilder's smoothing to a series
/// Wilder's smoothing: new_value = (prev_value * (period - 1) + current) / period
fn wilders_smooth(values: &[f64], period: usize) -> Vec<Option<f64>> {
    if values.is_empty() || period == 0 {
        return vec![];
    }

    let mut result = Vec::with_capacity(values.len());
    let mut smoothed: Option<f64> = None;

    for i in 0..values.len() {
        if i + 1 < period {
            result.push(None);
        } else if i + 1 == period {
            // First value is SMA
            let sum: f64 = values[0..period].iter().sum();
            smoothed = Some(sum / period as f64);
            result.push(smoothed);
        } else if let Some(prev) = smoothed {
            let new_val = (prev * (period - 1) as f64 + values[i]) / period as f64;
            smoothed = Some(new_val);
            result.push(smoothed);
        } else {
            result.push(None);
        }
    }

    result
}

/// Calculate Average True Range (ATR) using Wilder's smoothing
///
/// ATR = (prev_ATR * (period - 1) + current_TR) / period, seeded with the
/// simple average of the first `period` true ranges.
pub fn atr(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Vec<Option<f64>> {
    if high.is_empty() || period == 0 || high.len() != low.len() || high.len() != close.len() {
        return vec![];
    }

    let tr = true_range(high, low, close);
    wilders_smooth(&tr, period)
}

// =============================================================================
// Momentum Indicators
// =============================================================================

fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        if avg_gain == 0.0 {
            50.0
        } else {
            100.0
        }
    } else {
        let rs = avg_gain / avg_loss;
        100.0 - 100.0 / (1.0 + rs)
    }
}

/// Calculate RSI (Relative Strength Index) with Wilder's smoothing
///
/// The first value is defined at index `period` (it needs `period` price
/// changes). Output is bounded to [0, 100].
pub fn rsi(values: &[f64], period: usize) -> Vec<Option<f64>> {
    if values.is_empty() || period == 0 {
        return vec![];
    }

    let mut result = vec![None; values.len()];
    if values.len() <= period {
        return result;
    }

    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;
    for i in 1..=period {
        let change = values[i] - values[i - 1];
        if change > 0.0 {
            avg_gain += change;
        } else {
            avg_loss -= change;
        }
    }
    avg_gain /= period as f64;
    avg_loss /= period as f64;
    result[period] = Some(rsi_from_averages(avg_gain, avg_loss));

    for i in (period + 1)..values.len() {
        let change = values[i] - values[i - 1];
        let (gain, loss) = if change > 0.0 {
            (change, 0.0)
        } else {
            (0.0, -change)
        };
        avg_gain = (avg_gain * (period - 1) as f64 + gain) / period as f64;
        avg_loss = (avg_loss * (period - 1) as f64 + loss) / period as f64;
        result[i] = Some(rsi_from_averages(avg_gain, avg_loss));
    }

    result
}

// =============================================================================
// Trend Indicators
// =============================================================================

/// Calculate the SuperTrend direction series
///
/// Bands are `hl2 ± multiplier × ATR`. A close above the previous upper band
/// flips the trend up, a close below the previous lower band flips it down.
/// While the direction holds, the active band only tightens.
pub fn supertrend_direction(
    high: &[f64],
    low: &[f64],
    close: &[f64],
    period: usize,
    multiplier: f64,
) -> Vec<Option<TrendDirection>> {
    let atr_values = atr(high, low, close, period);
    let mut result = vec![None; atr_values.len()];

    let start = match atr_values.iter().position(Option::is_some) {
        Some(idx) => idx,
        None => return result,
    };

    let band = |i: usize, atr_val: f64| {
        let hl2 = (high[i] + low[i]) / 2.0;
        (hl2 + multiplier * atr_val, hl2 - multiplier * atr_val)
    };

    let (mut upper, mut lower) = match atr_values[start] {
        Some(a) => band(start, a),
        None => return result,
    };
    let mut direction = TrendDirection::Up;
    result[start] = Some(direction);

    for i in (start + 1)..close.len() {
        let Some(atr_val) = atr_values[i] else {
            continue;
        };
        let (basic_upper, basic_lower) = band(i, atr_val);

        if close[i] > upper {
            direction = TrendDirection::Up;
            upper = basic_upper;
            lower = basic_lower;
        } else if close[i] < lower {
            direction = TrendDirection::Down;
            upper = basic_upper;
            lower = basic_lower;
        } else {
            upper = match direction {
                TrendDirection::Down => basic_upper.min(upper),
                TrendDirection::Up => basic_upper,
            };
            lower = match direction {
                TrendDirection::Up => basic_lower.max(lower),
                TrendDirection::Down => basic_lower,
            };
        }

        result[i] = Some(direction);
    }

    result
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn trending(count: usize, start: f64, step: f64) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
        let close: Vec<f64> = (0..count).map(|i| start + step * i as f64).collect();
        let high = close.iter().map(|c| c + 1.5).collect();
        let low = close.iter().map(|c| c - 1.5).collect();
        (high, low, close)
    }

    #[test]
    fn test_ema() {
        let values = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let result = ema(&values, 3);

        assert_eq!(result[0], None);
        assert_eq!(result[1], None);
        assert!(result[2].is_some());
        let ema_val = result[4].unwrap();
        assert!(ema_val > 3.0 && ema_val < 5.0);
    }

    #[test]
    fn test_ema_seeded_with_simple_average() {
        // seed (1 + 2 + 3) / 3 = 2, k = 0.5: 0.5 * 4 + 0.5 * 2 = 3, then 0.5 * 5 + 0.5 * 3 = 4
        let result = ema(&[1.0, 2.0, 3.0, 4.0, 5.0], 3);
        assert_eq!(result, vec![None, None, Some(2.0), Some(3.0), Some(4.0)]);

        // seed (10 + 20) / 2 = 15, k = 2/3: 2/3 * 30 + 1/3 * 15 = 25
        let result = ema(&[10.0, 20.0, 30.0], 2);
        assert!((result[1].unwrap() - 15.0).abs() < 1e-9);
        assert!((result[2].unwrap() - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_ema_shorter_than_period() {
        assert_eq!(ema(&[1.0, 2.0], 3), vec![None, None]);
    }

    #[test]
    fn test_ema_empty_and_zero_period() {
        assert!(ema(&[], 3).is_empty());
        assert!(ema(&[1.0, 2.0], 0).is_empty());
    }

    #[test]
    fn test_true_range_uses_previous_close() {
        let high = vec![10.0, 12.0];
        let low = vec![9.0, 11.5];
        let close = vec![9.5, 12.0];

        let tr = true_range(&high, &low, &close);
        assert_eq!(tr[0], 1.0);
        // gap up: |12 - 9.5| dominates the 0.5 range
        assert_eq!(tr[1], 2.5);
    }

    #[test]
    fn test_atr() {
        let high = vec![10.0, 11.0, 12.0, 11.5, 12.0];
        let low = vec![9.0, 10.0, 11.0, 10.5, 11.0];
        let close = vec![9.5, 10.5, 11.5, 11.0, 11.5];

        let result = atr(&high, &low, &close, 3);

        assert_eq!(result[0], None);
        assert_eq!(result[1], None);
        // TR = [1.0, 1.5, 1.5] -> seed = 4/3
        assert!((result[2].unwrap() - 4.0 / 3.0).abs() < 1e-9);
        // TR[3] = max(1.0, 0.0, 1.0) = 1.0 -> (4/3 * 2 + 1) / 3
        assert!((result[3].unwrap() - (8.0 / 3.0 + 1.0) / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_atr_mismatched_lengths() {
        assert!(atr(&[1.0, 2.0], &[1.0], &[1.0, 2.0], 1).is_empty());
    }

    #[test]
    fn test_rsi_bounds_and_warmup() {
        let values = vec![
            44.0, 44.25, 44.5, 43.75, 44.5, 44.25, 44.0, 43.5, 44.0, 44.5, 45.0, 45.25, 45.5, 45.0,
            44.75, 45.5,
        ];
        let result = rsi(&values, 14);

        assert!(result[..14].iter().all(Option::is_none));
        for value in result[14..].iter() {
            let rsi_val = value.unwrap();
            assert!((0.0..=100.0).contains(&rsi_val));
        }
    }

    #[test]
    fn test_rsi_extremes() {
        let rising: Vec<f64> = (0..20).map(|i| 100.0 + i as f64).collect();
        assert_eq!(rsi(&rising, 14).last().copied().flatten(), Some(100.0));

        let flat = vec![100.0; 20];
        assert_eq!(rsi(&flat, 14).last().copied().flatten(), Some(50.0));

        let falling: Vec<f64> = (0..20).map(|i| 100.0 - i as f64).collect();
        assert_eq!(rsi(&falling, 14).last().copied().flatten(), Some(0.0));
    }

    #[test]
    fn test_rsi_too_short() {
        let result = rsi(&[1.0, 2.0, 3.0], 14);
        assert_eq!(result.len(), 3);
        assert!(result.iter().all(Option::is_none));
    }

    #[test]
    fn test_supertrend_uptrend() {
        let (high, low, close) = trending(40, 100.0, 2.0);
        let dirs = supertrend_direction(&high, &low, &close, 10, 3.0);

        assert!(dirs[..9].iter().all(Option::is_none));
        assert_eq!(dirs.last().copied().flatten(), Some(TrendDirection::Up));
    }

    #[test]
    fn test_supertrend_flips_down_on_sell_off() {
        let (mut high, mut low, mut close) = trending(30, 100.0, 1.0);
        let (h2, l2, c2) = trending(20, 125.0, -6.0);
        high.extend(h2);
        low.extend(l2);
        close.extend(c2);

        let dirs = supertrend_direction(&high, &low, &close, 10, 3.0);
        assert_eq!(dirs[29], Some(TrendDirection::Up));
        assert_eq!(dirs.last().copied().flatten(), Some(TrendDirection::Down));
    }

    #[test]
    fn test_supertrend_too_few_bars() {
        let dirs = supertrend_direction(&[105.0], &[95.0], &[102.0], 3, 2.0);
        assert_eq!(dirs, vec![None]);
    }
}
