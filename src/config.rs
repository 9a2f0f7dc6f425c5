//! Configuration management
//!
//! Configuration is assembled once at startup: built-in defaults, then an
//! optional JSON file, then `.env` / environment overrides for the risk
//! parameters and notification credentials. The resulting [`Config`] is
//! passed by reference to the cycle; nothing reads it from globals.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::risk::RiskParameters;
use crate::series::IndicatorEngine;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub market: MarketConfig,
    pub strategy: StrategyConfig,
    pub risk: RiskConfig,
    pub journal: JournalConfig,
    pub telegram: TelegramConfig,
    pub schedule: ScheduleConfig,
}

impl Config {
    /// Load configuration: defaults, then the JSON file (if any), then the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Config::default(),
        };

        dotenv::dotenv().ok();
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config =
            serde_json::from_str(&contents).context("Failed to parse config JSON")?;
        Ok(config)
    }

    /// Apply environment overrides through `lookup`
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let parse_f64 = |key: &str| -> Result<Option<f64>> {
            match lookup(key) {
                Some(raw) if !raw.trim().is_empty() => raw
                    .trim()
                    .parse::<f64>()
                    .map(Some)
                    .with_context(|| format!("{} must be a number, got '{}'", key, raw)),
                _ => Ok(None),
            }
        };

        if let Some(capital) = parse_f64("RISK_CAPITAL")? {
            self.risk.capital = capital;
        }
        if let Some(fraction) = parse_f64("RISK_FRACTION")? {
            self.risk.risk_fraction = fraction;
        }
        if let Some(budget) = parse_f64("RISK_BUDGET")? {
            self.risk.risk_budget = Some(budget);
        }
        if let Some(symbol) = lookup("SWING_SYMBOL").filter(|s| !s.trim().is_empty()) {
            self.market.symbol = symbol.trim().to_uppercase();
        }
        if let Some(token) = lookup("TELEGRAM_BOT_TOKEN").filter(|s| !s.trim().is_empty()) {
            self.telegram.bot_token = Some(token);
        }
        if let Some(chat_id) = lookup("TELEGRAM_CHAT_ID").filter(|s| !s.trim().is_empty()) {
            self.telegram.chat_id = Some(chat_id);
        }

        Ok(())
    }

    /// Reject configurations the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        let s = &self.strategy;
        let periods = [
            ("ema_period", s.ema_period),
            ("rsi_period", s.rsi_period),
            ("atr_period", s.atr_period),
            ("supertrend_period", s.supertrend_period),
            ("stop_lookback", s.stop_lookback),
        ];
        for (name, value) in periods {
            if value == 0 {
                bail!("strategy.{} must be greater than zero", name);
            }
        }
        if s.supertrend_multiplier <= 0.0 || s.trailing_atr_multiple <= 0.0 {
            bail!("ATR multipliers must be positive");
        }
        if !(0.0..=100.0).contains(&s.rsi_cross_level) {
            bail!("strategy.rsi_cross_level must be within 0..=100");
        }
        if s.notify_threshold < 0.0 {
            bail!("strategy.notify_threshold must not be negative");
        }
        if self.market.lower_timeframe == self.market.higher_timeframe {
            bail!("lower and higher timeframes must differ");
        }
        if self.schedule.interval_secs == 0 {
            bail!("schedule.interval_secs must be greater than zero");
        }

        let engine = IndicatorEngine::new(s.clone());
        let lower_min = engine.lower_min_candles();
        let higher_min = engine.higher_min_candles();
        if (self.market.lower_limit as usize) < lower_min {
            bail!(
                "market.lower_limit {} is below the {} candles the indicators need",
                self.market.lower_limit,
                lower_min
            );
        }
        if (self.market.higher_limit as usize) < higher_min {
            bail!(
                "market.higher_limit {} is below the {} candles the trend filter needs",
                self.market.higher_limit,
                higher_min
            );
        }

        self.risk.parameters().map(|_| ())
    }
}

/// Instrument and data-source settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketConfig {
    pub symbol: String,
    pub lower_timeframe: String,
    pub higher_timeframe: String,
    pub lower_limit: u32,
    pub higher_limit: u32,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            symbol: "BTCUSDT".to_string(),
            lower_timeframe: "4h".to_string(),
            higher_timeframe: "1d".to_string(),
            lower_limit: 120,
            higher_limit: 250,
        }
    }
}

/// Rule lookbacks and thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    /// EMA period for the lower-timeframe trend line (default: 50)
    pub ema_period: usize,
    /// RSI period (default: 14)
    pub rsi_period: usize,
    /// RSI must cross strictly above this level (default: 45)
    pub rsi_cross_level: f64,
    /// ATR period for the trailing distance (default: 14)
    pub atr_period: usize,
    /// Higher-timeframe SuperTrend ATR period (default: 10)
    pub supertrend_period: usize,
    /// Higher-timeframe SuperTrend band multiplier (default: 3.0)
    pub supertrend_multiplier: f64,
    /// Candles whose lowest low forms the structural stop (default: 3)
    pub stop_lookback: usize,
    /// Trailing stop = close - multiple × ATR (default: 3.0)
    pub trailing_atr_multiple: f64,
    /// Minimum relative stop move worth a notification (default: 0.005)
    pub notify_threshold: f64,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            ema_period: 50,
            rsi_period: 14,
            rsi_cross_level: 45.0,
            atr_period: 14,
            supertrend_period: 10,
            supertrend_multiplier: 3.0,
            stop_lookback: 3,
            trailing_atr_multiple: 3.0,
            notify_threshold: 0.005,
        }
    }
}

/// Risk budget inputs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub capital: f64,
    pub risk_fraction: f64,
    /// Absolute budget in currency units, overrides capital × fraction
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_budget: Option<f64>,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            capital: 500.0,
            risk_fraction: 0.01,
            risk_budget: None,
        }
    }
}

impl RiskConfig {
    pub fn parameters(&self) -> Result<RiskParameters> {
        Ok(RiskParameters::new(
            self.capital,
            self.risk_fraction,
            self.risk_budget,
        )?)
    }
}

/// Journal backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum JournalBackend {
    Csv,
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JournalConfig {
    pub backend: JournalBackend,
    pub path: PathBuf,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            backend: JournalBackend::Csv,
            path: PathBuf::from("journal_trading.csv"),
        }
    }
}

/// Notification credentials, never written back out
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    #[serde(skip_serializing)]
    pub bot_token: Option<String>,
    #[serde(skip_serializing)]
    pub chat_id: Option<String>,
}

impl TelegramConfig {
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (self.bot_token.as_deref(), self.chat_id.as_deref()) {
            (Some(token), Some(chat)) => Some((token, chat)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Pause between the end of one cycle and the start of the next
    pub interval_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_secs: 4 * 3600,
        }
    }
}
