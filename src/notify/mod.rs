//! Operator notifications
//!
//! The sink is fire-and-forget: [`Notifier::send`] reports success as a bool
//! and never fails the caller. Journal writes happen before any send, so a
//! lost message never rolls back state.

mod telegram;

pub use telegram::TelegramNotifier;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::TelegramConfig;
use crate::Position;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("notification API error {status}: {body}")]
    Api { status: u16, body: String },
}

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver `text`; `false` when it could not be delivered
    async fn send(&self, text: &str) -> bool;
}

/// Writes notifications to the log only
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, text: &str) -> bool {
        info!("Notification:\n{}", text);
        true
    }
}

/// Telegram when configured, otherwise the log
pub fn build_notifier(config: &TelegramConfig) -> Box<dyn Notifier> {
    match TelegramNotifier::from_config(config) {
        Some(Ok(notifier)) => Box::new(notifier),
        Some(Err(e)) => {
            warn!("Telegram client unavailable ({}), logging notifications", e);
            Box::new(LogNotifier)
        }
        None => {
            warn!("Telegram credentials missing, logging notifications");
            Box::new(LogNotifier)
        }
    }
}

/// Context shared by every message
#[derive(Debug, Clone)]
pub struct MessageContext<'a> {
    pub symbol: &'a str,
    pub timeframe: &'a str,
}

pub fn entry_message(ctx: &MessageContext<'_>, position: &Position) -> String {
    format!(
        "🚀 NEW LONG {} ({})\n\
         📅 Date: {} UTC\n\
         💰 Entry: {:.2}\n\
         🛑 Initial stop: {:.2}\n\
         📈 Current stop (trailing): {:.2}\n\
         📐 Size: {:.8}\n\
         ⚠️ Risk: {:.2}\n\
         ❌ Loss at stop: {:.2}\n\n\
         No fixed target: the exit is the trailing stop only.",
        ctx.symbol,
        ctx.timeframe,
        position.opened_at.format("%Y-%m-%d %H:%M:%S"),
        position.entry_price,
        position.initial_stop,
        position.current_stop,
        position.size,
        position.risk_budget,
        position.theoretical_loss,
    )
}

pub fn stop_update_message(
    ctx: &MessageContext<'_>,
    previous_stop: f64,
    new_stop: f64,
    current_price: f64,
) -> String {
    format!(
        "🔄 {} trailing stop raised\n\
         Old stop: {:.2}\n\
         New stop: {:.2}\n\
         Current price: {:.2}",
        ctx.symbol, previous_stop, new_stop, current_price
    )
}

pub fn exit_message(ctx: &MessageContext<'_>, low: f64, stop: f64) -> String {
    format!(
        "🛑 {} STOPPED OUT ({})\n\
         Price ({:.2}) touched the trailing stop ({:.2}).\n\n\
         Close the position manually.",
        ctx.symbol, ctx.timeframe, low, stop
    )
}
