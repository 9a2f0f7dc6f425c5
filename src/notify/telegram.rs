//! Telegram Bot API sink

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration as StdDuration;
use tracing::{debug, error, warn};

use super::{Notifier, NotifyError};
use crate::config::TelegramConfig;

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
}

#[derive(Debug, Clone)]
pub struct TelegramNotifier {
    client: Client,
    base_url: String,
    bot_token: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(
        bot_token: impl Into<String>,
        chat_id: impl Into<String>,
    ) -> Result<Self, NotifyError> {
        Self::with_base_url(TELEGRAM_API_BASE, bot_token, chat_id)
    }

    pub fn with_base_url(
        base_url: impl Into<String>,
        bot_token: impl Into<String>,
        chat_id: impl Into<String>,
    ) -> Result<Self, NotifyError> {
        let client = Client::builder()
            .timeout(StdDuration::from_secs(15))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            bot_token: bot_token.into(),
            chat_id: chat_id.into(),
        })
    }

    /// `None` when the token or chat id is missing
    pub fn from_config(config: &TelegramConfig) -> Option<Result<Self, NotifyError>> {
        config
            .credentials()
            .map(|(token, chat_id)| Self::new(token, chat_id))
    }

    async fn post(&self, text: &str) -> Result<(), NotifyError> {
        let url = format!("{}/bot{}/sendMessage", self.base_url, self.bot_token);
        let body = SendMessage {
            chat_id: &self.chat_id,
            text,
        };

        let response = self.client.post(&url).json(&body).send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Api { status, body });
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, text: &str) -> bool {
        if self.bot_token.is_empty() || self.chat_id.is_empty() {
            warn!("Telegram credentials missing, message not sent");
            return false;
        }

        match self.post(text).await {
            Ok(()) => {
                debug!("Telegram message sent ({} chars)", text.len());
                true
            }
            Err(e) => {
                // the token is part of the URL; never log the raw reqwest error
                let reason = match &e {
                    NotifyError::Request(req) if req.is_timeout() => "timeout".to_string(),
                    NotifyError::Request(_) => "transport failure".to_string(),
                    NotifyError::Api { status, body } => format!("HTTP {}: {}", status, body),
                };
                error!("Telegram send failed: {}", reason);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_requires_both_credentials() {
        let mut config = TelegramConfig::default();
        assert!(TelegramNotifier::from_config(&config).is_none());

        config.bot_token = Some("123:abc".to_string());
        assert!(TelegramNotifier::from_config(&config).is_none());

        config.chat_id = Some("42".to_string());
        assert!(matches!(
            TelegramNotifier::from_config(&config),
            Some(Ok(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_credentials_report_failure() {
        let notifier = TelegramNotifier::new("", "42").unwrap();
        assert!(!notifier.send("hello").await);
    }
}
