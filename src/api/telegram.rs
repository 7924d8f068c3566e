use super::Notifier;
use crate::config::TelegramSecrets;
use crate::error::{ConfigError, NotifyError};
use log::debug;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

const TELEGRAM_API_URL: &str = "https://api.telegram.org";

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    description: Option<String>,
}

/// Sends alerts through the Telegram Bot API.
pub struct TelegramNotifier {
    client: Client,
    endpoint: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(secrets: TelegramSecrets, timeout: Duration) -> Result<Self, ConfigError> {
        Self::with_base_url(TELEGRAM_API_URL, secrets, timeout)
    }

    pub fn with_base_url(
        base_url: &str,
        secrets: TelegramSecrets,
        timeout: Duration,
    ) -> Result<Self, ConfigError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ConfigError::HttpClient)?;

        Ok(Self {
            client,
            endpoint: format!(
                "{}/bot{}/sendMessage",
                base_url.trim_end_matches('/'),
                secrets.bot_token
            ),
            chat_id: secrets.chat_id,
        })
    }
}

impl Notifier for TelegramNotifier {
    async fn send(&self, text: &str) -> Result<(), NotifyError> {
        debug!("Sending Telegram message to chat {}", self.chat_id);

        let response = self
            .client
            .post(&self.endpoint)
            .form(&[("chat_id", self.chat_id.as_str()), ("text", text)])
            .send()
            .await
            .map_err(|e| NotifyError::Request(e.without_url()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| NotifyError::Request(e.without_url()))?;

        check_response(status.as_u16(), &body)
    }
}

fn check_response(status: u16, body: &str) -> Result<(), NotifyError> {
    let parsed = serde_json::from_str::<ApiResponse>(body).ok();
    let accepted = (200..300).contains(&status) && parsed.as_ref().map_or(true, |r| r.ok);
    if accepted {
        return Ok(());
    }

    let description = parsed
        .and_then(|r| r.description)
        .unwrap_or_else(|| body.chars().take(200).collect());
    Err(NotifyError::Rejected {
        status,
        description,
    })
}
