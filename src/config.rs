use crate::error::ConfigError;
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::time::Duration;

pub const BOT_TOKEN_VAR: &str = "TELEGRAM_BOT_TOKEN";
pub const CHAT_ID_VAR: &str = "TELEGRAM_CHAT_ID";

#[derive(Debug, Deserialize)]
struct ConfigFile {
    tickers: Vec<String>,
    drop_percent: f64,
    #[serde(default = "default_request_timeout_secs")]
    request_timeout_secs: u64,
}

fn default_request_timeout_secs() -> u64 {
    15
}

/// Validated run configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Ticker symbols, uppercased, in evaluation order
    pub tickers: Vec<String>,
    /// Alert threshold (e.g., 20.0 = 20% below the high)
    pub drop_percent: f64,
    /// Upper bound on every outbound request
    pub request_timeout: Duration,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let file: ConfigFile = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_file(file)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = serde_json::from_str(text).map_err(|source| ConfigError::Parse {
            path: "<inline>".into(),
            source,
        })?;
        Self::from_file(file)
    }

    fn from_file(file: ConfigFile) -> Result<Self, ConfigError> {
        let mut seen = HashSet::new();
        let mut tickers = Vec::with_capacity(file.tickers.len());
        for raw in &file.tickers {
            let ticker = raw.trim().to_uppercase();
            if ticker.is_empty() {
                continue;
            }
            if !is_valid_ticker(&ticker) {
                return Err(ConfigError::InvalidTicker(raw.clone()));
            }
            if seen.insert(ticker.clone()) {
                tickers.push(ticker);
            }
        }
        if tickers.is_empty() {
            return Err(ConfigError::NoTickers);
        }

        let drop_percent = file.drop_percent;
        if !drop_percent.is_finite() || drop_percent <= 0.0 || drop_percent >= 100.0 {
            return Err(ConfigError::InvalidDropPercent(drop_percent));
        }

        if file.request_timeout_secs == 0 {
            return Err(ConfigError::InvalidTimeout);
        }

        Ok(Self {
            tickers,
            drop_percent,
            request_timeout: Duration::from_secs(file.request_timeout_secs),
        })
    }
}

// Letters and digits, plus the punctuation Yahoo uses for share classes,
// indices and FX pairs (BRK-B, ^GSPC, EURUSD=X, RDS.A).
fn is_valid_ticker(ticker: &str) -> bool {
    ticker
        .chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || matches!(c, '.' | '-' | '^' | '='))
}

/// Credentials for the Telegram bot.
#[derive(Clone)]
pub struct TelegramSecrets {
    pub bot_token: String,
    pub chat_id: String,
}

impl TelegramSecrets {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &'static str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or(ConfigError::MissingSecret(key))
        };

        Ok(Self {
            bot_token: read(BOT_TOKEN_VAR)?,
            chat_id: read(CHAT_ID_VAR)?,
        })
    }
}

impl fmt::Debug for TelegramSecrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramSecrets")
            .field("bot_token", &"<redacted>")
            .field("chat_id", &self.chat_id)
            .finish()
    }
}
