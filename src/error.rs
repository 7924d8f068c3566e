use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("config must include a non-empty 'tickers' list")]
    NoTickers,

    #[error("invalid ticker symbol {0:?}")]
    InvalidTicker(String),

    #[error("'drop_percent' must be greater than 0 and less than 100, got {0}")]
    InvalidDropPercent(f64),

    #[error("'request_timeout_secs' must be at least 1")]
    InvalidTimeout,

    #[error("invalid base URL {0:?}")]
    InvalidBaseUrl(String),

    #[error("missing environment variable {0}")]
    MissingSecret(&'static str),

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("JSON encoding error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("HTTP {0}")]
    Status(u16),

    #[error("unknown ticker: {0}")]
    UnknownTicker(String),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("no price data returned")]
    NoPrice,
}

#[derive(Error, Debug)]
pub enum NotifyError {
    // Built with the URL stripped; the bot token lives in the path.
    #[error("request failed: {0}")]
    Request(#[source] reqwest::Error),

    #[error("Telegram error {status}: {description}")]
    Rejected { status: u16, description: String },
}

/// Failures that end a run with a nonzero exit status.
#[derive(Error, Debug)]
pub enum TrackerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
