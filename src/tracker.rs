//! One pass over the configured tickers.
//!
//! The pass owns the high-water marks for its duration: they come in as a
//! value and go back out updated, so the caller decides when to persist them.

use crate::api::dry_run::LogNotifier;
use crate::api::telegram::TelegramNotifier;
use crate::api::{Notifier, Price, PriceSource};
use crate::config::{Config, TelegramSecrets};
use crate::error::TrackerError;
use crate::store::{self, HighWaterMarks, Observation};
use chrono::{DateTime, SecondsFormat, Utc};
use log::{error, info, warn};
use std::fmt;
use std::path::Path;

// Absorbs float rounding so a drop that is mathematically equal to the
// threshold still fires (0.01 -> 0.009 computes as 9.99999999999999 at 10%).
// Drops within 1e-9 points below the threshold fire as well.
const THRESHOLD_TOLERANCE: f64 = 1e-9;

/// Percentage decline of `price` from `high`, within `[0, 100]`.
pub fn drop_percent(high: f64, price: f64) -> f64 {
    ((high - price) / high * 100.0).clamp(0.0, 100.0)
}

fn breaches(drop: f64, threshold: f64) -> bool {
    drop + THRESHOLD_TOLERANCE >= threshold
}

/// A ticker that has fallen at least the configured percentage below its high.
#[derive(Debug, Clone, PartialEq)]
pub struct DropAlert {
    pub ticker: String,
    pub price: Price,
    pub high: f64,
    pub drop_percent: f64,
    pub threshold: f64,
    pub at: DateTime<Utc>,
}

impl fmt::Display for DropAlert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} is {:.2}% below its high (threshold {}%).",
            self.ticker, self.drop_percent, self.threshold
        )?;
        writeln!(f, "Price: {}", self.price)?;
        writeln!(f, "High: {:.2}", self.high)?;
        write!(
            f,
            "Time (UTC): {}",
            self.at.to_rfc3339_opts(SecondsFormat::Secs, true)
        )
    }
}

/// What a pass did, for the end-of-run log line and for tests.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub priced: usize,
    pub first_sightings: usize,
    pub new_highs: usize,
    /// Tickers that could not be priced, with the reason
    pub skipped: Vec<(String, String)>,
    pub alerts_sent: Vec<DropAlert>,
    /// Alerts that fired but could not be delivered, with the reason
    pub alerts_failed: Vec<(DropAlert, String)>,
}

impl RunSummary {
    pub fn alerts_fired(&self) -> usize {
        self.alerts_sent.len() + self.alerts_failed.len()
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} priced, {} skipped, {} first sightings, {} new highs, {} alerts sent, {} alerts failed",
            self.priced,
            self.skipped.len(),
            self.first_sightings,
            self.new_highs,
            self.alerts_sent.len(),
            self.alerts_failed.len()
        )
    }
}

/// Price every configured ticker once, update the marks, and send alerts.
///
/// Fetch and notification failures are logged and recorded in the summary;
/// they never stop the pass.
pub async fn run_pass<S, N>(
    config: &Config,
    mut marks: HighWaterMarks,
    source: &S,
    notifier: &N,
) -> (HighWaterMarks, RunSummary)
where
    S: PriceSource,
    N: Notifier,
{
    let mut summary = RunSummary::default();

    for ticker in &config.tickers {
        let price = match source.fetch(ticker).await {
            Ok(price) => price,
            Err(e) => {
                warn!("{}: failed to fetch price: {}", ticker, e);
                summary.skipped.push((ticker.clone(), e.to_string()));
                continue;
            }
        };
        summary.priced += 1;

        let high = match marks.observe(ticker, price) {
            Observation::First => {
                info!("{}: initial high set to {}", ticker, price);
                summary.first_sightings += 1;
                price.value()
            }
            Observation::NewHigh { previous } => {
                info!("{}: new high {} (prev {:.2})", ticker, price, previous);
                summary.new_highs += 1;
                price.value()
            }
            Observation::Below { high } => high,
        };

        let drop = drop_percent(high, price.value());
        if !breaches(drop, config.drop_percent) {
            info!("{}: price {}, high {:.2}, drop {:.2}%", ticker, price, high, drop);
            continue;
        }

        let alert = DropAlert {
            ticker: ticker.clone(),
            price,
            high,
            drop_percent: drop,
            threshold: config.drop_percent,
            at: Utc::now(),
        };

        match notifier.send(&alert.to_string()).await {
            Ok(()) => {
                info!("{}: alert sent (price {}, high {:.2}, drop {:.2}%)", ticker, price, high, drop);
                summary.alerts_sent.push(alert);
            }
            Err(e) => {
                error!("{}: failed to send alert: {}", ticker, e);
                summary.alerts_failed.push((alert, e.to_string()));
            }
        }
    }

    (marks, summary)
}

/// Load the stored highs, run one pass, and write the highs back.
///
/// The store is saved on every run, alerts or not. Only a failed save is an
/// error; an unreadable store degrades to an empty one.
pub async fn run_and_persist<S, N>(
    config: &Config,
    highs_path: &Path,
    source: &S,
    notifier: &N,
) -> Result<RunSummary, TrackerError>
where
    S: PriceSource,
    N: Notifier,
{
    let marks = store::load(highs_path);
    info!(
        "Tracking {} tickers against {} stored highs (alert at {}% below high)",
        config.tickers.len(),
        marks.len(),
        config.drop_percent
    );

    let (marks, summary) = run_pass(config, marks, source, notifier).await;

    store::save(highs_path, &marks)?;
    info!("Saved {} highs to {}", marks.len(), highs_path.display());

    Ok(summary)
}

/// A complete run: choose the notifier, then track and persist.
///
/// Telegram credentials are resolved through `lookup` before any price is
/// fetched, so a run without them fails without touching the store. With
/// `dry_run` alerts are logged and no credentials are needed.
pub async fn run<S, F>(
    config: &Config,
    highs_path: &Path,
    source: &S,
    dry_run: bool,
    lookup: F,
) -> Result<RunSummary, TrackerError>
where
    S: PriceSource,
    F: Fn(&str) -> Option<String>,
{
    if dry_run {
        info!("Dry run: alerts will be logged, not sent");
        return run_and_persist(config, highs_path, source, &LogNotifier::new()).await;
    }

    let secrets = TelegramSecrets::from_lookup(lookup)?;
    let notifier = TelegramNotifier::new(secrets, config.request_timeout)?;
    run_and_persist(config, highs_path, source, &notifier).await
}
