use clap::Parser;
use drawdown_watch::api::yahoo::YahooClient;
use drawdown_watch::config::Config;
use drawdown_watch::error::TrackerError;
use drawdown_watch::tracker::{self, RunSummary};
use env_logger::Builder;
use log::{error, info, LevelFilter};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

/// Alert when tracked tickers fall a set percentage below their all-time high
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the config document (tickers, drop_percent)
    #[arg(long, env = "DRAWDOWN_WATCH_CONFIG", default_value = "config.json")]
    config: PathBuf,

    /// Path to the stored high-water marks
    #[arg(long, env = "DRAWDOWN_WATCH_HIGHS", default_value = "data/highs.json")]
    highs: PathBuf,

    /// Log alerts instead of sending them; Telegram credentials are not required
    #[arg(long)]
    dry_run: bool,

    /// Enable debug logging for this crate
    #[arg(short, long)]
    verbose: bool,
}

fn init_logger(verbose: bool) {
    let crate_level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let mut builder = Builder::new();
    builder
        .filter_level(LevelFilter::Warn)
        .filter_module("drawdown_watch", crate_level);
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }
    builder
        .format(|buf, record| {
            let ts = chrono::Local::now().format("%H:%M:%S%.3f");
            writeln!(
                buf,
                "[{} {:<5} {}] {}",
                ts,
                record.level(),
                record.target(),
                record.args()
            )
        })
        .target(env_logger::Target::Stderr)
        .init();
}

async fn run(args: &Args) -> Result<RunSummary, TrackerError> {
    let config = Config::load(&args.config)?;
    let source = YahooClient::new(config.request_timeout)?;

    tracker::run(&config, &args.highs, &source, args.dry_run, |key| {
        std::env::var(key).ok()
    })
    .await
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    let args = Args::parse();
    init_logger(args.verbose);

    info!("Starting drawdown-watch...");

    match run(&args).await {
        Ok(summary) => {
            info!("Run complete: {}", summary);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
