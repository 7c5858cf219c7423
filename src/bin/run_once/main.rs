use clap::Parser;
use oc_alert_bot::{
    bot::{AlertBot, RunOptions},
    config::Config,
};
use rustls::crypto::CryptoProvider;
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Run a single fetch, compare and notify cycle, for cron style scheduling.
#[derive(Parser)]
#[command(name = "run_once", version, about)]
struct Args {
    /// Run even when the market is closed
    #[arg(long)]
    force: bool,

    /// Compute and update the cache without sending the alert
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .with_line_number(true)
        .with_writer(std::io::stderr)
        .init();

    if CryptoProvider::install_default(rustls::crypto::aws_lc_rs::default_provider()).is_err() {
        error!("A crypto provider was already installed");
    }

    let config = match Config::new().await {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    let bot = match AlertBot::new(&config) {
        Ok(bot) => bot,
        Err(e) => {
            eprintln!("Failed to create bot: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    let report = bot
        .run_once(RunOptions {
            force: args.force,
            dry_run: args.dry_run,
        })
        .await;

    match serde_json::to_string_pretty(&report) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("Failed to serialize report: {e}"),
    }

    let skipped = !report.market_open && !args.force;
    if report.ok || skipped {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
