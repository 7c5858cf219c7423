use oc_alert_bot::{bot::AlertBot, config::Config, server};
use rustls::crypto::CryptoProvider;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .with_thread_names(true)
        .with_level(true)
        .with_line_number(true)
        .init();

    if CryptoProvider::install_default(rustls::crypto::aws_lc_rs::default_provider()).is_err() {
        error!("A crypto provider was already installed");
    }

    info!("Option Chain Alert Bot");

    let config = match Config::new().await {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load config: {e:#}");
            return;
        }
    };
    info!(
        "Watching {} with strike step {}, cache at {:?}",
        config.symbol, config.strike_step, config.cache_path
    );
    if config.telegram_credentials().is_none() {
        info!("TELEGRAM_BOT_TOKEN / TELEGRAM_CHAT_ID not set, alerts will be skipped");
    }

    let bot = match AlertBot::new(&config) {
        Ok(bot) => bot,
        Err(e) => {
            error!("Failed to create bot: {e:#}");
            return;
        }
    };

    if let Err(e) = server::serve(&config.host, config.port, bot).await {
        error!("Server error: {e:#}");
    }
}
