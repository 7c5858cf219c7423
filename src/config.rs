use anyhow::{Context, Result, bail};
use serde::Deserialize;
use tokio::fs;
use tracing::{debug, info};

use super::{APP_CONFIG, APP_DIR};
use std::{env, path::PathBuf};

const DEFAULT_SYMBOL: &str = "NIFTY";
const DEFAULT_STRIKE_STEP: i64 = 50;
const DEFAULT_CACHE_PATH: &str = "/tmp/oc_cache.json";
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8080;
const MAX_STRIKE_STEP: i64 = 1_000_000;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub symbol: String,
    pub strike_step: i64,
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,
    pub cache_path: PathBuf,
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TelegramCredentials {
    pub bot_token: String,
    pub chat_id: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            symbol: DEFAULT_SYMBOL.to_string(),
            strike_step: DEFAULT_STRIKE_STEP,
            telegram_bot_token: None,
            telegram_chat_id: None,
            cache_path: PathBuf::from(DEFAULT_CACHE_PATH),
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl Config {
    /// Optional TOML file first, then environment overrides.
    pub async fn new() -> Result<Config> {
        let path = config_path();
        let mut config = match fs::read_to_string(&path).await {
            Ok(data) => {
                info!("Loaded config from {path:?}");
                Self::from_str(data.as_str())
                    .with_context(|| format!("parsing config {path:?}"))?
            }
            Err(e) => {
                debug!("No config file at {path:?}: {e}");
                Config::default()
            }
        };

        config.apply_env(|key| env::var(key).ok())?;
        config.validate()?;

        Ok(config)
    }

    fn from_str(data: &str) -> Result<Config> {
        Ok(toml::from_str::<Config>(data)?)
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(symbol) = var("SYMBOL") {
            self.symbol = symbol;
        }
        if let Some(step) = var("STRIKE_STEP") {
            self.strike_step = step
                .trim()
                .parse()
                .with_context(|| format!("STRIKE_STEP '{step}' is not an integer"))?;
        }
        if let Some(token) = var("TELEGRAM_BOT_TOKEN") {
            self.telegram_bot_token = Some(token);
        }
        if let Some(chat_id) = var("TELEGRAM_CHAT_ID") {
            self.telegram_chat_id = Some(chat_id);
        }
        if let Some(path) = var("CACHE_PATH") {
            self.cache_path = PathBuf::from(path);
        }
        if let Some(host) = var("HOST") {
            self.host = host;
        }
        if let Some(port) = var("PORT") {
            self.port = port
                .trim()
                .parse()
                .with_context(|| format!("PORT '{port}' is not a valid port"))?;
        }

        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.symbol.trim().is_empty() {
            bail!("symbol must not be empty");
        }
        if !(1..=MAX_STRIKE_STEP).contains(&self.strike_step) {
            bail!(
                "strike step must be between 1 and {MAX_STRIKE_STEP}, got {}",
                self.strike_step
            );
        }

        Ok(())
    }

    /// Both the bot token and the chat id, or nothing.
    pub fn telegram_credentials(&self) -> Option<TelegramCredentials> {
        let bot_token = self.telegram_bot_token.as_ref().filter(|t| !t.is_empty())?;
        let chat_id = self.telegram_chat_id.as_ref().filter(|c| !c.is_empty())?;

        Some(TelegramCredentials {
            bot_token: bot_token.clone(),
            chat_id: chat_id.clone(),
        })
    }
}

fn config_path() -> PathBuf {
    if let Ok(path) = env::var("OC_ALERT_CONFIG") {
        return PathBuf::from(path);
    }
    let home_dir = env::home_dir().unwrap_or(PathBuf::new());

    home_dir.join(APP_DIR).join(APP_CONFIG)
}
