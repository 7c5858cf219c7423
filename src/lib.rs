pub mod bot;
pub mod cache;
pub mod config;
pub mod futures;
pub mod market;
pub mod notifier;
pub mod nse;
pub mod options;
pub mod render;
pub mod server;

const APP_DIR: &str = ".oc_alert_bot";
const APP_CONFIG: &str = "config.toml";
const NSE_API: &str = "https://www.nseindia.com";
const TELEGRAM_API: &str = "https://api.telegram.org";
