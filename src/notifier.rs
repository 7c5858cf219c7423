use super::TELEGRAM_API;
use crate::config::TelegramCredentials;

use reqwest::{Client, Url};
use serde::Serialize;
use serde_json::{Value, json};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

const SEND_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("telegram credentials missing")]
    MissingCredentials,
    #[error("http error: {0}")]
    HttpError(String),
    #[error("telegram responded with status {0}")]
    Status(u16),
    #[error("telegram rejected the message: {0}")]
    Rejected(String),
    #[error("invalid uri")]
    InvalidUri,
}

/// What happened to the alert. Delivery problems end up here rather than
/// failing the run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum NotifyOutcome {
    Sent { response: Value },
    Skipped { reason: String },
    Failed { error: String },
}

pub struct TelegramNotifier {
    client: Client,
    base_url: Url,
    credentials: Option<TelegramCredentials>,
}

impl TelegramNotifier {
    pub fn new(credentials: Option<TelegramCredentials>) -> Result<Self, NotifyError> {
        Self::with_base_url(TELEGRAM_API, credentials)
    }

    pub fn with_base_url(
        base_url: &str,
        credentials: Option<TelegramCredentials>,
    ) -> Result<Self, NotifyError> {
        Ok(Self {
            client: Client::new(),
            base_url: base_url.parse().map_err(|_| NotifyError::InvalidUri)?,
            credentials,
        })
    }

    /// Posts an HTML message via `sendMessage`.
    pub async fn send(&self, html: &str) -> Result<Value, NotifyError> {
        let creds = self
            .credentials
            .as_ref()
            .ok_or(NotifyError::MissingCredentials)?;
        let uri = self
            .base_url
            .join(&format!("/bot{}/sendMessage", creds.bot_token))
            .map_err(|_| NotifyError::InvalidUri)?;

        let payload = json!({
            "chat_id": creds.chat_id,
            "text": html,
            "parse_mode": "HTML",
            "disable_web_page_preview": true
        });

        // the url carries the bot token, keep it out of errors
        let response = self
            .client
            .post(uri)
            .json(&payload)
            .timeout(SEND_TIMEOUT)
            .send()
            .await
            .map_err(|e| NotifyError::HttpError(e.without_url().to_string()))?;

        // api errors still carry a json description, proxies and outages don't
        let status = response.status();
        let body: Value = match response.json().await {
            Ok(body) => body,
            Err(_) if !status.is_success() => {
                warn!("Telegram responded with status {status}");
                return Err(NotifyError::Status(status.as_u16()));
            }
            Err(e) => return Err(NotifyError::HttpError(e.without_url().to_string())),
        };

        if body.get("ok").and_then(Value::as_bool) != Some(true) {
            let description = body
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or("no description");
            return Err(NotifyError::Rejected(description.to_string()));
        }

        Ok(body)
    }

    pub async fn deliver(&self, html: &str) -> NotifyOutcome {
        match self.send(html).await {
            Ok(response) => {
                info!("Telegram alert delivered");
                NotifyOutcome::Sent { response }
            }
            Err(NotifyError::MissingCredentials) => {
                warn!("Telegram credentials missing, alert not sent");
                NotifyOutcome::Skipped {
                    reason: NotifyError::MissingCredentials.to_string(),
                }
            }
            Err(e) => {
                warn!("Telegram delivery failed: {e}");
                NotifyOutcome::Failed {
                    error: e.to_string(),
                }
            }
        }
    }
}
