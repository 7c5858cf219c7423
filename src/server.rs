use crate::bot::{AlertBot, RunOptions, RunReport};

use anyhow::{Context, Result};
use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Clone)]
pub struct AppState {
    pub bot: Arc<AlertBot>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RunQuery {
    test: Option<String>,
}

impl RunQuery {
    /// `?test=1` runs outside market hours.
    fn force(&self) -> bool {
        self.test.as_deref() == Some("1")
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/run", get(run).post(run))
        .with_state(state)
}

pub async fn health(State(state): State<AppState>) -> String {
    format!("{} Alert Bot Active ✅", state.bot.symbol())
}

pub async fn run(State(state): State<AppState>, Query(query): Query<RunQuery>) -> Json<RunReport> {
    let force = query.force();
    info!(force, "Run triggered");

    let report = state
        .bot
        .run_once(RunOptions {
            force,
            dry_run: false,
        })
        .await;

    Json(report)
}

pub async fn serve(host: &str, port: u16, bot: AlertBot) -> Result<()> {
    let symbol = bot.symbol().to_string();
    let app = router(AppState { bot: Arc::new(bot) });

    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;

    info!("{symbol} alert bot listening on {addr}");
    info!("  Health: GET       http://{addr}/");
    info!("  Run:    GET|POST  http://{addr}/run[?test=1]");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("running server")?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Couldn't listen for ctrl-c: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheStore;
    use crate::notifier::TelegramNotifier;
    use crate::nse::NseClient;
    use axum::http::Uri;

    fn state(cache_dir: &std::path::Path) -> AppState {
        let bot = AlertBot::from_parts(
            "BANKNIFTY".to_string(),
            100,
            NseClient::with_base_url("http://127.0.0.1:9").unwrap(),
            TelegramNotifier::new(None).unwrap(),
            CacheStore::new(cache_dir.join("oc_cache.json")),
        );
        AppState { bot: Arc::new(bot) }
    }

    #[tokio::test]
    async fn test_health() {
        let dir = tempfile::tempdir().unwrap();
        let body = health(State(state(dir.path()))).await;
        assert_eq!(body, "BANKNIFTY Alert Bot Active ✅");
    }

    #[test]
    fn test_run_query() {
        let uri: Uri = "http://localhost/run?test=1".parse().unwrap();
        assert!(Query::<RunQuery>::try_from_uri(&uri).unwrap().force());

        let uri: Uri = "http://localhost/run?test=0".parse().unwrap();
        assert!(!Query::<RunQuery>::try_from_uri(&uri).unwrap().force());

        let uri: Uri = "http://localhost/run".parse().unwrap();
        assert!(!Query::<RunQuery>::try_from_uri(&uri).unwrap().force());
    }

    #[tokio::test]
    async fn test_run_reports_fetch_failure() {
        let dir = tempfile::tempdir().unwrap();
        let query = RunQuery {
            test: Some("1".to_string()),
        };

        let Json(report) = run(State(state(dir.path())), Query(query)).await;
        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["ok"], false);
        assert!(json["market_open"].is_boolean());
        assert!(json["msg"].as_str().unwrap().contains("fetch failed"));
    }
}
