use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, FixedOffset, TimeZone};
use oc_alert_bot::bot::{AlertBot, RunOptions};
use oc_alert_bot::cache::CacheStore;
use oc_alert_bot::config::TelegramCredentials;
use oc_alert_bot::market::ist;
use oc_alert_bot::notifier::{NotifyOutcome, TelegramNotifier};
use oc_alert_bot::nse::NseClient;
use oc_alert_bot::options::{LegKey, Side};
use serde_json::{Value, json};
use std::path::Path;
use std::sync::{Arc, Mutex};

const OPTION_CHAIN: &str = include_str!("../src/fixtures/option_chain.json");
const QUOTE_DERIVATIVE: &str = include_str!("../src/fixtures/quote_derivative.json");

type Inbox = Arc<Mutex<Vec<String>>>;

async fn send_message(State(inbox): State<Inbox>, Json(body): Json<Value>) -> Json<Value> {
    let text = body["text"].as_str().unwrap_or_default().to_string();
    inbox.lock().unwrap().push(text);

    Json(json!({ "ok": true, "result": { "message_id": 1 } }))
}

fn nse_routes() -> Router<Inbox> {
    Router::new()
        .route("/", get(|| async { "home" }))
        .route("/option-chain", get(|| async { "option chain page" }))
        .route("/api/option-chain-indices", get(|| async { OPTION_CHAIN }))
        .route("/api/quote-derivative", get(|| async { QUOTE_DERIVATIVE }))
}

async fn spawn(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

    format!("http://{addr}")
}

/// Serves the NSE fixtures and a Telegram `sendMessage` on one local port.
async fn spawn_exchange() -> (String, Inbox) {
    let inbox: Inbox = Arc::default();
    let app = nse_routes()
        .route("/bottest-token/sendMessage", post(send_message))
        .with_state(inbox.clone());

    (spawn(app).await, inbox)
}

fn bot(base: &str, cache_path: &Path) -> AlertBot {
    let creds = TelegramCredentials {
        bot_token: "test-token".to_string(),
        chat_id: "42".to_string(),
    };

    AlertBot::from_parts(
        "NIFTY".to_string(),
        50,
        NseClient::with_base_url(base).unwrap(),
        TelegramNotifier::with_base_url(base, Some(creds)).unwrap(),
        CacheStore::new(cache_path.to_path_buf()),
    )
}

const FORCED: RunOptions = RunOptions {
    force: true,
    dry_run: false,
};

#[tokio::test]
async fn test_first_and_second_run() {
    let (base, inbox) = spawn_exchange().await;
    let dir = tempfile::tempdir().unwrap();
    let cache_path = dir.path().join("oc_cache.json");
    let bot = bot(&base, &cache_path);

    let first = bot.run_once(FORCED).await;
    assert!(first.ok);
    assert!(first.cache_saved);
    assert_eq!(first.expiry.as_deref(), Some("21-Oct-2026"));
    assert_eq!(first.spot, Some(25597.65));
    assert!(matches!(first.sent, Some(NotifyOutcome::Sent { .. })));

    let cached = CacheStore::new(cache_path.clone()).load().await.unwrap();
    assert_eq!(cached.legs.len(), 12);
    assert_eq!(cached.legs[&LegKey::new(Side::Put, 25550)].oi, 88000.0);
    assert_eq!(cached.premium, Some(82.85));

    let second = bot.run_once(FORCED).await;
    assert!(second.ok);

    let messages = inbox.lock().unwrap().clone();
    assert_eq!(messages.len(), 2);
    assert!(messages[0].contains("ΔOI: <b>—</b>  |  ΔVOL: <b>—</b>"));
    assert!(messages[1].contains("ΣΔOI: <b>+0</b>"));
    assert!(messages[1].contains("ΔOI: <b>+0</b>  |  ΔVOL: <b>+0</b>"));
    assert!(messages[1].contains("(Δ +0.00)  → <b>Neutral</b>"));
}

#[tokio::test]
async fn test_dry_run_updates_cache_only() {
    let (base, inbox) = spawn_exchange().await;
    let dir = tempfile::tempdir().unwrap();
    let cache_path = dir.path().join("oc_cache.json");

    let report = bot(&base, &cache_path)
        .run_once(RunOptions {
            force: true,
            dry_run: true,
        })
        .await;

    assert!(report.ok);
    assert!(report.cache_saved);
    assert_eq!(
        report.sent,
        Some(NotifyOutcome::Skipped {
            reason: "dry run".to_string()
        })
    );
    assert!(cache_path.exists());
    assert!(inbox.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_overlapping_triggers_are_serialized() {
    let (base, inbox) = spawn_exchange().await;
    let dir = tempfile::tempdir().unwrap();
    let bot = Arc::new(bot(&base, &dir.path().join("oc_cache.json")));

    let a = tokio::spawn({
        let bot = bot.clone();
        async move { bot.run_once(FORCED).await }
    });
    let b = tokio::spawn({
        let bot = bot.clone();
        async move { bot.run_once(FORCED).await }
    });

    let (a, b) = (a.await.unwrap(), b.await.unwrap());
    assert!(a.ok && b.ok);
    assert_ne!(a.run_id, b.run_id);

    // whichever ran second saw the first one's snapshot
    let messages = inbox.lock().unwrap().clone();
    assert_eq!(messages.len(), 2);
    assert_eq!(
        messages
            .iter()
            .filter(|m| m.contains("ΔOI: <b>+0</b>  |  ΔVOL: <b>+0</b>"))
            .count(),
        1
    );
    assert_eq!(
        messages
            .iter()
            .filter(|m| m.contains("ΔOI: <b>—</b>  |  ΔVOL: <b>—</b>"))
            .count(),
        1
    );
}

#[tokio::test]
async fn test_telegram_outage_keeps_cache() {
    let app = nse_routes()
        .route(
            "/bottest-token/sendMessage",
            post(|| async { (StatusCode::BAD_GATEWAY, "<html>502 Bad Gateway</html>") }),
        )
        .with_state(Inbox::default());
    let base = spawn(app).await;
    let dir = tempfile::tempdir().unwrap();
    let cache_path = dir.path().join("oc_cache.json");

    let report = bot(&base, &cache_path).run_once(FORCED).await;

    assert!(report.ok);
    assert!(report.cache_saved);
    assert_eq!(
        report.sent,
        Some(NotifyOutcome::Failed {
            error: "telegram responded with status 502".to_string()
        })
    );
    let cached = CacheStore::new(cache_path).load().await.unwrap();
    assert_eq!(cached.expiry, "21-Oct-2026");
}

#[tokio::test]
async fn test_closed_market_skips_everything() {
    fn sunday_morning() -> DateTime<FixedOffset> {
        ist().with_ymd_and_hms(2026, 10, 18, 10, 0, 0).unwrap()
    }
    fn monday_morning() -> DateTime<FixedOffset> {
        ist().with_ymd_and_hms(2026, 10, 19, 10, 0, 0).unwrap()
    }

    let (base, inbox) = spawn_exchange().await;
    let dir = tempfile::tempdir().unwrap();
    let cache_path = dir.path().join("oc_cache.json");

    let report = bot(&base, &cache_path)
        .with_clock(sunday_morning)
        .run_once(RunOptions::default())
        .await;

    assert!(!report.ok);
    assert!(!report.market_open);
    assert_eq!(report.msg.as_deref(), Some("market closed"));
    assert_eq!(report.sent, None);
    assert!(!cache_path.exists());
    assert!(inbox.lock().unwrap().is_empty());

    // same bot setup during the session runs without forcing
    let report = bot(&base, &cache_path)
        .with_clock(monday_morning)
        .run_once(RunOptions::default())
        .await;

    assert!(report.ok && report.market_open);
    assert!(cache_path.exists());
    assert_eq!(inbox.lock().unwrap().len(), 1);
}
