use crate::cache::{CacheStore, CachedState};
use crate::config::Config;
use crate::futures::{FuturesQuote, FuturesView};
use crate::market::{Clock, is_market_open, now_ist};
use crate::notifier::{NotifyOutcome, TelegramNotifier};
use crate::nse::{ChainSnapshot, NseClient};
use crate::options::{Side, SideReport, compute_side, select_strikes};
use crate::render::render_alert;

use anyhow::Result;
use chrono::{DateTime, FixedOffset};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Run even when the market is closed.
    pub force: bool,
    /// Compute and cache, but don't notify.
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub ok: bool,
    pub market_open: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
    pub expiry: Option<String>,
    pub spot: Option<f64>,
    pub cache_saved: bool,
    pub sent: Option<NotifyOutcome>,
}

impl RunReport {
    fn new(market_open: bool) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            ok: false,
            market_open,
            msg: None,
            expiry: None,
            spot: None,
            cache_saved: false,
            sent: None,
        }
    }
}

/// Result of comparing one fetch against the cached baseline.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub expiry: String,
    pub spot: f64,
    /// Exchange-side timestamp of the chain, when NSE sends one.
    pub as_of: Option<String>,
    pub call: SideReport,
    pub put: SideReport,
    pub futures: FuturesView,
    pub next_state: CachedState,
}

pub fn evaluate(
    chain: &ChainSnapshot,
    futures: Option<&FuturesQuote>,
    previous: Option<&CachedState>,
    strike_step: i64,
    now: DateTime<FixedOffset>,
) -> Evaluation {
    let previous_legs = previous.and_then(|p| p.legs_for_expiry(&chain.expiry));

    let call_strikes = select_strikes(chain.spot, strike_step, Side::Call);
    let put_strikes = select_strikes(chain.spot, strike_step, Side::Put);
    let call = compute_side(&chain.legs, previous_legs, &call_strikes, Side::Call);
    let put = compute_side(&chain.legs, previous_legs, &put_strikes, Side::Put);

    let futures_view = FuturesView::evaluate(
        futures,
        chain.spot,
        previous.and_then(|p| p.futures.as_ref()),
        previous.and_then(|p| p.premium),
    );

    let mut legs = call.snapshot.clone();
    legs.extend(put.snapshot.iter().map(|(k, v)| (*k, *v)));

    let next_state = CachedState {
        ts: now,
        expiry: chain.expiry.clone(),
        spot: chain.spot,
        legs,
        futures: futures.map(|q| q.aggregate),
        premium: futures_view.premium,
    };

    Evaluation {
        expiry: chain.expiry.clone(),
        spot: chain.spot,
        as_of: chain.timestamp.clone(),
        call,
        put,
        futures: futures_view,
        next_state,
    }
}

/// Runs the fetch, compare, cache and notify cycle. Runs are serialized so
/// overlapping triggers never interleave their cache read and write.
pub struct AlertBot {
    symbol: String,
    strike_step: i64,
    nse: NseClient,
    notifier: TelegramNotifier,
    cache: CacheStore,
    clock: Clock,
    run_lock: Mutex<()>,
}

impl AlertBot {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self::from_parts(
            config.symbol.clone(),
            config.strike_step,
            NseClient::new()?,
            TelegramNotifier::new(config.telegram_credentials())?,
            CacheStore::new(config.cache_path.clone()),
        ))
    }

    pub fn from_parts(
        symbol: String,
        strike_step: i64,
        nse: NseClient,
        notifier: TelegramNotifier,
        cache: CacheStore,
    ) -> Self {
        Self {
            symbol,
            strike_step,
            nse,
            notifier,
            cache,
            clock: now_ist,
            run_lock: Mutex::new(()),
        }
    }

    /// Replaces the wall clock used for the market-hours guard and timestamps.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub async fn run_once(&self, options: RunOptions) -> RunReport {
        let _guard = self.run_lock.lock().await;

        let now = (self.clock)();
        let mut report = RunReport::new(is_market_open(now));
        let run_id = report.run_id;

        if !report.market_open && !options.force {
            info!(%run_id, "Market closed, skipping run");
            report.msg = Some("market closed".to_string());
            return report;
        }

        let chain = match self.nse.fetch_option_chain(&self.symbol).await {
            Ok(chain) => chain,
            Err(e) => {
                error!(%run_id, "Option chain fetch failed: {e}");
                report.msg = Some(format!("nse option chain fetch failed: {e}"));
                return report;
            }
        };
        report.expiry = Some(chain.expiry.clone());
        report.spot = Some(chain.spot);

        let previous = self.cache.load().await;
        match &previous {
            None => info!(%run_id, "No previous snapshot, deltas start next run"),
            Some(p) if p.expiry != chain.expiry => info!(
                %run_id,
                "Expiry rolled from {} to {}, leg deltas start next run", p.expiry, chain.expiry
            ),
            Some(_) => {}
        }

        let futures = match self.nse.fetch_futures(&self.symbol).await {
            Ok(quote) => Some(quote),
            Err(e) => {
                warn!(%run_id, "Futures fetch failed, continuing without futures: {e}");
                None
            }
        };

        let evaluation = evaluate(
            &chain,
            futures.as_ref(),
            previous.as_ref(),
            self.strike_step,
            now,
        );

        match self.cache.save(&evaluation.next_state).await {
            Ok(()) => report.cache_saved = true,
            Err(e) => error!(%run_id, "Failed to save cache {:?}: {e}", self.cache.path()),
        }

        let message = render_alert(&self.symbol, now, &evaluation);
        let outcome = if options.dry_run {
            debug!(%run_id, "Dry run message:\n{message}");
            NotifyOutcome::Skipped {
                reason: "dry run".to_string(),
            }
        } else {
            self.notifier.deliver(&message).await
        };

        info!(
            %run_id,
            "{} run done: build-up {:?}, call ΣΔOI {}, put ΣΔOI {}",
            self.symbol,
            evaluation.futures.build_up,
            evaluation.call.totals.sum_delta_oi,
            evaluation.put.totals.sum_delta_oi
        );

        report.sent = Some(outcome);
        report.ok = true;
        report
    }
}
