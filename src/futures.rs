use serde::{Deserialize, Serialize};

use crate::options::round2;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FuturesAggregate {
    #[serde(default)]
    pub oi: f64,
    #[serde(default)]
    pub vol: f64,
    #[serde(default)]
    pub price: f64,
}

/// Near-month futures as reported by the exchange, including order book depth.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct FuturesQuote {
    pub aggregate: FuturesAggregate,
    pub total_buy_qty: f64,
    pub total_sell_qty: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct FuturesDelta {
    pub delta_oi: Option<f64>,
    pub delta_vol: Option<f64>,
    pub delta_price: Option<f64>,
}

pub fn compute_futures_delta(
    current: &FuturesAggregate,
    previous: Option<&FuturesAggregate>,
) -> FuturesDelta {
    match previous {
        Some(prev) => FuturesDelta {
            delta_oi: Some(current.oi - prev.oi),
            delta_vol: Some(current.vol - prev.vol),
            delta_price: Some(current.price - prev.price),
        },
        None => FuturesDelta::default(),
    }
}

/// Futures minus spot. A non-positive futures price means the quote was
/// unavailable.
pub fn premium(futures_price: f64, spot: f64) -> Option<f64> {
    if futures_price <= 0.0 {
        return None;
    }
    Some(round2(futures_price - spot))
}

pub fn premium_delta(current: Option<f64>, previous: Option<f64>) -> Option<f64> {
    Some(round2(current? - previous?))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BuildUp {
    LongBuildUp,
    ShortBuildUp,
    LongUnwinding,
    ShortCovering,
    Neutral,
}

impl BuildUp {
    pub fn label(&self) -> &'static str {
        match self {
            BuildUp::LongBuildUp => "Long Build-up ✅",
            BuildUp::ShortBuildUp => "Short Build-up 🔻",
            BuildUp::LongUnwinding => "Long Unwinding ⬇️",
            BuildUp::ShortCovering => "Short Covering ⬆️",
            BuildUp::Neutral => "Neutral",
        }
    }
}

/// Sign table over futures OI change and premium change.
pub fn classify(delta_futures_oi: Option<f64>, delta_premium: Option<f64>) -> BuildUp {
    let (Some(oi), Some(prem)) = (delta_futures_oi, delta_premium) else {
        return BuildUp::Neutral;
    };

    if oi > 0.0 && prem > 0.0 {
        BuildUp::LongBuildUp
    } else if oi > 0.0 && prem < 0.0 {
        BuildUp::ShortBuildUp
    } else if oi < 0.0 && prem < 0.0 {
        BuildUp::LongUnwinding
    } else if oi < 0.0 && prem > 0.0 {
        BuildUp::ShortCovering
    } else {
        BuildUp::Neutral
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GapTrend {
    Strengthening,
    Weakening,
    NoChange,
    Unknown,
}

impl GapTrend {
    pub fn from_delta(gap_delta: Option<f64>) -> Self {
        match gap_delta {
            None => GapTrend::Unknown,
            Some(d) if d > 0.0 => GapTrend::Strengthening,
            Some(d) if d < 0.0 => GapTrend::Weakening,
            Some(_) => GapTrend::NoChange,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            GapTrend::Strengthening => "🟢 Futures strengthening",
            GapTrend::Weakening => "🔻 Futures weakening",
            GapTrend::NoChange => "⚪ No change",
            GapTrend::Unknown => "Neutral",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DepthBias {
    Bullish,
    Bearish,
    Neutral,
}

impl DepthBias {
    pub fn from_depth(total_buy_qty: f64, total_sell_qty: f64) -> Self {
        if total_buy_qty > total_sell_qty {
            DepthBias::Bullish
        } else if total_buy_qty < total_sell_qty {
            DepthBias::Bearish
        } else {
            DepthBias::Neutral
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DepthBias::Bullish => "🟢 Bullish",
            DepthBias::Bearish => "🔴 Bearish",
            DepthBias::Neutral => "⚪ Neutral",
        }
    }
}

/// Everything the alert shows about futures for one run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FuturesView {
    pub quote: Option<FuturesQuote>,
    pub delta: FuturesDelta,
    pub premium: Option<f64>,
    /// Premium change since the previous run, which is also the change in the
    /// futures/spot gap.
    pub premium_delta: Option<f64>,
    pub build_up: BuildUp,
    pub gap_trend: GapTrend,
    pub depth_bias: DepthBias,
}

impl FuturesView {
    /// `quote` is `None` when the futures fetch failed.
    pub fn evaluate(
        quote: Option<&FuturesQuote>,
        spot: f64,
        previous: Option<&FuturesAggregate>,
        previous_premium: Option<f64>,
    ) -> Self {
        let delta = quote
            .map(|q| compute_futures_delta(&q.aggregate, previous))
            .unwrap_or_default();
        let premium = quote.and_then(|q| premium(q.aggregate.price, spot));
        let premium_delta = premium_delta(premium, previous_premium);
        let depth_bias = quote
            .map(|q| DepthBias::from_depth(q.total_buy_qty, q.total_sell_qty))
            .unwrap_or(DepthBias::Neutral);

        Self {
            quote: quote.copied(),
            delta,
            premium,
            premium_delta,
            build_up: classify(delta.delta_oi, premium_delta),
            gap_trend: GapTrend::from_delta(premium_delta),
            depth_bias,
        }
    }
}
