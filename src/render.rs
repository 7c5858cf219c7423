use crate::bot::Evaluation;
use crate::futures::FuturesView;
use crate::options::{Row, SideTotals};

use chrono::{DateTime, FixedOffset};

const ABSENT: &str = "—";

/// Builds the Telegram HTML alert.
pub fn render_alert(symbol: &str, now: DateTime<FixedOffset>, eval: &Evaluation) -> String {
    let as_of = eval
        .as_of
        .as_deref()
        .map(|ts| format!("  |  NSE as of {}", escape_html(ts)))
        .unwrap_or_default();
    let header = format!(
        "<b>📊 {} Option Chain</b>\n🕒 {} IST  |  📅 Exp: <b>{}</b>\nSpot: <b>{:.2}</b>{}\n",
        escape_html(symbol),
        now.format("%d-%b-%Y %H:%M:%S"),
        escape_html(&eval.expiry),
        eval.spot,
        as_of
    );

    let blocks = [
        header,
        format!("<b>🟩 CALL SIDE</b>\n{}", render_table(&eval.call.rows)),
        render_summary(&eval.call.totals),
        format!("<b>🟥 PUT SIDE</b>\n{}", render_table(&eval.put.rows)),
        render_summary(&eval.put.totals),
        render_futures(&eval.futures),
        render_premium(&eval.futures),
        render_gap(&eval.futures),
    ];

    blocks.join("\n\n")
}

/// Fixed-width table for Telegram's monospace `<pre>` block.
pub fn render_table(rows: &[Row]) -> String {
    let header = format!(
        "{:>7}  {:>9}  {:>6}  {:>7}  {:>7}",
        "Strike", "ΔOI", "IV", "ΔIV", "CVol%"
    );
    let sep = "-".repeat(header.chars().count());

    let mut lines = vec![header, sep];
    for r in rows {
        let doi = r.delta_oi.map(signed_count).unwrap_or(ABSENT.to_string());
        let div = r
            .delta_iv
            .map(|v| format!("{v:+.2}"))
            .unwrap_or(ABSENT.to_string());
        let cvp = r
            .delta_volume_pct
            .map(|v| format!("{v:+.2}"))
            .unwrap_or(ABSENT.to_string());

        lines.push(format!(
            "{:>7}  {}{:>8}  {:>6.2}  {}{:>6}  {}{:>6}",
            r.strike,
            sign_glyph(r.delta_oi),
            doi,
            r.iv,
            sign_glyph(r.delta_iv),
            div,
            sign_glyph(r.delta_volume_pct),
            cvp
        ));
    }

    format!("<pre>{}</pre>", lines.join("\n"))
}

pub fn render_summary(totals: &SideTotals) -> String {
    format!(
        "ΣΔOI: <b>{}</b>  |  Avg IV: <b>{:.2}</b>  |  Avg ΔIV: <b>{:+.2}</b>  |  Avg CVol%: <b>{:.2}</b>",
        signed_count(totals.sum_delta_oi),
        totals.avg_iv,
        totals.avg_delta_iv,
        totals.avg_delta_volume_pct
    )
}

fn render_futures(view: &FuturesView) -> String {
    let (buy, sell) = match &view.quote {
        Some(q) => (count(q.total_buy_qty), count(q.total_sell_qty)),
        None => (ABSENT.to_string(), ABSENT.to_string()),
    };

    format!(
        "⚙️ <b>Futures Δ</b>  ΔOI: <b>{}</b>  |  ΔVOL: <b>{}</b>\n💹 <b>Depth</b> Buy: <b>{}</b>  |  Sell: <b>{}</b>\nBias: <b>{}</b>",
        or_absent(view.delta.delta_oi, signed_count),
        or_absent(view.delta.delta_vol, signed_count),
        buy,
        sell,
        view.depth_bias.label()
    )
}

fn render_premium(view: &FuturesView) -> String {
    format!(
        "📐 <b>Premium</b> Fut−Spot: <b>{}</b>  (Δ {})  → <b>{}</b>",
        or_absent(view.premium, |v| format!("{v:+.2}")),
        or_absent(view.premium_delta, |v| format!("{v:+.2}")),
        view.build_up.label()
    )
}

fn render_gap(view: &FuturesView) -> String {
    format!(
        "📈 <b>Gap Δ</b> (Fut−Spot) change: <b>{}</b> pts  → <b>{}</b>",
        or_absent(view.premium_delta, |v| format!("{v:+.2}")),
        view.gap_trend.label()
    )
}

fn or_absent(value: Option<f64>, fmt: impl Fn(f64) -> String) -> String {
    value.map(fmt).unwrap_or(ABSENT.to_string())
}

fn sign_glyph(value: Option<f64>) -> &'static str {
    match value {
        Some(v) if v > 0.0 => "🟢",
        Some(v) if v < 0.0 => "🔴",
        _ => "⚪",
    }
}

/// `+1,200` / `-800` / `+0`
fn signed_count(value: f64) -> String {
    let n = value.round() as i64;
    let sign = if n < 0 { '-' } else { '+' };
    format!("{sign}{}", group_thousands(n.unsigned_abs()))
}

fn count(value: f64) -> String {
    let n = value.round() as i64;
    if n < 0 {
        format!("-{}", group_thousands(n.unsigned_abs()))
    } else {
        group_thousands(n.unsigned_abs())
    }
}

fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
