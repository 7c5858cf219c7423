use super::NSE_API;
use crate::futures::{FuturesAggregate, FuturesQuote};
use crate::options::{LegKey, LegMap, LegMetrics, Side};

use reqwest::{
    Client, Response, Url,
    header::{ACCEPT, HeaderMap, HeaderValue, ORIGIN, REFERER, USER_AGENT},
};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

const WARMUP_TIMEOUT: Duration = Duration::from_secs(8);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(18);
const BROWSER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64)";

/// NSE only serves its JSON API to sessions that look like a browser, so the
/// client keeps a cookie jar and visits the HTML pages before each fetch.
pub struct NseClient {
    client: Client,
    base_url: Url,
}

#[derive(Debug, Error)]
pub enum NseError {
    #[error("http error: {0}")]
    HttpError(String),
    #[error("nse responded with status {0}")]
    Status(u16),
    #[error("couldn't parse json response: {0}")]
    MalformedJson(String),
    #[error("response is missing {0}")]
    MissingField(&'static str),
    #[error("response has an invalid {0}")]
    InvalidField(&'static str),
    #[error("invalid uri")]
    InvalidUri,
}

/// Nearest-expiry option chain.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainSnapshot {
    pub expiry: String,
    pub spot: f64,
    pub timestamp: Option<String>,
    pub legs: LegMap,
}

#[derive(Debug, Deserialize)]
struct OptionChainResponse {
    records: Records,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Records {
    #[serde(default)]
    expiry_dates: Vec<String>,
    underlying_value: Option<f64>,
    timestamp: Option<String>,
    #[serde(default)]
    data: Vec<ChainRow>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChainRow {
    strike_price: Option<f64>,
    expiry_date: Option<String>,
    #[serde(rename = "CE")]
    call: Option<ChainLeg>,
    #[serde(rename = "PE")]
    put: Option<ChainLeg>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChainLeg {
    open_interest: Option<f64>,
    implied_volatility: Option<f64>,
    total_traded_volume: Option<f64>,
}

impl From<&ChainLeg> for LegMetrics {
    fn from(leg: &ChainLeg) -> Self {
        Self {
            oi: leg.open_interest.unwrap_or_default(),
            iv: leg.implied_volatility.unwrap_or_default(),
            vol: leg.total_traded_volume.unwrap_or_default(),
        }
    }
}

impl NseClient {
    pub fn new() -> Result<Self, NseError> {
        Self::with_base_url(NSE_API)
    }

    pub fn with_base_url(base_url: &str) -> Result<Self, NseError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_AGENT));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json, text/plain, */*"));
        headers.insert(REFERER, HeaderValue::from_static("https://www.nseindia.com/"));
        headers.insert(ORIGIN, HeaderValue::from_static("https://www.nseindia.com"));

        let client = Client::builder()
            .default_headers(headers)
            .cookie_store(true)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| NseError::HttpError(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.parse().map_err(|_| NseError::InvalidUri)?,
        })
    }

    fn make_uri(&self, path: &str, symbol: &str) -> Result<Url, NseError> {
        let mut uri = self.base_url.join(path).map_err(|_| NseError::InvalidUri)?;
        uri.query_pairs_mut().append_pair("symbol", symbol);

        Ok(uri)
    }

    /// Picks up the session cookies. Failures only get logged; the API call
    /// that follows reports the real error.
    pub async fn warmup(&self, symbol: &str) {
        let mut pages = vec![self.base_url.clone()];
        if let Ok(uri) = self.make_uri("/option-chain", symbol) {
            pages.push(uri);
        }

        for page in pages {
            let res = self
                .client
                .get(page.clone())
                .timeout(WARMUP_TIMEOUT)
                .send()
                .await;
            if let Err(e) = res {
                debug!("warmup of {page} failed: {e}");
            }
        }
    }

    async fn get_text(&self, path: &str, symbol: &str) -> Result<String, NseError> {
        let uri = self.make_uri(path, symbol)?;
        let response = self.client.get(uri).send().await;
        let response = handle_response(response).await?;

        response
            .text()
            .await
            .map_err(|e| NseError::HttpError(e.to_string()))
    }

    pub async fn fetch_option_chain(&self, symbol: &str) -> Result<ChainSnapshot, NseError> {
        self.warmup(symbol).await;
        let body = self.get_text("/api/option-chain-indices", symbol).await?;
        let chain = parse_option_chain(&body)?;
        info!(
            "Fetched {symbol} option chain: expiry {} spot {:.2} ({} legs)",
            chain.expiry,
            chain.spot,
            chain.legs.len()
        );

        Ok(chain)
    }

    pub async fn fetch_futures(&self, symbol: &str) -> Result<FuturesQuote, NseError> {
        self.warmup(symbol).await;
        let body = self.get_text("/api/quote-derivative", symbol).await?;
        let quote = parse_futures(&body)?;
        info!(
            "Fetched {symbol} futures: oi {} vol {} last {:.2}",
            quote.aggregate.oi, quote.aggregate.vol, quote.aggregate.price
        );

        Ok(quote)
    }
}

pub async fn handle_response(
    response: Result<Response, reqwest::Error>,
) -> Result<Response, NseError> {
    debug!("response: <{response:?}>");

    let response = match response {
        Ok(response) => response,
        Err(e) => return Err(NseError::HttpError(e.to_string())),
    };

    if !response.status().is_success() {
        warn!("NSE rejected request with status {}", response.status());
        return Err(NseError::Status(response.status().as_u16()));
    }

    Ok(response)
}

/// Keeps only the nearest expiry. Absent numeric fields read as zero.
pub fn parse_option_chain(body: &str) -> Result<ChainSnapshot, NseError> {
    let response: OptionChainResponse =
        serde_json::from_str(body).map_err(|e| NseError::MalformedJson(e.to_string()))?;
    let records = response.records;

    let expiry = records
        .expiry_dates
        .first()
        .cloned()
        .ok_or(NseError::MissingField("records.expiryDates"))?;
    let spot = records
        .underlying_value
        .ok_or(NseError::MissingField("records.underlyingValue"))?;
    if !spot.is_finite() || spot <= 0.0 {
        return Err(NseError::InvalidField("records.underlyingValue"));
    }

    let mut legs = LegMap::new();
    for row in &records.data {
        if row.expiry_date.as_deref() != Some(expiry.as_str()) {
            continue;
        }
        let Some(strike) = row.strike_price else {
            continue;
        };
        let strike = strike.round() as i64;

        if let Some(call) = &row.call {
            legs.insert(LegKey::new(Side::Call, strike), call.into());
        }
        if let Some(put) = &row.put {
            legs.insert(LegKey::new(Side::Put, strike), put.into());
        }
    }

    Ok(ChainSnapshot {
        expiry,
        spot,
        timestamp: records.timestamp,
        legs,
    })
}

/// The quote-derivative payload is deeply nested and its layout shifts, so
/// fields are located by key name rather than by path.
pub fn parse_futures(body: &str) -> Result<FuturesQuote, NseError> {
    let json: Value =
        serde_json::from_str(body).map_err(|e| NseError::MalformedJson(e.to_string()))?;

    let price = deep_find(&json, &["lastprice"])
        .filter(|p| *p != 0.0)
        .or_else(|| deep_find(&json, &["last"]))
        .unwrap_or_default();

    Ok(FuturesQuote {
        aggregate: FuturesAggregate {
            oi: deep_find(&json, &["open", "interest"]).unwrap_or_default(),
            vol: deep_find(&json, &["volume"]).unwrap_or_default(),
            price,
        },
        total_buy_qty: deep_find(&json, &["totalbuyquantity"]).unwrap_or_default(),
        total_sell_qty: deep_find(&json, &["totalsellquantity"]).unwrap_or_default(),
    })
}

/// Depth-first search for the first numeric field whose lowercased key
/// contains every needle. An object's own keys are checked before its children.
fn deep_find(value: &Value, needles: &[&str]) -> Option<f64> {
    match value {
        Value::Object(map) => map
            .iter()
            .find_map(|(key, v)| {
                let key = key.to_lowercase();
                if needles.iter().all(|n| key.contains(n)) {
                    v.as_f64()
                } else {
                    None
                }
            })
            .or_else(|| map.values().find_map(|v| deep_find(v, needles))),
        Value::Array(items) => items.iter().find_map(|v| deep_find(v, needles)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const OPTION_CHAIN: &str = include_str!("fixtures/option_chain.json");
    const QUOTE_DERIVATIVE: &str = include_str!("fixtures/quote_derivative.json");

    #[test]
    fn test_parse_option_chain() {
        let chain = parse_option_chain(OPTION_CHAIN).unwrap();

        assert_eq!(chain.expiry, "21-Oct-2026");
        assert_eq!(chain.spot, 25597.65);
        assert_eq!(chain.timestamp.as_deref(), Some("17-Oct-2026 15:30:00"));
        assert_eq!(chain.legs.len(), 5);

        let atm_call = chain.legs[&LegKey::new(Side::Call, 25600)];
        assert_eq!(atm_call.oi, 52000.0);
        assert_eq!(atm_call.iv, 9.9);
        assert_eq!(atm_call.vol, 400000.0);
    }

    #[test]
    fn test_missing_leg_fields_default_to_zero() {
        let chain = parse_option_chain(OPTION_CHAIN).unwrap();

        let atm_put = chain.legs[&LegKey::new(Side::Put, 25600)];
        assert_eq!(atm_put.vol, 0.0);
        let otm_call = chain.legs[&LegKey::new(Side::Call, 25650)];
        assert_eq!(otm_call.vol, 0.0);
        assert_eq!(otm_call.oi, 70500.0);
        assert!(!chain.legs.contains_key(&LegKey::new(Side::Put, 25650)));
    }

    #[test]
    fn test_parse_option_chain_errors() {
        assert!(matches!(
            parse_option_chain("<html>Access Denied</html>"),
            Err(NseError::MalformedJson(_))
        ));

        let no_expiry = json!({ "records": { "underlyingValue": 1.0, "data": [] } });
        assert!(matches!(
            parse_option_chain(&no_expiry.to_string()),
            Err(NseError::MissingField(_))
        ));

        let no_spot = json!({ "records": { "expiryDates": ["21-Oct-2026"] } });
        assert!(matches!(
            parse_option_chain(&no_spot.to_string()),
            Err(NseError::MissingField(_))
        ));

        for bad in [json!(0), json!(-25597.65)] {
            let bad_spot = json!({
                "records": { "expiryDates": ["21-Oct-2026"], "underlyingValue": bad }
            });
            assert!(matches!(
                parse_option_chain(&bad_spot.to_string()),
                Err(NseError::InvalidField("records.underlyingValue"))
            ));
        }
    }

    #[test]
    fn test_parse_futures() {
        let quote = parse_futures(QUOTE_DERIVATIVE).unwrap();

        assert_eq!(quote.aggregate.oi, 1201200.0);
        assert_eq!(quote.aggregate.vol, 123456.0);
        assert_eq!(quote.aggregate.price, 25680.5);
        assert_eq!(quote.total_buy_qty, 234500.0);
        assert_eq!(quote.total_sell_qty, 198750.0);
    }

    #[test]
    fn test_parse_futures_missing_fields() {
        let quote = parse_futures(r#"{"info": {"symbol": "NIFTY"}, "stocks": []}"#).unwrap();
        assert_eq!(quote, FuturesQuote::default());
    }

    #[test]
    fn test_deep_find_order() {
        let json = json!({
            "outer": { "changeinOpenInterest": 5, "openInterest": 7 },
            "lastTradedPrice": "n/a",
            "last": 3.5
        });
        // own keys win over nested ones, and non-numeric matches are skipped
        assert_eq!(deep_find(&json, &["last"]), Some(3.5));
        assert_eq!(deep_find(&json, &["open", "interest"]), Some(5.0));
        assert_eq!(deep_find(&json, &["missing"]), None);
    }

    #[test]
    fn test_make_uri_encodes_symbol() {
        let client = NseClient::with_base_url("https://example.test").unwrap();
        let uri = client.make_uri("/api/quote-derivative", "M&M").unwrap();
        assert_eq!(
            uri.as_str(),
            "https://example.test/api/quote-derivative?symbol=M%26M"
        );
    }
}
