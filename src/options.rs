use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Strikes shown per side: one ITM, the ATM and four OTM.
pub const WINDOW: usize = 6;
const OTM_STRIKES: i64 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Side {
    #[serde(rename = "CE")]
    Call,
    #[serde(rename = "PE")]
    Put,
}

impl Side {
    pub fn code(&self) -> &'static str {
        match self {
            Side::Call => "CE",
            Side::Put => "PE",
        }
    }

    /// Direction in which strikes move out of the money.
    fn otm_direction(&self) -> i64 {
        match self {
            Side::Call => 1,
            Side::Put => -1,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Side {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CE" => Ok(Side::Call),
            "PE" => Ok(Side::Put),
            other => Err(format!("unknown option side '{other}'")),
        }
    }
}

/// Identifies one option leg. Serialized as `"CE:25600"` so leg maps are
/// plain JSON objects in the cache file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LegKey {
    pub side: Side,
    pub strike: i64,
}

impl LegKey {
    pub fn new(side: Side, strike: i64) -> Self {
        Self { side, strike }
    }
}

impl fmt::Display for LegKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.side, self.strike)
    }
}

impl FromStr for LegKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (side, strike) = s
            .split_once(':')
            .ok_or_else(|| format!("leg key '{s}' is missing ':'"))?;
        let strike = strike
            .parse()
            .map_err(|e| format!("leg key '{s}' has a bad strike: {e}"))?;

        Ok(Self {
            side: side.parse()?,
            strike,
        })
    }
}

impl TryFrom<String> for LegKey {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<LegKey> for String {
    fn from(key: LegKey) -> Self {
        key.to_string()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LegMetrics {
    #[serde(default)]
    pub oi: f64,
    #[serde(default)]
    pub iv: f64,
    #[serde(default)]
    pub vol: f64,
}

pub type LegMap = BTreeMap<LegKey, LegMetrics>;

/// One strike of a side table. `None` deltas mean there was no previous
/// observation for the leg, which is not the same as "no change".
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Row {
    pub strike: i64,
    pub delta_oi: Option<f64>,
    pub iv: f64,
    pub delta_iv: Option<f64>,
    pub delta_volume: Option<f64>,
    pub delta_volume_pct: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SideTotals {
    pub sum_delta_oi: f64,
    pub sum_delta_volume: f64,
    pub avg_iv: f64,
    pub avg_delta_iv: f64,
    pub avg_delta_volume_pct: f64,
}

impl SideTotals {
    fn from_rows(rows: &[Row]) -> Self {
        Self {
            sum_delta_oi: rows.iter().filter_map(|r| r.delta_oi).sum(),
            sum_delta_volume: rows.iter().filter_map(|r| r.delta_volume).sum(),
            avg_iv: mean(rows.iter().map(|r| r.iv)),
            avg_delta_iv: mean(rows.iter().filter_map(|r| r.delta_iv)),
            avg_delta_volume_pct: mean(rows.iter().filter_map(|r| r.delta_volume_pct)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SideReport {
    pub side: Side,
    pub rows: Vec<Row>,
    pub totals: SideTotals,
    /// Current metrics for every leg in the window, kept as next run's baseline.
    #[serde(skip)]
    pub snapshot: LegMap,
}

/// Rounds half away from zero, so 25625 with step 50 goes to 25650.
///
/// Spots too far out for the whole window to fit in an `i64` are pinned to
/// the last strike that still leaves room for it; NaN lands on zero.
pub fn at_the_money(spot: f64, step: i64) -> i64 {
    // float to int casts saturate
    let multiple = (spot / step as f64).round() as i64;
    let bound = (i64::MAX / step - OTM_STRIKES).max(0);

    multiple.clamp(-bound, bound) * step
}

/// Display-ordered window for one side: ITM, ATM, then OTM moving away
/// from spot.
pub fn select_strikes(spot: f64, step: i64, side: Side) -> [i64; WINDOW] {
    let atm = at_the_money(spot, step);
    let dir = side.otm_direction();

    let mut strikes = [atm; WINDOW];
    strikes[0] = atm - dir * step;
    for i in 1..=OTM_STRIKES {
        strikes[1 + i as usize] = atm + dir * step * i;
    }

    strikes
}

pub fn compute_side(
    current: &LegMap,
    previous: Option<&LegMap>,
    strikes: &[i64],
    side: Side,
) -> SideReport {
    let mut rows = Vec::with_capacity(strikes.len());
    let mut snapshot = LegMap::new();

    for &strike in strikes {
        let key = LegKey::new(side, strike);
        let now = current.get(&key).copied().unwrap_or_default();
        let prev = previous.and_then(|p| p.get(&key));

        let delta_volume = prev.map(|p| now.vol - p.vol);
        rows.push(Row {
            strike,
            delta_oi: prev.map(|p| now.oi - p.oi),
            iv: now.iv,
            delta_iv: prev.map(|p| now.iv - p.iv),
            delta_volume,
            delta_volume_pct: delta_volume.and_then(|dv| percent_of(dv, now.oi)),
        });
        snapshot.insert(key, now);
    }

    let totals = SideTotals::from_rows(&rows);

    SideReport {
        side,
        rows,
        totals,
        snapshot,
    }
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn percent_of(part: f64, total: f64) -> Option<f64> {
    if total == 0.0 {
        return None;
    }
    Some(round2(part / total * 100.0))
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 { 0.0 } else { sum / count as f64 }
}
