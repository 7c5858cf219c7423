use chrono::{DateTime, Datelike, FixedOffset, Timelike, Utc, Weekday};

const IST_OFFSET_SECS: i32 = 5 * 3600 + 30 * 60;
const SESSION_OPEN_SECS: u32 = 9 * 3600 + 15 * 60;
const SESSION_CLOSE_SECS: u32 = 15 * 3600 + 30 * 60;

/// Source of "now" for a run.
pub type Clock = fn() -> DateTime<FixedOffset>;

pub fn ist() -> FixedOffset {
    FixedOffset::east_opt(IST_OFFSET_SECS).expect("IST offset is within a day")
}

pub fn now_ist() -> DateTime<FixedOffset> {
    Utc::now().with_timezone(&ist())
}

/// Cash session: Monday to Friday, 09:15 to 15:30 IST inclusive.
pub fn is_market_open(now: DateTime<FixedOffset>) -> bool {
    let now = now.with_timezone(&ist());
    if matches!(now.weekday(), Weekday::Sat | Weekday::Sun) {
        return false;
    }

    let secs = now.num_seconds_from_midnight();
    (SESSION_OPEN_SECS..=SESSION_CLOSE_SECS).contains(&secs)
}
