//! Turns the page's relative timestamps into absolute ones

use chrono::{Datelike, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use regex::Regex;
use std::sync::OnceLock;

const SITE_UTC_OFFSET_SECS: i32 = 8 * 3600;

/// Current wall-clock time in the site's timezone (UTC+8)
pub fn site_now() -> NaiveDateTime {
    let now = Utc::now();
    match FixedOffset::east_opt(SITE_UTC_OFFSET_SECS) {
        Some(offset) => now.with_timezone(&offset).naive_local(),
        None => now.naive_utc(),
    }
}

fn patterns() -> &'static [(Regex, Kind); 7] {
    static PATTERNS: OnceLock<[(Regex, Kind); 7]> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let re = |p: &str| Regex::new(p).expect("static date pattern");
        [
            (re(r"^(\d+)秒$"), Kind::SecondsAgo),
            (re(r"^(\d+)分钟$"), Kind::MinutesAgo),
            (re(r"^(\d+)小时$"), Kind::HoursAgo),
            (re(r"^今天(\d{1,2}):(\d{2})$"), Kind::Today),
            (re(r"^(\d{1,2})月(\d{1,2})日(\d{1,2}):(\d{2})$"), Kind::ThisYear),
            (re(r"^(\d{4})年(\d{1,2})月(\d{1,2})日(\d{1,2}):(\d{2})$"), Kind::Full),
            (re(r"^(\d{4})-(\d{1,2})-(\d{1,2})(\d{1,2}):(\d{2})$"), Kind::Iso),
        ]
    })
}

#[derive(Clone, Copy)]
enum Kind {
    SecondsAgo,
    MinutesAgo,
    HoursAgo,
    Today,
    ThisYear,
    Full,
    Iso,
}

/// Standardizes a timestamp as displayed under a post
///
/// Whitespace is ignored and a trailing `前` ("ago") is dropped before
/// matching. Relative forms are resolved against `now`. Returns `None` for
/// anything unrecognised.
pub fn standardize_date(raw: &str, now: NaiveDateTime) -> Option<NaiveDateTime> {
    let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    let text = compact.split('前').next().unwrap_or_default();

    if text == "刚刚" {
        return Some(now);
    }

    for (pattern, kind) in patterns() {
        let Some(caps) = pattern.captures(text) else {
            continue;
        };
        let num = |i: usize| -> Option<u32> { caps.get(i)?.as_str().parse().ok() };

        return match kind {
            Kind::SecondsAgo => ago(now, Duration::try_seconds(num(1)?.into())),
            Kind::MinutesAgo => ago(now, Duration::try_minutes(num(1)?.into())),
            Kind::HoursAgo => ago(now, Duration::try_hours(num(1)?.into())),
            Kind::Today => at(now.date(), num(1)?, num(2)?),
            Kind::ThisYear => {
                let day = NaiveDate::from_ymd_opt(now.year(), num(1)?, num(2)?)?;
                at(day, num(3)?, num(4)?)
            }
            Kind::Full | Kind::Iso => {
                let day = NaiveDate::from_ymd_opt(num(1)? as i32, num(2)?, num(3)?)?;
                at(day, num(4)?, num(5)?)
            }
        };
    }

    None
}

// Offsets scraped from page text may be absurd; they yield None instead of overflowing.
fn ago(now: NaiveDateTime, offset: Option<Duration>) -> Option<NaiveDateTime> {
    now.checked_sub_signed(offset?)
}

fn at(day: NaiveDate, hour: u32, minute: u32) -> Option<NaiveDateTime> {
    NaiveTime::from_hms_opt(hour, minute, 0).map(|t| day.and_time(t))
}
