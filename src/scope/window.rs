use chrono::{Duration, NaiveDate, NaiveDateTime, Timelike};
use std::fmt;

/// Half-open time interval `[start, end)` in site-local time
///
/// Windows are always hour-aligned; the search page cannot express anything
/// finer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimeWindow {
    start: NaiveDateTime,
    end: NaiveDateTime,
}

/// How finely a window may still be split by time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeGranularity {
    /// Longer than one day: split into days
    MultiDay,
    /// Longer than one hour, at most one day: split into hours
    Day,
    /// One hour or less: time cannot be narrowed further
    Hour,
}

impl TimeWindow {
    /// Creates a window, or `None` if it is empty or not hour-aligned
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Option<Self> {
        if start >= end || !is_hour_aligned(start) || !is_hour_aligned(end) {
            return None;
        }
        Some(Self { start, end })
    }

    /// Covers whole days from `first` through `last`, both inclusive
    pub fn from_dates(first: NaiveDate, last: NaiveDate) -> Self {
        let start = first.and_time(chrono::NaiveTime::MIN);
        let end = last.and_time(chrono::NaiveTime::MIN) + Duration::days(1);
        Self { start, end }
    }

    pub fn start(&self) -> NaiveDateTime {
        self.start
    }

    pub fn end(&self) -> NaiveDateTime {
        self.end
    }

    pub fn span(&self) -> Duration {
        self.end - self.start
    }

    pub fn contains(&self, instant: NaiveDateTime) -> bool {
        self.start <= instant && instant < self.end
    }

    pub fn granularity(&self) -> TimeGranularity {
        let span = self.span();
        if span > Duration::days(1) {
            TimeGranularity::MultiDay
        } else if span > Duration::hours(1) {
            TimeGranularity::Day
        } else {
            TimeGranularity::Hour
        }
    }

    /// Day-sized children covering this window exactly
    pub fn split_days(&self) -> Vec<TimeWindow> {
        self.split_by(Duration::days(1))
    }

    /// Hour-sized children covering this window exactly
    ///
    /// A one-day window always yields 24 children, whatever hour it starts at.
    pub fn split_hours(&self) -> Vec<TimeWindow> {
        self.split_by(Duration::hours(1))
    }

    fn split_by(&self, step: Duration) -> Vec<TimeWindow> {
        let mut children = Vec::new();
        let mut cursor = self.start;
        while cursor < self.end {
            let next = (cursor + step).min(self.end);
            children.push(TimeWindow {
                start: cursor,
                end: next,
            });
            cursor = next;
        }
        children
    }

    /// Renders the `timescope` query value, e.g. `custom:2025-02-01-0:2025-02-01-13`
    pub fn timescope(&self) -> String {
        format!(
            "custom:{}:{}",
            format_hour(self.start),
            format_hour(self.end)
        )
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {})",
            self.start.format("%Y-%m-%d %H:00"),
            self.end.format("%Y-%m-%d %H:00")
        )
    }
}

fn is_hour_aligned(t: NaiveDateTime) -> bool {
    t.minute() == 0 && t.second() == 0 && t.nanosecond() == 0
}

// Hours are written without a leading zero.
fn format_hour(t: NaiveDateTime) -> String {
    format!("{}-{}", t.format("%Y-%m-%d"), t.hour())
}
