use chrono::{Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::MESSAGE_RESOURCE_NAME;

/// Chronological key of one message-history shard. Ordered by year, then
/// month, then day (the derived `Ord` is exactly that order).
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
pub struct Location {
    pub year: i32,
    pub month: u32,
    pub day: u32,
}

impl Location {
    /// Sentinel meaning "no older data exists". Never produced by
    /// arithmetic, only as a traversal result.
    pub const END: Location = Location {
        year: 0,
        month: 0,
        day: 0,
    };

    pub fn new(year: i32, month: u32, day: u32) -> Self {
        Self { year, month, day }
    }

    pub fn is_end(&self) -> bool {
        self.year == 0 && self.month == 0 && self.day == 0
    }

    pub fn today() -> Self {
        Self::from_date(Utc::now().date_naive())
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
            day: date.day(),
        }
    }

    pub fn to_date(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, self.day)
    }

    /// Calendar arithmetic with month/year rollover. `None` when the
    /// location does not name a real calendar date (the end sentinel
    /// included) or the result leaves the representable range.
    pub fn add_days(&self, days: i64) -> Option<Location> {
        let date = self.to_date()?;
        let shifted = date.checked_add_signed(Duration::days(days))?;
        Some(Self::from_date(shifted))
    }

    /// Re-derives the location from a message shard URL of the form
    /// `<container>/<year>/<MM>/<DD>/chat.ttl`.
    pub fn from_resource_url(resource_url: &str) -> Option<Location> {
        let trimmed = resource_url.strip_suffix(MESSAGE_RESOURCE_NAME)?;
        let mut components = trimmed.trim_end_matches('/').rsplit('/');
        let day = parse_padded(components.next()?)?;
        let month = parse_padded(components.next()?)?;
        let year = components.next()?.parse::<i32>().ok()?;
        Some(Location { year, month, day })
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{:02}/{:02}", self.year, self.month, self.day)
    }
}

/// Parses a container name, tolerating one leading zero ("07" and "7").
pub fn parse_padded(component: &str) -> Option<u32> {
    component.trim_start_matches('0').parse::<u32>().ok().or_else(|| {
        // all zeros would strip to the empty string
        if component.chars().all(|c| c == '0') && !component.is_empty() {
            Some(0)
        } else {
            None
        }
    })
}
