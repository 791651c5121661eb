use std::fmt::{Display, Formatter};

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use time::macros::format_description;
use time::{Date, Duration, OffsetDateTime};

use crate::ValidationError;

/// Whole UTC calendar day, serialized as `YYYY-MM-DD`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CalendarDate(Date);

impl CalendarDate {
    pub fn today() -> Self {
        Self(OffsetDateTime::now_utc().date())
    }

    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        Date::parse(input.trim(), format_description!("[year]-[month]-[day]"))
            .map(Self)
            .map_err(|_| ValidationError::InvalidDate {
                value: input.to_owned(),
            })
    }

    /// Calendar day containing the given unix timestamp (seconds, UTC).
    pub fn from_unix_seconds(seconds: i64) -> Option<Self> {
        OffsetDateTime::from_unix_timestamp(seconds)
            .ok()
            .map(|value| Self(value.date()))
    }

    pub const fn into_inner(self) -> Date {
        self.0
    }

    /// Unix timestamp of midnight UTC at the start of this day.
    pub fn unix_start(self) -> i64 {
        self.0.midnight().assume_utc().unix_timestamp()
    }

    /// Signed number of whole days from `self` to `other`.
    pub fn days_until(self, other: Self) -> i64 {
        (other.0 - self.0).whole_days()
    }

    pub fn saturating_sub_days(self, days: i64) -> Self {
        Self(self.0.checked_sub(Duration::days(days)).unwrap_or(Date::MIN))
    }

    pub fn saturating_add_days(self, days: i64) -> Self {
        Self(self.0.checked_add(Duration::days(days)).unwrap_or(Date::MAX))
    }

    pub fn format_iso(self) -> String {
        format!(
            "{:04}-{:02}-{:02}",
            self.0.year(),
            u8::from(self.0.month()),
            self.0.day()
        )
    }
}

impl Display for CalendarDate {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.format_iso())
    }
}

impl Serialize for CalendarDate {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.format_iso())
    }
}

impl<'de> Deserialize<'de> for CalendarDate {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Self::parse(&value).map_err(D::Error::custom)
    }
}

/// Closed range of calendar days with `since < until`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    since: CalendarDate,
    until: CalendarDate,
}

impl DateRange {
    pub fn new(since: CalendarDate, until: CalendarDate) -> Result<Self, ValidationError> {
        if since >= until {
            return Err(ValidationError::InvalidDateRange {
                since: since.format_iso(),
                until: until.format_iso(),
            });
        }
        Ok(Self { since, until })
    }

    /// The `lookback_days` days ending at `until`.
    pub fn trailing(until: CalendarDate, lookback_days: u32) -> Result<Self, ValidationError> {
        Self::new(
            until.saturating_sub_days(i64::from(lookback_days)),
            until,
        )
    }

    pub const fn since(self) -> CalendarDate {
        self.since
    }

    pub const fn until(self) -> CalendarDate {
        self.until
    }

    pub fn contains(self, date: CalendarDate) -> bool {
        self.since <= date && date <= self.until
    }
}
