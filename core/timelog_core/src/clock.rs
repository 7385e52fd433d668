//! Clock-time and calendar-date arithmetic.
//!
//! Everything here is pure. Strings are only parsed at the edges (`FromStr`, [`parse_date`]);
//! the arithmetic works on [`ClockTime`] and [`time::Date`].

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use time::{Date, Month};

use crate::error::ParseError;

pub const MINUTES_PER_DAY: i64 = 24 * 60;

/// A wall-clock time of day with minute precision, written as `HH:MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ClockTime(u16);

impl ClockTime {
    pub const MIDNIGHT: ClockTime = ClockTime(0);

    pub fn from_hm(hour: u8, minute: u8) -> Option<Self> {
        if hour < 24 && minute < 60 {
            Some(ClockTime(hour as u16 * 60 + minute as u16))
        } else {
            None
        }
    }

    pub fn hour(self) -> u8 {
        (self.0 / 60) as u8
    }

    pub fn minute(self) -> u8 {
        (self.0 % 60) as u8
    }

    pub fn minutes_since_midnight(self) -> i64 {
        self.0 as i64
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

impl FromStr for ClockTime {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseError::InvalidTime(s.to_string());
        let (h, m) = s.split_once(':').ok_or_else(invalid)?;
        if !is_digits(h, 2) || !is_digits(m, 2) {
            return Err(invalid());
        }
        let hour: u8 = h.parse().map_err(|_| invalid())?;
        let minute: u8 = m.parse().map_err(|_| invalid())?;
        ClockTime::from_hm(hour, minute).ok_or_else(invalid)
    }
}

impl TryFrom<String> for ClockTime {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ClockTime> for String {
    fn from(value: ClockTime) -> Self {
        value.to_string()
    }
}

fn is_digits(s: &str, len: usize) -> bool {
    s.len() == len && s.bytes().all(|b| b.is_ascii_digit())
}

/// Minutes from `start` to `end`. An `end` earlier on the clock than `start` is an overnight
/// span, so a day is added. Equal times are a zero-length span, never a full day.
pub fn minutes_between(start: ClockTime, end: ClockTime) -> i64 {
    let diff = end.minutes_since_midnight() - start.minutes_since_midnight();
    if diff < 0 {
        diff + MINUTES_PER_DAY
    } else {
        diff
    }
}

/// Adds `minutes` to `start`, wrapping at midnight. The date change is discarded.
pub fn add_minutes(start: ClockTime, minutes: i64) -> ClockTime {
    let wrapped =
        (start.minutes_since_midnight() + minutes.rem_euclid(MINUTES_PER_DAY)) % MINUTES_PER_DAY;
    ClockTime(wrapped as u16)
}

/// Renders minutes as `"{h}h {m}m"`, or just `"{m}m"` below an hour.
pub fn format_duration(minutes: i64) -> String {
    let h = minutes / 60;
    let m = minutes % 60;
    if h == 0 {
        format!("{m}m")
    } else {
        format!("{h}h {m}m")
    }
}

pub fn to_12_hour(time: ClockTime) -> String {
    let (hour, suffix) = match time.hour() {
        0 => (12, "AM"),
        h @ 1..=11 => (h, "AM"),
        12 => (12, "PM"),
        h => (h - 12, "PM"),
    };
    format!("{hour}:{:02} {suffix}", time.minute())
}

/// Parses a zero-padded `YYYY-MM-DD` calendar date.
pub fn parse_date(s: &str) -> Result<Date, ParseError> {
    let invalid = || ParseError::InvalidDate(s.to_string());
    let parts: Vec<&str> = s.split('-').collect();
    if parts.len() != 3
        || !is_digits(parts[0], 4)
        || !is_digits(parts[1], 2)
        || !is_digits(parts[2], 2)
    {
        return Err(invalid());
    }
    let y: i32 = parts[0].parse().map_err(|_| invalid())?;
    let m: u8 = parts[1].parse().map_err(|_| invalid())?;
    let d: u8 = parts[2].parse().map_err(|_| invalid())?;
    let month = Month::try_from(m).map_err(|_| invalid())?;
    Date::from_calendar_date(y, month, d).map_err(|_| invalid())
}

pub fn format_date(date: Date) -> String {
    format!(
        "{:04}-{:02}-{:02}",
        date.year(),
        u8::from(date.month()),
        date.day()
    )
}

/// Serde adapter storing a [`Date`] as `YYYY-MM-DD`.
pub mod iso_date {
    use serde::{Deserialize, Deserializer, Serializer};
    use time::Date;

    pub fn serialize<S: Serializer>(date: &Date, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_date(*date))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Date, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_date(&raw).map_err(serde::de::Error::custom)
    }
}
