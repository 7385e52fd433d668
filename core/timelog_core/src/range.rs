//! Named date windows ("today", "thisWeek", ...) resolved against an explicit reference date.
//!
//! Weeks start on Sunday. Nothing here reads the wall clock; callers pass `today`.

use serde::Serialize;
use time::{Date, Duration};

use crate::clock::iso_date;

/// Inclusive `[start_date, end_date]` window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DateRange {
    #[serde(with = "iso_date")]
    pub start_date: Date,
    #[serde(with = "iso_date")]
    pub end_date: Date,
}

impl DateRange {
    pub fn new(start_date: Date, end_date: Date) -> Self {
        Self {
            start_date,
            end_date,
        }
    }

    pub fn single(day: Date) -> Self {
        Self::new(day, day)
    }

    pub fn contains(&self, date: Date) -> bool {
        self.start_date <= date && date <= self.end_date
    }

    /// Every calendar day in the window, oldest first. Empty when start > end.
    pub fn days(&self) -> impl Iterator<Item = Date> {
        let end = self.end_date;
        std::iter::successors(Some(self.start_date), |d| d.next_day())
            .take_while(move |d| *d <= end)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeFilter {
    Today,
    Yesterday,
    /// Sunday of the current week up to and including today.
    ThisWeek,
    /// The full Sunday..Saturday week before the current one.
    LastWeek,
    ThisMonth,
    /// Fallback for unknown keywords: the 30 days before today, plus today.
    Trailing30Days,
    Custom(DateRange),
}

impl RangeFilter {
    /// Unknown keywords fall back to [`RangeFilter::Trailing30Days`].
    pub fn from_keyword(keyword: &str) -> Self {
        match keyword.trim() {
            "today" => RangeFilter::Today,
            "yesterday" => RangeFilter::Yesterday,
            "thisWeek" | "this_week" => RangeFilter::ThisWeek,
            "lastWeek" | "last_week" => RangeFilter::LastWeek,
            "thisMonth" | "this_month" => RangeFilter::ThisMonth,
            _ => RangeFilter::Trailing30Days,
        }
    }

    pub fn keyword(&self) -> &'static str {
        match self {
            RangeFilter::Today => "today",
            RangeFilter::Yesterday => "yesterday",
            RangeFilter::ThisWeek => "thisWeek",
            RangeFilter::LastWeek => "lastWeek",
            RangeFilter::ThisMonth => "thisMonth",
            RangeFilter::Trailing30Days => "last30Days",
            RangeFilter::Custom(_) => "custom",
        }
    }

    pub fn resolve(&self, today: Date) -> DateRange {
        match self {
            RangeFilter::Today => DateRange::single(today),
            RangeFilter::Yesterday => DateRange::single(today - Duration::days(1)),
            RangeFilter::ThisWeek => DateRange::new(week_start(today), today),
            RangeFilter::LastWeek => {
                let end = week_start(today) - Duration::days(1);
                DateRange::new(end - Duration::days(6), end)
            }
            RangeFilter::ThisMonth => {
                DateRange::new(today - Duration::days(today.day() as i64 - 1), today)
            }
            RangeFilter::Trailing30Days => DateRange::new(today - Duration::days(30), today),
            RangeFilter::Custom(range) => *range,
        }
    }
}

/// The Sunday on or before `day`.
pub fn week_start(day: Date) -> Date {
    day - Duration::days(day.weekday().number_days_from_sunday() as i64)
}

/// Keyword shortcut for `RangeFilter::from_keyword(keyword).resolve(today)`.
pub fn date_range(keyword: &str, today: Date) -> DateRange {
    RangeFilter::from_keyword(keyword).resolve(today)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::parse_date;

    fn d(s: &str) -> Date {
        parse_date(s).unwrap()
    }

    // 2024-01-03 is a Wednesday.
    const WEDNESDAY: &str = "2024-01-03";

    #[test]
    fn today_and_yesterday_are_single_days() {
        let today = d(WEDNESDAY);
        assert_eq!(date_range("today", today), DateRange::single(today));
        assert_eq!(date_range("yesterday", today), DateRange::single(d("2024-01-02")));
    }

    #[test]
    fn this_week_is_week_to_date() {
        let r = date_range("thisWeek", d(WEDNESDAY));
        assert_eq!(r, DateRange::new(d("2023-12-31"), d(WEDNESDAY)));
    }

    #[test]
    fn this_week_on_sunday_is_just_today() {
        let sunday = d("2023-12-31");
        assert_eq!(date_range("thisWeek", sunday), DateRange::single(sunday));
    }

    #[test]
    fn last_week_is_previous_sunday_to_saturday() {
        let r = date_range("lastWeek", d(WEDNESDAY));
        assert_eq!(r, DateRange::new(d("2023-12-24"), d("2023-12-30")));
        assert_eq!(r.start_date.weekday(), time::Weekday::Sunday);
        assert_eq!(r.end_date.weekday(), time::Weekday::Saturday);
        assert!(!r.contains(d(WEDNESDAY)));
    }

    #[test]
    fn this_month_starts_on_the_first() {
        let r = date_range("thisMonth", d("2024-03-17"));
        assert_eq!(r, DateRange::new(d("2024-03-01"), d("2024-03-17")));
        let r = date_range("thisMonth", d("2024-03-01"));
        assert_eq!(r, DateRange::single(d("2024-03-01")));
    }

    #[test]
    fn unknown_keyword_is_trailing_thirty_days() {
        let r = date_range("whenever", d("2024-03-31"));
        assert_eq!(r, DateRange::new(d("2024-03-01"), d("2024-03-31")));
        assert_eq!(RangeFilter::from_keyword(""), RangeFilter::Trailing30Days);
    }

    #[test]
    fn custom_range_is_returned_as_is() {
        let custom = DateRange::new(d("2023-05-01"), d("2023-05-10"));
        assert_eq!(RangeFilter::Custom(custom).resolve(d(WEDNESDAY)), custom);
    }

    #[test]
    fn days_lists_each_date_inclusive() {
        let r = DateRange::new(d("2024-02-27"), d("2024-03-01"));
        let days: Vec<Date> = r.days().collect();
        assert_eq!(
            days,
            vec![d("2024-02-27"), d("2024-02-28"), d("2024-02-29"), d("2024-03-01")]
        );
        assert_eq!(DateRange::new(d("2024-03-02"), d("2024-03-01")).days().count(), 0);
    }
}
