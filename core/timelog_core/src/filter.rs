//! Selection of activity subsets. All functions return fresh, owned vectors and never fail.

use std::cmp::Ordering;

use time::Date;

use crate::{model::Activity, range::DateRange};

/// Activities logged on `date`, earliest start first.
pub fn by_exact_date(activities: &[Activity], date: Date) -> Vec<Activity> {
    let mut out: Vec<Activity> = activities
        .iter()
        .filter(|a| a.date == date)
        .cloned()
        .collect();
    out.sort_by_key(|a| a.start_time);
    out
}

/// Activities whose date lies in the closed `range`, newest date first and earliest start
/// first within a date.
pub fn by_range(activities: &[Activity], range: DateRange) -> Vec<Activity> {
    let mut out: Vec<Activity> = activities
        .iter()
        .filter(|a| range.contains(a.date))
        .cloned()
        .collect();
    out.sort_by(newest_day_first);
    out
}

/// Activities carrying `tag` (exact, case-sensitive), ordered like [`by_range`].
pub fn by_tag(activities: &[Activity], tag: &str) -> Vec<Activity> {
    let mut out: Vec<Activity> = activities
        .iter()
        .filter(|a| a.has_tag(tag))
        .cloned()
        .collect();
    out.sort_by(newest_day_first);
    out
}

fn newest_day_first(a: &Activity, b: &Activity) -> Ordering {
    b.date
        .cmp(&a.date)
        .then_with(|| a.start_time.cmp(&b.start_time))
}
