//! Dashboard metrics: day and week totals, deltas, weekly-target progress and project ranking.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use time::{Date, Duration};

use crate::{
    clock::{format_duration, iso_date},
    filter,
    model::Activity,
    range::{DateRange, RangeFilter},
};

pub const DEFAULT_WEEKLY_TARGET_MINUTES: i64 = 24 * 60;

/// Name reported when no activity in the set carries a tag.
pub const NO_PROJECT: &str = "None";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TodaySummary {
    pub total_time: String,
    pub total_minutes: i64,
    pub compared_to_yesterday: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeekSummary {
    pub total_time: String,
    pub total_minutes: i64,
    pub target: String,
    pub target_minutes: i64,
    pub progress: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectTotal {
    pub name: String,
    pub minutes: i64,
    pub percentage: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayTotal {
    #[serde(with = "iso_date")]
    pub date: Date,
    pub total_minutes: i64,
    pub total_time: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub today: TodaySummary,
    pub week: WeekSummary,
    pub top_project: ProjectTotal,
    pub days: Vec<DayTotal>,
}

impl Dashboard {
    /// Builds the view from any superset of the relevant activities; today, yesterday and the
    /// current week are selected here.
    pub fn build(activities: &[Activity], today: Date, weekly_target_minutes: i64) -> Self {
        let yesterday = today - Duration::days(1);
        let week = RangeFilter::ThisWeek.resolve(today);

        let today_set = filter::by_exact_date(activities, today);
        let yesterday_set = filter::by_exact_date(activities, yesterday);
        let week_set = filter::by_range(activities, week);

        let today_minutes = total_minutes(&today_set);
        let week_minutes = total_minutes(&week_set);

        Dashboard {
            today: TodaySummary {
                total_time: format_duration(today_minutes),
                total_minutes: today_minutes,
                compared_to_yesterday: percent_delta(today_minutes, total_minutes(&yesterday_set)),
            },
            week: WeekSummary {
                total_time: format_duration(week_minutes),
                total_minutes: week_minutes,
                target: format_duration(weekly_target_minutes),
                target_minutes: weekly_target_minutes,
                progress: week_progress(week_minutes, weekly_target_minutes),
            },
            top_project: top_project(&week_set),
            days: daily_totals(&week_set, week),
        }
    }
}

pub fn total_minutes(activities: &[Activity]) -> i64 {
    activities
        .iter()
        .fold(0i64, |acc, a| acc.saturating_add(a.duration_minutes))
}

/// Percentage change from `previous` to `current`, rounded. Zero when `previous` is zero;
/// that is a policy for "no baseline", not a claim of "no change".
pub fn percent_delta(current: i64, previous: i64) -> i64 {
    if previous <= 0 {
        return 0;
    }
    round_half_up((current as f64 - previous as f64) / previous as f64 * 100.)
}

/// Progress toward the weekly target in percent, clamped to `0..=100`.
pub fn week_progress(week_minutes: i64, target_minutes: i64) -> i64 {
    if target_minutes <= 0 {
        return 0;
    }
    round_half_up(week_minutes as f64 / target_minutes as f64 * 100.).clamp(0, 100)
}

/// Per-tag minute totals, largest first.
///
/// Every tag on an activity receives the activity's full duration; repeated tags within one
/// activity count once. Equal totals keep the order in which tags were first seen, so the
/// head of the list is the first maximum encountered.
pub fn rank_projects(activities: &[Activity]) -> Vec<ProjectTotal> {
    let mut order: Vec<(&str, i64)> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for activity in activities {
        let mut seen: HashSet<&str> = HashSet::new();
        for tag in &activity.project_tags {
            let tag = tag.as_str();
            if !seen.insert(tag) {
                continue;
            }
            match index.get(tag) {
                Some(&i) => order[i].1 = order[i].1.saturating_add(activity.duration_minutes),
                None => {
                    index.insert(tag, order.len());
                    order.push((tag, activity.duration_minutes));
                }
            }
        }
    }

    let total = total_minutes(activities);
    let mut ranked: Vec<ProjectTotal> = order
        .into_iter()
        .map(|(name, minutes)| ProjectTotal {
            name: name.to_string(),
            minutes,
            percentage: share(minutes, total),
        })
        .collect();
    // Stable: ties stay in first-seen order.
    ranked.sort_by(|a, b| b.minutes.cmp(&a.minutes));
    ranked
}

/// The tag with the largest total, or `{"None", 0, 0}` when nothing is tagged.
pub fn top_project(activities: &[Activity]) -> ProjectTotal {
    rank_projects(activities)
        .into_iter()
        .next()
        .unwrap_or_else(|| ProjectTotal {
            name: NO_PROJECT.to_string(),
            minutes: 0,
            percentage: 0,
        })
}

/// Minutes per day for every day in `range`, including days with nothing logged.
pub fn daily_totals(activities: &[Activity], range: DateRange) -> Vec<DayTotal> {
    let mut per_day: HashMap<Date, i64> = HashMap::new();
    for a in activities.iter().filter(|a| range.contains(a.date)) {
        let day = per_day.entry(a.date).or_insert(0i64);
        *day = day.saturating_add(a.duration_minutes);
    }
    range
        .days()
        .map(|date| {
            let minutes = per_day.get(&date).copied().unwrap_or(0);
            DayTotal {
                date,
                total_minutes: minutes,
                total_time: format_duration(minutes),
            }
        })
        .collect()
}

fn share(part: i64, whole: i64) -> i64 {
    if whole <= 0 {
        0
    } else {
        round_half_up(part as f64 / whole as f64 * 100.)
    }
}

/// Rounds .5 toward positive infinity, for negative values too.
fn round_half_up(value: f64) -> i64 {
    (value + 0.5).floor() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::parse_date;

    fn d(s: &str) -> Date {
        parse_date(s).unwrap()
    }

    fn activity(id: i64, date: &str, minutes: i64, tags: &[&str]) -> Activity {
        Activity {
            id,
            description: format!("activity {id}"),
            date: d(date),
            start_time: "09:00".parse().unwrap(),
            end_time: None,
            duration_minutes: minutes,
            project_tags: tags.iter().map(|t| t.to_string()).collect(),
            created_at: String::new(),
        }
    }

    #[test]
    fn total_minutes_is_an_order_independent_sum() {
        assert_eq!(total_minutes(&[]), 0);
        let mut set = vec![
            activity(1, "2024-01-01", 15, &["A"]),
            activity(2, "2024-01-01", 45, &["B"]),
            activity(3, "2024-01-02", 60, &["A"]),
        ];
        assert_eq!(total_minutes(&set), 120);
        set.reverse();
        assert_eq!(total_minutes(&set), 120);
    }

    #[test]
    fn oversized_durations_saturate_instead_of_overflowing() {
        let set = vec![
            activity(1, "2024-01-03", i64::MAX, &["A"]),
            activity(2, "2024-01-03", 30, &["A", "B"]),
        ];
        assert_eq!(total_minutes(&set), i64::MAX);
        assert_eq!(top_project(&set).minutes, i64::MAX);
        assert_eq!(percent_delta(i64::MAX, 60), i64::MAX);
        assert_eq!(percent_delta(0, i64::MAX), -100);

        let dash = Dashboard::build(&set, d("2024-01-03"), DEFAULT_WEEKLY_TARGET_MINUTES);
        assert_eq!(dash.week.progress, 100);
        assert_eq!(dash.top_project.percentage, 100);
    }

    #[test]
    fn percent_delta_rounds_and_guards_zero() {
        assert_eq!(percent_delta(30, 0), 0);
        assert_eq!(percent_delta(0, 0), 0);
        assert_eq!(percent_delta(90, 60), 50);
        assert_eq!(percent_delta(30, 60), -50);
        assert_eq!(percent_delta(1, 3), -67);
        // halves round toward +inf
        assert_eq!(percent_delta(9, 8), 13);
        assert_eq!(percent_delta(7, 8), -12);
    }

    #[test]
    fn week_progress_is_monotonic_and_clamped() {
        let mut last = 0;
        for minutes in (0..=3000).step_by(7) {
            let p = week_progress(minutes, DEFAULT_WEEKLY_TARGET_MINUTES);
            assert!(p >= last);
            assert!(p <= 100);
            last = p;
        }
        assert_eq!(week_progress(720, 1440), 50);
        assert_eq!(week_progress(1440, 1440), 100);
        assert_eq!(week_progress(5000, 1440), 100);
        assert_eq!(week_progress(100, 0), 0);
    }

    #[test]
    fn shared_activity_counts_fully_for_each_tag() {
        let set = vec![
            activity(1, "2024-01-01", 60, &["A"]),
            activity(2, "2024-01-01", 30, &["A", "B"]),
        ];
        let top = top_project(&set);
        assert_eq!(
            top,
            ProjectTotal {
                name: "A".into(),
                minutes: 90,
                percentage: 100
            }
        );
        let ranked = rank_projects(&set);
        assert_eq!(ranked[1].name, "B");
        assert_eq!(ranked[1].minutes, 30);
        assert_eq!(ranked[1].percentage, 33);
    }

    #[test]
    fn ties_go_to_the_first_tag_seen() {
        let set = vec![
            activity(1, "2024-01-01", 20, &["Later"]),
            activity(2, "2024-01-01", 20, &["Earlier"]),
        ];
        assert_eq!(top_project(&set).name, "Later");

        let set = vec![
            activity(1, "2024-01-01", 10, &["X", "Y"]),
            activity(2, "2024-01-01", 10, &["Y", "X"]),
        ];
        assert_eq!(top_project(&set).name, "X");
    }

    #[test]
    fn duplicate_tags_on_one_activity_count_once() {
        let set = vec![activity(1, "2024-01-01", 25, &["A", "A"])];
        assert_eq!(top_project(&set).minutes, 25);
    }

    #[test]
    fn no_tags_means_none_project() {
        let set = vec![activity(1, "2024-01-01", 25, &[])];
        let top = top_project(&set);
        assert_eq!(top.name, NO_PROJECT);
        assert_eq!(top.minutes, 0);
        assert_eq!(top.percentage, 0);
        assert_eq!(top_project(&[]).name, NO_PROJECT);
    }

    #[test]
    fn zero_length_week_gives_zero_percentage() {
        let set = vec![activity(1, "2024-01-01", 0, &["A"])];
        let top = top_project(&set);
        assert_eq!(top.name, "A");
        assert_eq!(top.percentage, 0);
    }

    #[test]
    fn daily_totals_fill_empty_days() {
        let set = vec![
            activity(1, "2024-01-01", 30, &["A"]),
            activity(2, "2024-01-01", 15, &["A"]),
            activity(3, "2024-01-03", 60, &["A"]),
            activity(4, "2024-01-09", 60, &["A"]),
        ];
        let days = daily_totals(&set, DateRange::new(d("2024-01-01"), d("2024-01-03")));
        let minutes: Vec<i64> = days.iter().map(|t| t.total_minutes).collect();
        assert_eq!(minutes, vec![45, 0, 60]);
        assert_eq!(days[0].total_time, "45m");
        assert_eq!(days[2].total_time, "1h 0m");
    }

    #[test]
    fn dashboard_for_a_wednesday() {
        // Week of Sun 2023-12-31 .. Wed 2024-01-03.
        let all = vec![
            activity(1, "2024-01-03", 90, &["Work"]),
            activity(2, "2024-01-03", 30, &["Personal"]),
            activity(3, "2024-01-02", 60, &["Work"]),
            activity(4, "2023-12-31", 120, &["Learning"]),
            activity(5, "2023-12-30", 600, &["Learning"]),
        ];
        let dash = Dashboard::build(&all, d("2024-01-03"), 1440);

        assert_eq!(dash.today.total_minutes, 120);
        assert_eq!(dash.today.total_time, "2h 0m");
        assert_eq!(dash.today.compared_to_yesterday, 100);

        assert_eq!(dash.week.total_minutes, 300);
        assert_eq!(dash.week.total_time, "5h 0m");
        assert_eq!(dash.week.target, "24h 0m");
        assert_eq!(dash.week.progress, 21);

        assert_eq!(dash.top_project.name, "Work");
        assert_eq!(dash.top_project.minutes, 150);
        assert_eq!(dash.top_project.percentage, 50);

        assert_eq!(dash.days.len(), 4);
        assert_eq!(dash.days[0].date, d("2023-12-31"));
    }

    #[test]
    fn removing_an_activity_changes_totals() {
        let mut all = vec![
            activity(1, "2024-01-03", 90, &["Work"]),
            activity(2, "2024-01-03", 30, &["Personal"]),
        ];
        let before = Dashboard::build(&all, d("2024-01-03"), 1440);
        all.retain(|a| a.id != 1);
        let after = Dashboard::build(&all, d("2024-01-03"), 1440);
        assert_eq!(before.today.total_minutes, 120);
        assert_eq!(after.today.total_minutes, 30);
        assert_eq!(after.top_project.name, "Personal");

        all.clear();
        let empty = Dashboard::build(&all, d("2024-01-03"), 1440);
        assert_eq!(empty.today.total_minutes, 0);
        assert_eq!(empty.week.progress, 0);
        assert_eq!(empty.top_project.name, NO_PROJECT);
    }

    #[test]
    fn dashboard_serializes_with_camel_case_keys() {
        let dash = Dashboard::build(&[], d("2024-01-03"), 1440);
        let v = serde_json::to_value(&dash).unwrap();
        assert_eq!(v["today"]["totalTime"], "0m");
        assert_eq!(v["today"]["comparedToYesterday"], 0);
        assert_eq!(v["week"]["target"], "24h 0m");
        assert_eq!(v["topProject"]["name"], "None");
        assert_eq!(v["days"][0]["date"], "2023-12-31");
    }
}
