use serde::{Deserialize, Deserializer, Serialize};
use time::Date;

use crate::{
    clock::{self, add_minutes, iso_date, minutes_between, parse_date, ClockTime, MINUTES_PER_DAY},
    error::ValidationError,
};

/// A logged unit of work. The core only ever reads these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub id: i64,
    pub description: String,
    #[serde(with = "iso_date")]
    pub date: Date,
    pub start_time: ClockTime,
    /// Only present for activities entered with start/stop times.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<ClockTime>,
    pub duration_minutes: i64,
    pub project_tags: Vec<String>,
    pub created_at: String,
}

impl Activity {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.project_tags.iter().any(|t| t == tag)
    }

    pub fn method(&self) -> EntryMethod {
        if self.end_time.is_some() {
            EntryMethod::StartStop
        } else {
            EntryMethod::Duration
        }
    }

    /// The recorded end time, or the start time advanced by the duration.
    pub fn effective_end_time(&self) -> ClockTime {
        self.end_time
            .unwrap_or_else(|| add_minutes(self.start_time, self.duration_minutes))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectTag {
    pub id: i64,
    pub name: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryMethod {
    StartStop,
    Duration,
}

impl EntryMethod {
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        match raw.trim() {
            "start_stop" | "startStop" => Ok(EntryMethod::StartStop),
            "duration" => Ok(EntryMethod::Duration),
            other => Err(ValidationError::InvalidMethod(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntryMethod::StartStop => "start_stop",
            EntryMethod::Duration => "duration",
        }
    }
}

/// Longest duration a single entry may claim. An activity belongs to one date.
pub const MAX_DURATION_MINUTES: i64 = MINUTES_PER_DAY;

/// A validated activity ready to be written. Duration is always derived or checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityDraft {
    pub description: String,
    pub date: Date,
    pub start_time: ClockTime,
    pub end_time: Option<ClockTime>,
    pub duration_minutes: i64,
    pub project_tags: Vec<String>,
}

/// Raw create payload, as received over the wire.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityInput {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    /// `start_stop` or `duration`. Inferred from the presence of `end_time` when omitted.
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(default)]
    pub duration_minutes: Option<i64>,
    #[serde(default)]
    pub project_tags: Vec<String>,
}

impl ActivityInput {
    pub fn validate(self) -> Result<ActivityDraft, ValidationError> {
        let description = self
            .description
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .ok_or(ValidationError::MissingDescription)?
            .to_string();

        let date = match non_empty(self.date.as_deref()) {
            Some(raw) => parse_date(raw)?,
            None => return Err(ValidationError::MissingDate),
        };

        let project_tags = normalize_tags(self.project_tags);
        if project_tags.is_empty() {
            return Err(ValidationError::MissingProjectTags);
        }

        let end_raw = non_empty(self.end_time.as_deref());
        let method = match self.method.as_deref() {
            Some(m) => EntryMethod::parse(m)?,
            None if end_raw.is_some() => EntryMethod::StartStop,
            None => EntryMethod::Duration,
        };

        let start_time: ClockTime = non_empty(self.start_time.as_deref())
            .ok_or(ValidationError::MissingStartTime)?
            .parse()?;

        let (end_time, duration_minutes) = match method {
            EntryMethod::StartStop => {
                let end: ClockTime = end_raw.ok_or(ValidationError::MissingEndTime)?.parse()?;
                (Some(end), minutes_between(start_time, end))
            }
            EntryMethod::Duration => {
                let minutes = self
                    .duration_minutes
                    .filter(|m| (1..=MAX_DURATION_MINUTES).contains(m))
                    .ok_or(ValidationError::InvalidDuration)?;
                (None, minutes)
            }
        };

        Ok(ActivityDraft {
            description,
            date,
            start_time,
            end_time,
            duration_minutes,
            project_tags,
        })
    }
}

/// Partial update. Missing fields keep the stored value.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityPatch {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub start_time: Option<String>,
    /// Absent keeps the stored end time. `null` or a blank string clears it.
    #[serde(default, deserialize_with = "clearable")]
    pub end_time: Option<Option<String>>,
    #[serde(default)]
    pub duration_minutes: Option<i64>,
    #[serde(default)]
    pub project_tags: Option<Vec<String>>,
}

impl ActivityPatch {
    /// Merges the patch over `existing` and validates the result like a fresh entry.
    ///
    /// Sending an end time switches to start/stop. Clearing the end time, or sending only
    /// `duration_minutes`, switches to duration mode; the stored duration is kept unless a new
    /// one is given.
    pub fn apply(self, existing: &Activity) -> Result<ActivityDraft, ValidationError> {
        let end_patch = self
            .end_time
            .map(|end| end.filter(|e| !e.trim().is_empty()));

        let method = match self.method.as_deref() {
            Some(m) => EntryMethod::parse(m)?,
            None => match &end_patch {
                Some(Some(_)) => EntryMethod::StartStop,
                Some(None) => EntryMethod::Duration,
                None if self.duration_minutes.is_some() => EntryMethod::Duration,
                None => existing.method(),
            },
        };

        let end_time = match (method, end_patch) {
            (EntryMethod::Duration, _) => None,
            (EntryMethod::StartStop, Some(end)) => end,
            (EntryMethod::StartStop, None) => existing.end_time.map(String::from),
        };

        ActivityInput {
            description: self.description.or_else(|| Some(existing.description.clone())),
            date: self
                .date
                .or_else(|| Some(clock::format_date(existing.date))),
            method: Some(method.as_str().to_string()),
            start_time: self
                .start_time
                .or_else(|| Some(existing.start_time.to_string())),
            end_time,
            duration_minutes: self.duration_minutes.or(Some(existing.duration_minutes)),
            project_tags: self
                .project_tags
                .unwrap_or_else(|| existing.project_tags.clone()),
        }
        .validate()
    }
}

/// Trims tag names, drops empties and keeps the first occurrence of each (case-sensitive).
pub fn normalize_tags(raw: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(raw.len());
    for tag in raw {
        let tag = tag.trim();
        if !tag.is_empty() && !out.iter().any(|t| t == tag) {
            out.push(tag.to_string());
        }
    }
    out
}

/// Keeps "field absent" (`None`) apart from "field set to null" (`Some(None)`).
fn clearable<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ParseError;

    fn input() -> ActivityInput {
        ActivityInput {
            description: Some("  Write report ".to_string()),
            date: Some("2024-01-01".to_string()),
            method: None,
            start_time: Some("09:00".to_string()),
            end_time: None,
            duration_minutes: Some(30),
            project_tags: vec!["Work".to_string()],
        }
    }

    #[test]
    fn duration_entry_keeps_supplied_minutes() {
        let draft = input().validate().unwrap();
        assert_eq!(draft.description, "Write report");
        assert_eq!(draft.duration_minutes, 30);
        assert_eq!(draft.end_time, None);
    }

    #[test]
    fn start_stop_entry_derives_duration_across_midnight() {
        let draft = ActivityInput {
            start_time: Some("23:15".to_string()),
            end_time: Some("00:45".to_string()),
            duration_minutes: None,
            ..input()
        }
        .validate()
        .unwrap();
        assert_eq!(draft.duration_minutes, 90);
        assert_eq!(draft.end_time, Some("00:45".parse().unwrap()));
    }

    #[test]
    fn rejects_missing_or_bad_fields() {
        let err = |i: ActivityInput| i.validate().unwrap_err().code();

        assert_eq!(
            err(ActivityInput { description: Some("   ".into()), ..input() }),
            "missing_description"
        );
        assert_eq!(err(ActivityInput { date: None, ..input() }), "missing_date");
        assert_eq!(
            err(ActivityInput { date: Some("01/02/2024".into()), ..input() }),
            "invalid_date"
        );
        assert_eq!(
            err(ActivityInput { project_tags: vec![" ".into()], ..input() }),
            "missing_project_tags"
        );
        assert_eq!(
            err(ActivityInput { duration_minutes: Some(0), ..input() }),
            "invalid_duration"
        );
        assert_eq!(
            err(ActivityInput { method: Some("start_stop".into()), ..input() }),
            "missing_end_time"
        );
        assert_eq!(
            err(ActivityInput { start_time: Some("25:00".into()), ..input() }),
            "invalid_time"
        );
        assert_eq!(
            err(ActivityInput { method: Some("guess".into()), ..input() }),
            "invalid_method"
        );
    }

    #[test]
    fn duration_is_capped_at_one_day() {
        let full_day = ActivityInput {
            duration_minutes: Some(MAX_DURATION_MINUTES),
            ..input()
        };
        assert_eq!(full_day.validate().unwrap().duration_minutes, 1440);

        for minutes in [MAX_DURATION_MINUTES + 1, i64::MAX, -5] {
            let err = ActivityInput {
                duration_minutes: Some(minutes),
                ..input()
            }
            .validate()
            .unwrap_err();
            assert_eq!(err, ValidationError::InvalidDuration);
        }
    }

    #[test]
    fn tags_are_trimmed_and_deduplicated() {
        let tags = normalize_tags(vec![
            " A".into(),
            "B".into(),
            "A".into(),
            "".into(),
            "a".into(),
        ]);
        assert_eq!(tags, vec!["A", "B", "a"]);
    }

    fn stored() -> Activity {
        Activity {
            id: 7,
            description: "Standup".into(),
            date: parse_date("2024-01-02").unwrap(),
            start_time: "10:00".parse().unwrap(),
            end_time: Some("10:15".parse().unwrap()),
            duration_minutes: 15,
            project_tags: vec!["Work".into()],
            created_at: "2024-01-02T10:15:00Z".into(),
        }
    }

    #[test]
    fn patch_keeps_untouched_fields() {
        let draft = ActivityPatch {
            description: Some("Daily standup".into()),
            ..Default::default()
        }
        .apply(&stored())
        .unwrap();
        assert_eq!(draft.description, "Daily standup");
        assert_eq!(draft.duration_minutes, 15);
        assert_eq!(draft.end_time, Some("10:15".parse().unwrap()));
        assert_eq!(draft.project_tags, vec!["Work"]);
    }

    #[test]
    fn patch_rederives_duration_when_end_moves() {
        let draft = ActivityPatch {
            end_time: Some(Some("11:00".into())),
            ..Default::default()
        }
        .apply(&stored())
        .unwrap();
        assert_eq!(draft.duration_minutes, 60);
    }

    #[test]
    fn patch_with_duration_switches_method() {
        let draft = ActivityPatch {
            duration_minutes: Some(40),
            ..Default::default()
        }
        .apply(&stored())
        .unwrap();
        assert_eq!(draft.end_time, None);
        assert_eq!(draft.duration_minutes, 40);
    }

    #[test]
    fn patch_clearing_end_time_switches_to_duration() {
        for body in [
            serde_json::json!({ "endTime": null }),
            serde_json::json!({ "endTime": "  " }),
        ] {
            let patch: ActivityPatch = serde_json::from_value(body).unwrap();
            let draft = patch.apply(&stored()).unwrap();
            assert_eq!(draft.end_time, None);
            assert_eq!(draft.duration_minutes, 15);
        }

        let patch: ActivityPatch =
            serde_json::from_value(serde_json::json!({ "endTime": "", "durationMinutes": 40 }))
                .unwrap();
        let draft = patch.apply(&stored()).unwrap();
        assert_eq!(draft.end_time, None);
        assert_eq!(draft.duration_minutes, 40);
    }

    #[test]
    fn patch_without_end_time_keeps_it() {
        let patch: ActivityPatch =
            serde_json::from_value(serde_json::json!({ "description": "Sync" })).unwrap();
        assert_eq!(patch.end_time, None);
        let draft = patch.apply(&stored()).unwrap();
        assert_eq!(draft.end_time, Some("10:15".parse().unwrap()));
    }

    #[test]
    fn patch_clearing_end_time_under_start_stop_is_rejected() {
        let err = ActivityPatch {
            method: Some("start_stop".into()),
            end_time: Some(None),
            ..Default::default()
        }
        .apply(&stored())
        .unwrap_err();
        assert_eq!(err, ValidationError::MissingEndTime);
    }

    #[test]
    fn patch_reports_parse_errors() {
        let err = ActivityPatch {
            date: Some("2024-13-01".into()),
            ..Default::default()
        }
        .apply(&stored())
        .unwrap_err();
        assert_eq!(
            err,
            ValidationError::Parse(ParseError::InvalidDate("2024-13-01".into()))
        );
    }

    #[test]
    fn effective_end_time_uses_duration_when_no_end() {
        let mut a = stored();
        a.end_time = None;
        a.duration_minutes = 130;
        assert_eq!(a.effective_end_time(), "12:10".parse().unwrap());
    }

    #[test]
    fn effective_end_time_survives_oversized_stored_duration() {
        let mut a = stored();
        a.end_time = None;
        a.duration_minutes = i64::MAX;
        assert_eq!(a.effective_end_time(), "04:07".parse().unwrap());
    }
}
