use thiserror::Error;

/// Raised when a `YYYY-MM-DD` or `HH:MM` string cannot be turned into a typed value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("invalid date '{0}', expected YYYY-MM-DD")]
    InvalidDate(String),
    #[error("invalid time '{0}', expected HH:MM")]
    InvalidTime(String),
}

/// Input rejected at the transport boundary. Each variant maps to a stable error code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("description must not be empty")]
    MissingDescription,
    #[error("date is required")]
    MissingDate,
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("start time is required")]
    MissingStartTime,
    #[error("end time is required for start/stop entries")]
    MissingEndTime,
    #[error("duration must be between 1 and 1440 minutes")]
    InvalidDuration,
    #[error("at least one project tag is required")]
    MissingProjectTags,
    #[error("unknown entry method '{0}'")]
    InvalidMethod(String),
    #[error("tag name must not be empty")]
    MissingTagName,
    #[error("range needs both start and end, with start <= end")]
    InvalidRange,
    #[error("weekly target must be at least 60 minutes")]
    InvalidWeeklyTarget,
}

impl ValidationError {
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::MissingDescription => "missing_description",
            ValidationError::MissingDate => "missing_date",
            ValidationError::Parse(ParseError::InvalidDate(_)) => "invalid_date",
            ValidationError::Parse(ParseError::InvalidTime(_)) => "invalid_time",
            ValidationError::MissingStartTime => "missing_start_time",
            ValidationError::MissingEndTime => "missing_end_time",
            ValidationError::InvalidDuration => "invalid_duration",
            ValidationError::MissingProjectTags => "missing_project_tags",
            ValidationError::InvalidMethod(_) => "invalid_method",
            ValidationError::MissingTagName => "missing_tag_name",
            ValidationError::InvalidRange => "invalid_range",
            ValidationError::InvalidWeeklyTarget => "invalid_weekly_target_minutes",
        }
    }
}
