use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use time::{format_description::well_known::Rfc3339, Date, Duration, OffsetDateTime};
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tracing::{debug, error};

use crate::{
    clock::{format_duration, parse_date, to_12_hour},
    error::ValidationError,
    filter,
    model::{Activity, ActivityInput, ActivityPatch},
    range::{DateRange, RangeFilter},
    store::{self, Settings, MIN_WEEKLY_TARGET_MINUTES},
    summary::{self, Dashboard},
};

const TZ_OFFSET_MINUTES_MIN: i32 = -14 * 60;
const TZ_OFFSET_MINUTES_MAX: i32 = 14 * 60;

#[derive(Clone)]
pub struct AppState {
    conn: Arc<Mutex<Connection>>,
    settings: Arc<Mutex<Settings>>,
}

impl AppState {
    pub fn new(conn: Connection, settings: Settings) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            settings: Arc::new(Mutex::new(settings)),
        }
    }
}

#[derive(Serialize)]
struct OkResponse<T: Serialize> {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
}

#[derive(Serialize)]
struct ErrResponse {
    ok: bool,
    error: &'static str,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid json body")]
    InvalidJson,
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("not found")]
    NotFound,
    #[error("store failure: {0}")]
    Db(#[from] rusqlite::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::InvalidJson => (StatusCode::BAD_REQUEST, "invalid_json"),
            ApiError::Validation(err) => (StatusCode::BAD_REQUEST, err.code()),
            ApiError::NotFound => (StatusCode::NOT_FOUND, "not_found"),
            ApiError::Db(err) => {
                error!("store failure: {err}");
                (StatusCode::INTERNAL_SERVER_ERROR, "db_error")
            }
        };
        (status, Json(ErrResponse { ok: false, error: code })).into_response()
    }
}

type ApiResult = Result<Response, ApiError>;

fn ok<T: Serialize>(data: T) -> ApiResult {
    Ok(Json(OkResponse {
        ok: true,
        data: Some(data),
    })
    .into_response())
}

fn ok_empty() -> ApiResult {
    Ok(Json(OkResponse::<Value> { ok: true, data: None }).into_response())
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(HeaderValue::from_static("*"))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([axum::http::header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(health))
        .route(
            "/activities",
            get(list_activities).post(create_activity).options(options_ok),
        )
        .route(
            "/activities/:id",
            get(get_activity)
                .patch(patch_activity)
                .delete(delete_activity)
                .options(options_ok),
        )
        .route("/tags", get(list_tags).post(create_tag).options(options_ok))
        .route("/tags/:name/activities", get(tag_activities))
        .route("/summary", get(get_summary))
        .route("/projects", get(get_projects))
        .route("/range", get(get_range))
        .route(
            "/settings",
            get(get_settings).post(post_settings).options(options_ok),
        )
        .with_state(state)
        .layer(cors)
}

async fn options_ok() -> impl IntoResponse {
    StatusCode::OK
}

#[derive(Serialize)]
struct HealthInfo {
    service: &'static str,
    version: &'static str,
}

async fn health() -> impl IntoResponse {
    Json(OkResponse {
        ok: true,
        data: Some(HealthInfo {
            service: "timelog_core",
            version: env!("CARGO_PKG_VERSION"),
        }),
    })
}

/// Activity as sent to clients, with display labels attached.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ActivityView<'a> {
    #[serde(flatten)]
    activity: &'a Activity,
    start_label: String,
    end_label: String,
    duration_label: String,
}

impl<'a> From<&'a Activity> for ActivityView<'a> {
    fn from(activity: &'a Activity) -> Self {
        Self {
            activity,
            start_label: to_12_hour(activity.start_time),
            end_label: to_12_hour(activity.effective_end_time()),
            duration_label: format_duration(activity.duration_minutes),
        }
    }
}

fn views(activities: &[Activity]) -> Vec<ActivityView<'_>> {
    activities.iter().map(ActivityView::from).collect()
}

#[derive(Deserialize, Default)]
struct RangeQuery {
    /// Range keyword: today, yesterday, thisWeek, lastWeek, thisMonth; anything else means
    /// the trailing 30 days.
    range: Option<String>,
    /// Explicit range start (YYYY-MM-DD); requires `end`.
    start: Option<String>,
    end: Option<String>,
    /// Reference "today" (YYYY-MM-DD). Defaults to the current date at `tz_offset_minutes`.
    today: Option<String>,
    /// Client local offset minutes, e.g. 480 for UTC+8.
    tz_offset_minutes: Option<i32>,
}

impl RangeQuery {
    fn today(&self) -> Result<Date, ValidationError> {
        resolve_today(self.today.as_deref(), self.tz_offset_minutes)
    }

    /// `None` when the query names no range at all.
    fn filter(&self) -> Result<Option<RangeFilter>, ValidationError> {
        match (self.start.as_deref(), self.end.as_deref()) {
            (Some(start), Some(end)) => {
                let start = parse_date(start)?;
                let end = parse_date(end)?;
                if start > end {
                    return Err(ValidationError::InvalidRange);
                }
                Ok(Some(RangeFilter::Custom(DateRange::new(start, end))))
            }
            (Some(_), None) | (None, Some(_)) => Err(ValidationError::InvalidRange),
            (None, None) => Ok(self.range.as_deref().map(RangeFilter::from_keyword)),
        }
    }

    fn resolved(&self) -> Result<Option<DateRange>, ValidationError> {
        let today = self.today()?;
        Ok(self.filter()?.map(|f| f.resolve(today)))
    }
}

#[derive(Deserialize)]
struct ActivitiesQuery {
    /// Exact date (YYYY-MM-DD). Takes precedence over any range.
    date: Option<String>,
    tag: Option<String>,
    range: Option<String>,
    start: Option<String>,
    end: Option<String>,
    today: Option<String>,
    tz_offset_minutes: Option<i32>,
}

impl ActivitiesQuery {
    fn range_query(&self) -> RangeQuery {
        RangeQuery {
            range: self.range.clone(),
            start: self.start.clone(),
            end: self.end.clone(),
            today: self.today.clone(),
            tz_offset_minutes: self.tz_offset_minutes,
        }
    }
}

async fn list_activities(
    State(state): State<AppState>,
    Query(q): Query<ActivitiesQuery>,
) -> ApiResult {
    let tag = q.tag.as_deref().map(str::trim).filter(|t| !t.is_empty());
    let exact = q
        .date
        .as_deref()
        .map(parse_date)
        .transpose()
        .map_err(ValidationError::from)?;
    let range = if exact.is_some() {
        None
    } else {
        q.range_query().resolved()?
    };

    let conn = state.conn.lock().await;
    let mut activities = match (exact, range, tag) {
        (Some(date), _, _) => {
            let fetched = store::list_activities_on(&conn, date)?;
            filter::by_exact_date(&fetched, date)
        }
        (None, Some(range), _) => {
            let fetched = store::list_activities_between(&conn, range.start_date, range.end_date)?;
            filter::by_range(&fetched, range)
        }
        (None, None, Some(tag)) => {
            let fetched = store::list_activities_tagged(&conn, tag)?;
            filter::by_tag(&fetched, tag)
        }
        (None, None, None) => store::list_activities(&conn)?,
    };
    drop(conn);

    if let Some(tag) = tag {
        activities = filter::by_tag(&activities, tag);
    }

    debug!(count = activities.len(), "listed activities");
    ok(views(&activities))
}

async fn create_activity(State(state): State<AppState>, Json(payload): Json<Value>) -> ApiResult {
    let input: ActivityInput = serde_json::from_value(payload).map_err(|_| ApiError::InvalidJson)?;
    let draft = input.validate()?;
    let created_at = now_rfc3339();

    let mut conn = state.conn.lock().await;
    let activity = store::insert_activity(&mut conn, &draft, &created_at)?;
    debug!(id = activity.id, "activity created");
    ok(ActivityView::from(&activity))
}

async fn get_activity(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult {
    let conn = state.conn.lock().await;
    let activity = store::get_activity(&conn, id)?.ok_or(ApiError::NotFound)?;
    ok(ActivityView::from(&activity))
}

async fn patch_activity(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<Value>,
) -> ApiResult {
    let patch: ActivityPatch = serde_json::from_value(payload).map_err(|_| ApiError::InvalidJson)?;

    let mut conn = state.conn.lock().await;
    let existing = store::get_activity(&conn, id)?.ok_or(ApiError::NotFound)?;
    let draft = patch.apply(&existing)?;
    let updated = store::update_activity(&mut conn, id, &draft, &now_rfc3339())?
        .ok_or(ApiError::NotFound)?;
    debug!(id, "activity updated");
    ok(ActivityView::from(&updated))
}

async fn delete_activity(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult {
    let mut conn = state.conn.lock().await;
    match store::delete_activity(&mut conn, id)? {
        0 => Err(ApiError::NotFound),
        _ => {
            debug!(id, "activity deleted");
            ok_empty()
        }
    }
}

async fn list_tags(State(state): State<AppState>) -> ApiResult {
    let conn = state.conn.lock().await;
    ok(store::list_tags(&conn)?)
}

#[derive(Deserialize)]
struct TagUpsert {
    name: String,
}

async fn create_tag(State(state): State<AppState>, Json(payload): Json<Value>) -> ApiResult {
    let req: TagUpsert = serde_json::from_value(payload).map_err(|_| ApiError::InvalidJson)?;
    let name = req.name.trim();
    if name.is_empty() {
        return Err(ValidationError::MissingTagName.into());
    }

    let conn = state.conn.lock().await;
    ok(store::upsert_tag(&conn, name, &now_rfc3339())?)
}

async fn tag_activities(State(state): State<AppState>, Path(name): Path<String>) -> ApiResult {
    let conn = state.conn.lock().await;
    let tagged = store::list_activities_tagged(&conn, &name)?;
    drop(conn);
    ok(views(&filter::by_tag(&tagged, &name)))
}

#[derive(Deserialize)]
struct SummaryQuery {
    /// Reference "today" (YYYY-MM-DD).
    date: Option<String>,
    tz_offset_minutes: Option<i32>,
}

async fn get_summary(State(state): State<AppState>, Query(q): Query<SummaryQuery>) -> ApiResult {
    let today = resolve_today(q.date.as_deref(), q.tz_offset_minutes)?;
    let week = RangeFilter::ThisWeek.resolve(today);
    // Yesterday falls outside the week on Sundays.
    let from = week.start_date.min(today - Duration::days(1));

    let target = { state.settings.lock().await.weekly_target_minutes };
    let activities = {
        let conn = state.conn.lock().await;
        store::list_activities_between(&conn, from, today)?
    };

    debug!(today = %today, count = activities.len(), "building summary");
    ok(Dashboard::build(&activities, today, target))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProjectsView {
    range: DateRange,
    total_minutes: i64,
    total_time: String,
    projects: Vec<summary::ProjectTotal>,
}

async fn get_projects(State(state): State<AppState>, Query(q): Query<RangeQuery>) -> ApiResult {
    let today = q.today()?;
    let range = q
        .filter()?
        .unwrap_or(RangeFilter::ThisWeek)
        .resolve(today);

    let activities = {
        let conn = state.conn.lock().await;
        store::list_activities_between(&conn, range.start_date, range.end_date)?
    };
    let selected = filter::by_range(&activities, range);
    let total_minutes = summary::total_minutes(&selected);

    ok(ProjectsView {
        range,
        total_minutes,
        total_time: format_duration(total_minutes),
        projects: summary::rank_projects(&selected),
    })
}

async fn get_range(Query(q): Query<RangeQuery>) -> ApiResult {
    let today = q.today()?;
    let range = q
        .filter()?
        .unwrap_or(RangeFilter::Trailing30Days)
        .resolve(today);
    ok(range)
}

async fn get_settings(State(state): State<AppState>) -> ApiResult {
    let settings = { *state.settings.lock().await };
    ok(settings)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsUpdate {
    #[serde(default)]
    weekly_target_minutes: Option<i64>,
}

async fn post_settings(State(state): State<AppState>, Json(payload): Json<Value>) -> ApiResult {
    let req: SettingsUpdate = serde_json::from_value(payload).map_err(|_| ApiError::InvalidJson)?;
    if let Some(v) = req.weekly_target_minutes {
        if v < MIN_WEEKLY_TARGET_MINUTES {
            return Err(ValidationError::InvalidWeeklyTarget.into());
        }
    }

    let mut settings = { *state.settings.lock().await };
    if let Some(v) = req.weekly_target_minutes {
        settings.weekly_target_minutes = v;
    }

    {
        let conn = state.conn.lock().await;
        store::upsert_app_settings(&conn, settings, &now_rfc3339())?;
    }
    {
        let mut guard = state.settings.lock().await;
        *guard = settings;
    }

    ok(settings)
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default()
}

fn normalize_tz_offset_minutes(v: Option<i32>) -> i32 {
    v.unwrap_or(0)
        .clamp(TZ_OFFSET_MINUTES_MIN, TZ_OFFSET_MINUTES_MAX)
}

fn tz_offset_from_minutes(minutes: i32) -> time::UtcOffset {
    time::UtcOffset::from_whole_seconds(minutes.saturating_mul(60))
        .unwrap_or(time::UtcOffset::UTC)
}

/// The caller's "today": an explicit date if given, otherwise the server clock shifted to the
/// caller's offset.
fn resolve_today(
    date: Option<&str>,
    tz_offset_minutes: Option<i32>,
) -> Result<Date, ValidationError> {
    match date.map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => Ok(parse_date(s)?),
        None => {
            let offset = tz_offset_from_minutes(normalize_tz_offset_minutes(tz_offset_minutes));
            Ok(OffsetDateTime::now_utc().to_offset(offset).date())
        }
    }
}
