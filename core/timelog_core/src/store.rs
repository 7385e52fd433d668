//! SQLite persistence for activities, project tags and settings.
//!
//! Reads return activities with their tags attached, in the orders the filter module uses,
//! so callers can hand the results straight to the core.

use std::path::Path;

use rusqlite::{Connection, OptionalExtension, Params, Row};
use serde::{Deserialize, Serialize};
use time::Date;
use tracing::warn;

use crate::{
    clock::{format_date, parse_date, ClockTime},
    error::ParseError,
    model::{Activity, ActivityDraft, ProjectTag},
    summary::DEFAULT_WEEKLY_TARGET_MINUTES,
};

pub const MIN_WEEKLY_TARGET_MINUTES: i64 = 60;

const ACTIVITY_COLUMNS: &str =
    "SELECT id, description, date, start_time, end_time, duration_minutes, created_at FROM activities";

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub weekly_target_minutes: i64,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            weekly_target_minutes: DEFAULT_WEEKLY_TARGET_MINUTES,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TagUsage {
    pub name: String,
    pub created_at: String,
    pub activity_count: i64,
}

pub fn open(path: &Path) -> rusqlite::Result<Connection> {
    let conn = Connection::open(path)?;
    init_db(&conn)?;
    Ok(conn)
}

pub fn open_in_memory() -> rusqlite::Result<Connection> {
    let conn = Connection::open_in_memory()?;
    init_db(&conn)?;
    Ok(conn)
}

pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;

CREATE TABLE IF NOT EXISTS activities (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  description TEXT NOT NULL,
  date TEXT NOT NULL,
  start_time TEXT NOT NULL,
  end_time TEXT,
  duration_minutes INTEGER NOT NULL,
  created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_activities_date ON activities(date, start_time);

CREATE TABLE IF NOT EXISTS project_tags (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  name TEXT NOT NULL UNIQUE,
  created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS activity_tags (
  activity_id INTEGER NOT NULL,
  tag_name TEXT NOT NULL,
  position INTEGER NOT NULL,
  PRIMARY KEY (activity_id, position)
);
CREATE INDEX IF NOT EXISTS idx_activity_tags_name ON activity_tags(tag_name);

CREATE TABLE IF NOT EXISTS app_settings (
  id INTEGER PRIMARY KEY CHECK (id = 1),
  weekly_target_minutes INTEGER NOT NULL,
  updated_at TEXT NOT NULL
);
"#,
    )
}

/// Makes sure every name in `names` exists as a project tag. Safe to run on every start;
/// returns how many tags were newly created.
pub fn seed_default_tags(
    conn: &mut Connection,
    names: &[String],
    created_at: &str,
) -> rusqlite::Result<usize> {
    let tx = conn.transaction()?;
    let mut created = 0;
    for name in names {
        let name = name.trim();
        if name.is_empty() {
            continue;
        }
        created += tx.execute(
            "INSERT INTO project_tags (name, created_at) VALUES (?1, ?2) ON CONFLICT(name) DO NOTHING",
            (name, created_at),
        )?;
    }
    tx.commit()?;
    Ok(created)
}

/// Returns the tag called `name`, creating it first if needed.
pub fn upsert_tag(conn: &Connection, name: &str, created_at: &str) -> rusqlite::Result<ProjectTag> {
    conn.execute(
        "INSERT INTO project_tags (name, created_at) VALUES (?1, ?2) ON CONFLICT(name) DO NOTHING",
        (name, created_at),
    )?;
    conn.query_row(
        "SELECT id, name, created_at FROM project_tags WHERE name = ?1",
        [name],
        |row| {
            Ok(ProjectTag {
                id: row.get(0)?,
                name: row.get(1)?,
                created_at: row.get(2)?,
            })
        },
    )
}

/// All known tags with the number of activities carrying each, by name.
pub fn list_tags(conn: &Connection) -> rusqlite::Result<Vec<TagUsage>> {
    let mut stmt = conn.prepare(
        r#"
SELECT t.name, t.created_at, COUNT(DISTINCT l.activity_id)
FROM project_tags t
LEFT JOIN activity_tags l ON l.tag_name = t.name
GROUP BY t.id
ORDER BY t.name ASC
"#,
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(TagUsage {
            name: row.get(0)?,
            created_at: row.get(1)?,
            activity_count: row.get(2)?,
        })
    })?;

    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}

pub fn insert_activity(
    conn: &mut Connection,
    draft: &ActivityDraft,
    created_at: &str,
) -> rusqlite::Result<Activity> {
    let tx = conn.transaction()?;
    tx.execute(
        "INSERT INTO activities (description, date, start_time, end_time, duration_minutes, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        (
            &draft.description,
            format_date(draft.date),
            draft.start_time.to_string(),
            draft.end_time.map(|t| t.to_string()),
            draft.duration_minutes,
            created_at,
        ),
    )?;
    let id = tx.last_insert_rowid();
    write_tags(&tx, id, &draft.project_tags, created_at)?;
    tx.commit()?;

    Ok(Activity {
        id,
        description: draft.description.clone(),
        date: draft.date,
        start_time: draft.start_time,
        end_time: draft.end_time,
        duration_minutes: draft.duration_minutes,
        project_tags: draft.project_tags.clone(),
        created_at: created_at.to_string(),
    })
}

/// Replaces the stored fields of activity `id`. `None` when it does not exist.
pub fn update_activity(
    conn: &mut Connection,
    id: i64,
    draft: &ActivityDraft,
    updated_at: &str,
) -> rusqlite::Result<Option<Activity>> {
    let tx = conn.transaction()?;
    let changed = tx.execute(
        "UPDATE activities SET description = ?1, date = ?2, start_time = ?3, end_time = ?4, duration_minutes = ?5 WHERE id = ?6",
        (
            &draft.description,
            format_date(draft.date),
            draft.start_time.to_string(),
            draft.end_time.map(|t| t.to_string()),
            draft.duration_minutes,
            id,
        ),
    )?;
    if changed == 0 {
        return Ok(None);
    }
    tx.execute("DELETE FROM activity_tags WHERE activity_id = ?1", [id])?;
    write_tags(&tx, id, &draft.project_tags, updated_at)?;
    tx.commit()?;

    get_activity(conn, id)
}

pub fn delete_activity(conn: &mut Connection, id: i64) -> rusqlite::Result<usize> {
    let tx = conn.transaction()?;
    tx.execute("DELETE FROM activity_tags WHERE activity_id = ?1", [id])?;
    let deleted = tx.execute("DELETE FROM activities WHERE id = ?1", [id])?;
    tx.commit()?;
    Ok(deleted)
}

pub fn get_activity(conn: &Connection, id: i64) -> rusqlite::Result<Option<Activity>> {
    let activity = conn
        .query_row(
            &format!("{ACTIVITY_COLUMNS} WHERE id = ?1"),
            [id],
            activity_from_row,
        )
        .optional()?;
    match activity {
        Some(mut a) => {
            attach_tags(conn, std::slice::from_mut(&mut a))?;
            Ok(Some(a))
        }
        None => Ok(None),
    }
}

/// Every activity, newest day first.
pub fn list_activities(conn: &Connection) -> rusqlite::Result<Vec<Activity>> {
    query_activities(
        conn,
        &format!("{ACTIVITY_COLUMNS} ORDER BY date DESC, start_time ASC, id ASC"),
        [],
    )
}

pub fn list_activities_on(conn: &Connection, date: Date) -> rusqlite::Result<Vec<Activity>> {
    query_activities(
        conn,
        &format!("{ACTIVITY_COLUMNS} WHERE date = ?1 ORDER BY start_time ASC, id ASC"),
        [format_date(date)],
    )
}

/// Activities dated within `[start, end]`. Dates are stored zero-padded, so text comparison
/// is chronological.
pub fn list_activities_between(
    conn: &Connection,
    start: Date,
    end: Date,
) -> rusqlite::Result<Vec<Activity>> {
    query_activities(
        conn,
        &format!(
            "{ACTIVITY_COLUMNS} WHERE date >= ?1 AND date <= ?2 ORDER BY date DESC, start_time ASC, id ASC"
        ),
        [format_date(start), format_date(end)],
    )
}

pub fn list_activities_tagged(conn: &Connection, tag: &str) -> rusqlite::Result<Vec<Activity>> {
    query_activities(
        conn,
        &format!(
            "{ACTIVITY_COLUMNS} WHERE id IN (SELECT activity_id FROM activity_tags WHERE tag_name = ?1) ORDER BY date DESC, start_time ASC, id ASC"
        ),
        [tag],
    )
}

pub fn load_or_init_settings(
    conn: &mut Connection,
    defaults: Settings,
    updated_at: &str,
) -> rusqlite::Result<Settings> {
    if let Some(settings) = load_app_settings(conn)? {
        let fixed = clamp_settings(settings);
        if fixed != settings {
            upsert_app_settings(conn, fixed, updated_at)?;
        }
        return Ok(fixed);
    }

    let fixed = clamp_settings(defaults);
    upsert_app_settings(conn, fixed, updated_at)?;
    Ok(fixed)
}

fn clamp_settings(settings: Settings) -> Settings {
    if settings.weekly_target_minutes < MIN_WEEKLY_TARGET_MINUTES {
        warn!(
            "weekly target of {} minutes is below the minimum, using {}",
            settings.weekly_target_minutes, MIN_WEEKLY_TARGET_MINUTES
        );
        return Settings {
            weekly_target_minutes: MIN_WEEKLY_TARGET_MINUTES,
        };
    }
    settings
}

pub fn load_app_settings(conn: &Connection) -> rusqlite::Result<Option<Settings>> {
    conn.query_row(
        "SELECT weekly_target_minutes FROM app_settings WHERE id = 1",
        [],
        |row| {
            Ok(Settings {
                weekly_target_minutes: row.get(0)?,
            })
        },
    )
    .optional()
}

pub fn upsert_app_settings(
    conn: &Connection,
    settings: Settings,
    updated_at: &str,
) -> rusqlite::Result<()> {
    conn.execute(
        r#"
INSERT INTO app_settings (id, weekly_target_minutes, updated_at)
VALUES (1, ?1, ?2)
ON CONFLICT(id) DO UPDATE SET
  weekly_target_minutes=excluded.weekly_target_minutes,
  updated_at=excluded.updated_at
        "#,
        (settings.weekly_target_minutes, updated_at),
    )?;
    Ok(())
}

fn write_tags(
    conn: &Connection,
    activity_id: i64,
    tags: &[String],
    created_at: &str,
) -> rusqlite::Result<()> {
    let mut stmt = conn.prepare(
        "INSERT INTO activity_tags (activity_id, tag_name, position) VALUES (?1, ?2, ?3)",
    )?;
    for (position, tag) in tags.iter().enumerate() {
        upsert_tag(conn, tag, created_at)?;
        stmt.execute((activity_id, tag, position as i64))?;
    }
    Ok(())
}

fn query_activities<P: Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> rusqlite::Result<Vec<Activity>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, activity_from_row)?;

    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    attach_tags(conn, &mut out)?;
    Ok(out)
}

fn attach_tags(conn: &Connection, activities: &mut [Activity]) -> rusqlite::Result<()> {
    let mut stmt = conn.prepare(
        "SELECT tag_name FROM activity_tags WHERE activity_id = ?1 ORDER BY position ASC",
    )?;
    for a in activities.iter_mut() {
        let rows = stmt.query_map([a.id], |row| row.get::<_, String>(0))?;
        let mut tags = Vec::new();
        for r in rows {
            tags.push(r?);
        }
        a.project_tags = tags;
    }
    Ok(())
}

fn activity_from_row(row: &Row<'_>) -> rusqlite::Result<Activity> {
    let date_s: String = row.get(2)?;
    let date = parse_date(&date_s).map_err(|e| conversion_error(2, e))?;
    let start_s: String = row.get(3)?;
    let start_time: ClockTime = start_s.parse().map_err(|e| conversion_error(3, e))?;
    let end_s: Option<String> = row.get(4)?;
    let end_time = end_s
        .map(|s| s.parse::<ClockTime>())
        .transpose()
        .map_err(|e| conversion_error(4, e))?;

    Ok(Activity {
        id: row.get(0)?,
        description: row.get(1)?,
        date,
        start_time,
        end_time,
        duration_minutes: row.get(5)?,
        project_tags: Vec::new(),
        created_at: row.get(6)?,
    })
}

fn conversion_error(column: usize, err: ParseError) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(err))
}
