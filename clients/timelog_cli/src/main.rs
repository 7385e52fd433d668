use anyhow::{anyhow, Context};
use chrono::Local;
use clap::{Parser, Subcommand};
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

#[derive(Parser, Debug)]
#[command(name = "timelog", version)]
struct Args {
    /// Core base URL, e.g. http://127.0.0.1:17610
    #[arg(long, default_value = "http://127.0.0.1:17610")]
    core_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Log an activity. Give either --end (start/stop) or --minutes (duration).
    Log {
        description: String,
        /// Comma-separated project tags, e.g. "Work,Client A".
        #[arg(long)]
        tags: String,
        /// YYYY-MM-DD, defaults to today.
        #[arg(long)]
        date: Option<String>,
        /// HH:MM, defaults to the current local time.
        #[arg(long)]
        start: Option<String>,
        #[arg(long, conflicts_with = "minutes")]
        end: Option<String>,
        #[arg(long)]
        minutes: Option<i64>,
    },
    /// List activities for a range keyword (today, yesterday, thisWeek, lastWeek, thisMonth).
    List {
        #[arg(long, default_value = "today")]
        range: String,
        #[arg(long)]
        tag: Option<String>,
    },
    /// Show today/week totals and the top project.
    Summary,
    /// List project tags.
    Tags,
    /// Remove an activity by id.
    Delete { id: i64 },
}

#[derive(Deserialize)]
struct Envelope<T> {
    ok: bool,
    data: Option<T>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NewActivity<'a> {
    description: &'a str,
    date: String,
    start_time: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    end_time: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration_minutes: Option<i64>,
    project_tags: Vec<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActivityRow {
    id: i64,
    description: String,
    date: String,
    start_label: String,
    end_label: String,
    duration_label: String,
    project_tags: Vec<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Summary {
    today: TodayTotals,
    week: WeekTotals,
    top_project: TopProject,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TodayTotals {
    total_time: String,
    compared_to_yesterday: i64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WeekTotals {
    total_time: String,
    target: String,
    progress: i64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TopProject {
    name: String,
    minutes: i64,
    percentage: i64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TagRow {
    name: String,
    activity_count: i64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "timelog_cli=warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let client = Client::new();
    let base = args.core_url.trim_end_matches('/').to_string();
    let tz_offset_minutes = Local::now().offset().local_minus_utc() / 60;

    match args.command {
        Command::Log {
            description,
            tags,
            date,
            start,
            end,
            minutes,
        } => {
            let now = Local::now();
            let body = NewActivity {
                description: &description,
                date: date.unwrap_or_else(|| now.format("%Y-%m-%d").to_string()),
                start_time: start.unwrap_or_else(|| now.format("%H:%M").to_string()),
                end_time: end.as_deref(),
                duration_minutes: minutes,
                project_tags: split_tags(&tags),
            };
            let res = client
                .post(format!("{base}/activities"))
                .json(&body)
                .send()
                .await
                .context("core unreachable")?;
            let a: ActivityRow = unwrap_envelope(res.json().await?)?;
            println!("logged #{}", a.id);
            print_activity(&a);
        }
        Command::List { range, tag } => {
            let mut query = vec![
                ("range", range),
                ("tz_offset_minutes", tz_offset_minutes.to_string()),
            ];
            if let Some(tag) = tag {
                query.push(("tag", tag));
            }
            let res = client
                .get(format!("{base}/activities"))
                .query(&query)
                .send()
                .await
                .context("core unreachable")?;
            let rows: Vec<ActivityRow> = unwrap_envelope(res.json().await?)?;
            if rows.is_empty() {
                println!("nothing logged");
            }
            for a in &rows {
                print_activity(a);
            }
        }
        Command::Summary => {
            let res = client
                .get(format!("{base}/summary"))
                .query(&[("tz_offset_minutes", tz_offset_minutes)])
                .send()
                .await
                .context("core unreachable")?;
            let s: Summary = unwrap_envelope(res.json().await?)?;
            println!(
                "Today: {} ({} vs yesterday)",
                s.today.total_time,
                signed_percent(s.today.compared_to_yesterday)
            );
            println!(
                "Week:  {} of {} ({}%)",
                s.week.total_time, s.week.target, s.week.progress
            );
            println!(
                "Top:   {} ({}m, {}%)",
                s.top_project.name, s.top_project.minutes, s.top_project.percentage
            );
        }
        Command::Tags => {
            let res = client
                .get(format!("{base}/tags"))
                .send()
                .await
                .context("core unreachable")?;
            let tags: Vec<TagRow> = unwrap_envelope(res.json().await?)?;
            for t in tags {
                println!("{:<24} {}", t.name, t.activity_count);
            }
        }
        Command::Delete { id } => {
            let res = client
                .delete(format!("{base}/activities/{id}"))
                .send()
                .await
                .context("core unreachable")?;
            let _: Option<Value> = unwrap_envelope_opt(res.json().await?)?;
            println!("deleted #{id}");
        }
    }
    Ok(())
}

fn split_tags(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn signed_percent(v: i64) -> String {
    if v > 0 {
        format!("+{v}%")
    } else {
        format!("{v}%")
    }
}

fn print_activity(a: &ActivityRow) {
    println!(
        "{:>5}  {}  {}-{}  {:>7}  {}  [{}]",
        a.id,
        a.date,
        a.start_label,
        a.end_label,
        a.duration_label,
        a.description,
        a.project_tags.join(", ")
    );
}

fn unwrap_envelope<T: DeserializeOwned>(v: Value) -> anyhow::Result<T> {
    unwrap_envelope_opt(v)?.ok_or_else(|| anyhow!("core returned no data"))
}

fn unwrap_envelope_opt<T: DeserializeOwned>(v: Value) -> anyhow::Result<Option<T>> {
    debug!("core response: {v}");
    let env: Envelope<T> = serde_json::from_value(v)?;
    if !env.ok {
        return Err(anyhow!(
            "core rejected request: {}",
            env.error.unwrap_or_else(|| "unknown_error".to_string())
        ));
    }
    Ok(env.data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn split_tags_trims_and_drops_empties() {
        assert_eq!(split_tags("Work, Client A,,  "), vec!["Work", "Client A"]);
        assert!(split_tags("").is_empty());
    }

    #[test]
    fn signed_percent_marks_growth() {
        assert_eq!(signed_percent(25), "+25%");
        assert_eq!(signed_percent(0), "0%");
        assert_eq!(signed_percent(-10), "-10%");
    }

    #[test]
    fn envelope_errors_surface_the_code() {
        let err = unwrap_envelope::<Value>(json!({ "ok": false, "error": "invalid_time" }))
            .unwrap_err();
        assert!(err.to_string().contains("invalid_time"));

        let tags: Vec<TagRow> = unwrap_envelope(json!({
            "ok": true,
            "data": [{ "name": "Work", "createdAt": "x", "activityCount": 3 }]
        }))
        .unwrap();
        assert_eq!(tags[0].name, "Work");
        assert_eq!(tags[0].activity_count, 3);

        let none: Option<Value> = unwrap_envelope_opt(json!({ "ok": true })).unwrap();
        assert!(none.is_none());
    }

    #[test]
    fn new_activity_omits_unused_mode_fields() {
        let body = NewActivity {
            description: "Read",
            date: "2024-01-03".into(),
            start_time: "09:00".into(),
            end_time: None,
            duration_minutes: Some(30),
            project_tags: vec!["Learning".into()],
        };
        let v = serde_json::to_value(&body).unwrap();
        assert_eq!(v["durationMinutes"], 30);
        assert!(v.get("endTime").is_none());
        assert_eq!(v["projectTags"][0], "Learning");
    }
}
