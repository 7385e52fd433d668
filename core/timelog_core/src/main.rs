use clap::Parser;
use std::{
    net::{IpAddr, SocketAddr},
    path::PathBuf,
};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use timelog_core::{
    router,
    store::{self, Settings},
    summary::DEFAULT_WEEKLY_TARGET_MINUTES,
    AppState,
};
use tracing::info;

const DEFAULT_PORT: u16 = 17610;

#[derive(Parser, Debug)]
#[command(name = "timelog_core", version)]
struct Args {
    /// Listen address.
    ///
    /// Accepts:
    /// - ip:port (recommended), e.g. 127.0.0.1:17610
    /// - ip (implies port 17610), e.g. 127.0.0.1
    /// - localhost or localhost:port
    #[arg(long, default_value = "127.0.0.1:17610")]
    listen: String,

    /// SQLite database path.
    #[arg(long, default_value = "./data/timelog.db")]
    db: PathBuf,

    /// Weekly target used for progress, in minutes. Only applied when the database has no
    /// stored setting yet.
    #[arg(long, default_value_t = DEFAULT_WEEKLY_TARGET_MINUTES)]
    weekly_target_minutes: i64,

    /// Project tag guaranteed to exist after startup. Repeat for several.
    #[arg(long = "default-tag", default_values = ["Work", "Personal", "Learning"])]
    default_tags: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "timelog_core=info,tower_http=info".into()),
        )
        .init();

    let args = Args::parse();

    if let Some(parent) = args.db.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let now = OffsetDateTime::now_utc().format(&Rfc3339)?;
    let mut conn = store::open(&args.db)?;
    let seeded = store::seed_default_tags(&mut conn, &args.default_tags, &now)?;
    info!("default tags ensured ({seeded} created)");
    let settings = store::load_or_init_settings(
        &mut conn,
        Settings {
            weekly_target_minutes: args.weekly_target_minutes,
        },
        &now,
    )?;

    let app = router(AppState::new(conn, settings));

    let addr = parse_listen(&args.listen)?;
    info!("Core listening on http://{addr}");
    info!("DB: {}", args.db.display());
    info!("Weekly target: {} minutes", settings.weekly_target_minutes);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

fn parse_listen(input: &str) -> anyhow::Result<SocketAddr> {
    if let Ok(addr) = input.parse::<SocketAddr>() {
        return Ok(addr);
    }

    if let Ok(ip) = input.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, DEFAULT_PORT));
    }

    if input == "localhost" {
        return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), DEFAULT_PORT));
    }

    if let Some(("localhost", port_str)) = input.rsplit_once(':') {
        let port: u16 = port_str.parse().map_err(|_| {
            anyhow::anyhow!(
                "invalid --listen '{}': bad port. Example: 127.0.0.1:{}",
                input,
                DEFAULT_PORT
            )
        })?;
        return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), port));
    }

    Err(anyhow::anyhow!(
        "invalid --listen '{}'. Use ip:port (e.g. 127.0.0.1:{}) or ip (e.g. 127.0.0.1).",
        input,
        DEFAULT_PORT
    ))
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown requested");
}
