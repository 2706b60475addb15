use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use nav_backup_daemon::config::{self, Config};
use nav_backup_daemon::{build_router, AppState, BackupEngine, EngineSettings, Scheduler};
use nav_backup_storage::open_store;
use nav_backup_webdav::WebDavConnector;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let (cfg, args) = parse_args()?;

    let root = env::var("NAV_BACKUP_ROOT")
        .ok()
        .or_else(|| cfg.storage.root.clone())
        .unwrap_or_else(|| "./data".to_owned());

    let listen = env::var("NAV_BACKUP_LISTEN")
        .ok()
        .or_else(|| cfg.server.listen.clone())
        .unwrap_or_else(|| "127.0.0.1:8088".to_owned());

    let database_url = env::var("DATABASE_URL")
        .ok()
        .or_else(|| cfg.storage.database_url.clone());

    let settings = engine_settings(&cfg);
    let store = open_store(&PathBuf::from(&root), database_url.as_deref()).await?;
    let connector = Arc::new(WebDavConnector::new(settings.transport_timeout));
    let engine = Arc::new(BackupEngine::new(store, connector, settings));

    match args.first().map(String::as_str) {
        Some("run-once") => run_once(&engine).await,
        Some("list") => list(&engine).await,
        Some("restore") => {
            let Some(filename) = args.get(1) else {
                bail!("restore requires a backup filename");
            };
            restore(&engine, filename, args.get(2).map(String::as_str)).await
        }
        None | Some("serve") => run_service(engine, &listen).await,
        Some(other) => bail!("unknown command: {other}"),
    }
}

/// Parse CLI args, returning the loaded config and the positional arguments.
fn parse_args() -> Result<(Config, Vec<String>)> {
    let args: Vec<String> = env::args().collect();
    let mut config_path: Option<PathBuf> = None;
    let mut positional = Vec::new();
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                i += 1;
                if i >= args.len() {
                    bail!("--config requires a path argument");
                }
                config_path = Some(PathBuf::from(&args[i]));
            }
            other => positional.push(other.to_owned()),
        }
        i += 1;
    }

    let cfg = match config_path {
        Some(path) => {
            info!(?path, "loading config file");
            config::load_config(&path)?
        }
        None => Config::default(),
    };

    Ok((cfg, positional))
}

fn engine_settings(cfg: &Config) -> EngineSettings {
    let defaults = EngineSettings::default();
    let keep_days = env::var("NAV_BACKUP_KEEP_DAYS")
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .or(cfg.backup.keep_days)
        .unwrap_or(defaults.keep_days);
    let transport_timeout = env::var("NAV_BACKUP_TIMEOUT_SECS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .or(cfg.backup.transport_timeout_secs)
        .map(Duration::from_secs)
        .unwrap_or(defaults.transport_timeout);
    EngineSettings {
        keep_days,
        transport_timeout,
    }
}

async fn run_once(engine: &BackupEngine) -> Result<()> {
    let outcome = engine.perform_backup().await?;
    info!(filename = %outcome.filename, path = %outcome.path, "backup created");
    Ok(())
}

async fn list(engine: &BackupEngine) -> Result<()> {
    for file in engine.list_backups().await? {
        println!("{}\t{}\t{}", file.path, file.size, file.last_modified);
    }
    Ok(())
}

async fn restore(engine: &BackupEngine, filename: &str, path: Option<&str>) -> Result<()> {
    let outcome = engine.restore(filename, path).await?;
    info!(
        categories = outcome.categories,
        sites = outcome.sites,
        settings = outcome.settings,
        "restore complete"
    );
    Ok(())
}

async fn run_service(engine: Arc<BackupEngine>, listen: &str) -> Result<()> {
    let scheduler = Arc::new(Scheduler::new(engine.clone()));
    let schedule = scheduler.reconfigure().await?;
    info!(?schedule, "scheduler ready");

    let state = AppState {
        engine,
        scheduler: scheduler.clone(),
    };

    let addr: SocketAddr = listen
        .parse()
        .with_context(|| format!("invalid listen address: {listen}"))?;
    let app = build_router(state);

    info!(%addr, "starting backup API server");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    scheduler.shutdown().await;
    Ok(())
}
