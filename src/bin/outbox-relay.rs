//! Outbox relay daemon: drains a SQLite outbox into the log publisher until
//! SIGINT or SIGTERM.

use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use serde::Deserialize;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use outbox_relay::{
    LogPublisher, OutboxRelay, PoolConfig, RelayConfig, Runner, SqliteDatabase, SqliteOutboxStore,
    SqliteTopicCoordinator, WorkerPool,
};

/// Outbox relay command-line interface.
#[derive(Parser)]
#[command(name = "outbox-relay")]
#[command(about = "Relay messages from a transactional outbox table to the broker")]
#[command(version)]
struct Cli {
    /// SQLite database holding the outbox and topic lock tables
    #[arg(long, env = "OUTBOX_DATABASE")]
    database: PathBuf,

    /// JSON file with `relay` and `pool` settings
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of relay workers
    #[arg(short, long, default_value_t = 4)]
    workers: usize,

    /// Log level used when RUST_LOG is not set
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Default, Deserialize)]
struct AppConfig {
    #[serde(default)]
    relay: RelayConfig,
    #[serde(default)]
    pool: PoolConfig,
}

impl AppConfig {
    fn load(path: Option<&PathBuf>) -> Result<Self, Box<dyn Error>> {
        let Some(path) = path else {
            return Ok(AppConfig::default());
        };
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}

fn init_tracing(level: &str, format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("outbox_relay={level}").into());
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.log_format);

    let config = AppConfig::load(cli.config.as_ref())?;
    config.relay.validate()?;
    config.pool.validate()?;
    if cli.workers == 0 {
        return Err("--workers must be at least 1".into());
    }

    // A relay holds at most one connection at a time.
    let pool_size = u32::try_from(cli.workers).unwrap_or(u32::MAX).saturating_add(1);
    let db = SqliteDatabase::open_with_pool_size(&cli.database, pool_size)?;
    let pid = std::process::id();
    let mut runners: Vec<Arc<dyn Runner>> = Vec::with_capacity(cli.workers);
    for i in 0..cli.workers {
        let relay = OutboxRelay::new(
            SqliteOutboxStore::new(db.clone()),
            SqliteTopicCoordinator::new(db.clone(), config.relay.lock.clone()),
            LogPublisher::new(),
            config.relay.clone(),
        )?
        .with_worker_id(format!("relay-{pid}-{i}"));
        runners.push(Arc::new(relay));
    }

    let pool = Arc::new(WorkerPool::new(runners).with_config(config.pool));
    info!(
        database = %cli.database.display(),
        workers = cli.workers,
        "Starting outbox relay"
    );
    pool.start()?;
    supervise(pool)
}

#[cfg(unix)]
fn supervise(pool: Arc<WorkerPool>) -> Result<(), Box<dyn Error>> {
    use outbox_relay::{ShutdownConfig, ShutdownController};

    let controller = ShutdownController::new(Arc::clone(&pool), ShutdownConfig::default())?;
    controller.run()?;
    info!("Outbox relay stopped");
    Ok(())
}

#[cfg(not(unix))]
fn supervise(pool: Arc<WorkerPool>) -> Result<(), Box<dyn Error>> {
    pool.wait();
    Ok(())
}
