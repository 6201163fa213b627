use academyd::{
    certificates, config::ConfigWatcher, config::HotConfig, config::ServiceConfig,
    rest, retention, AppContext,
};

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(
    name = "academyd",
    about = "Academy Core — course-platform data-lifecycle and certificate service",
    version
)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// REST API port
    #[arg(long, env = "ACADEMYD_PORT")]
    port: Option<u16>,

    /// Data directory for config, SQLite database, and blob storage
    #[arg(long, env = "ACADEMYD_DATA_DIR")]
    data_dir: Option<std::path::PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "ACADEMYD_LOG")]
    log: Option<String>,

    /// Bind address for the REST server (default: 127.0.0.1; use 0.0.0.0 for LAN access)
    #[arg(long, env = "ACADEMYD_BIND")]
    bind_address: Option<String>,

    /// Write logs to this file path (rotated daily). Optional.
    #[arg(long, env = "ACADEMYD_LOG_FILE")]
    log_file: Option<std::path::PathBuf>,

    /// Include raw error detail in API error responses. Never use in production.
    #[arg(long, env = "ACADEMYD_DEV")]
    dev: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Start the service in the foreground (default when no subcommand given).
    ///
    /// Examples:
    ///   academyd serve
    ///   academyd
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // ── Logging setup ────────────────────────────────────────────────────────
    // Init once — must happen before any tracing calls.
    let log_level = args.log.as_deref().unwrap_or("info").to_owned();
    let log_format =
        std::env::var("ACADEMYD_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());
    let _file_guard = setup_logging(&log_level, args.log_file.as_deref(), &log_format);

    match args.command {
        None | Some(Command::Serve) => {
            run_server(args.port, args.data_dir, args.log, args.bind_address, args.dev).await?;
        }
    }

    Ok(())
}

async fn run_server(
    port: Option<u16>,
    data_dir: Option<std::path::PathBuf>,
    log: Option<String>,
    bind_address: Option<String>,
    dev: bool,
) -> Result<()> {
    let config = Arc::new(ServiceConfig::new(port, data_dir, log, bind_address, dev));
    std::fs::create_dir_all(&config.data_dir)?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        data_dir = %config.data_dir.display(),
        "academyd starting"
    );

    let storage = Arc::new(
        academyd::store::Storage::new_with_slow_query(
            &config.data_dir,
            config.observability.slow_query_threshold_ms,
        )
        .await?,
    );
    let blobs = Arc::new(academyd::blobs::BlobStore::new(&config.data_dir).await?);
    let engine = Arc::new(retention::RetentionEngine::new(storage.clone(), blobs.clone()));

    let (cert_tx, cert_rx) = tokio::sync::mpsc::unbounded_channel();
    let hot = Arc::new(tokio::sync::RwLock::new(HotConfig {
        retention: config.retention.clone(),
    }));

    let ctx = Arc::new(AppContext {
        config: config.clone(),
        storage,
        blobs,
        retention: engine,
        cert_queue: cert_tx,
        hot: hot.clone(),
        started_at: std::time::Instant::now(),
    });

    // Hold the watcher for the process lifetime; dropping it stops hot-reload.
    let _config_watcher = ConfigWatcher::start(&config.data_dir, hot);

    certificates::worker::spawn(ctx.clone(), cert_rx);
    tokio::spawn(retention::cleanup::run_retention_job(ctx.clone()));

    rest::start_rest_server(ctx).await
}

/// Initialize the tracing subscriber.
/// If `log_file` is set, logs go to both stdout and a daily-rolling file.
/// Returns a `WorkerGuard` that must stay alive for the process lifetime.
///
/// `log_format` may be `"pretty"` (default, human-readable compact format) or
/// `"json"` (structured JSON for log aggregators).
///
/// If the log directory cannot be created, falls back to stdout-only logging
/// with a warning — never panics.
fn setup_logging(
    log_level: &str,
    log_file: Option<&std::path::Path>,
    log_format: &str,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let use_json = log_format == "json";

    if let Some(path) = log_file {
        let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
        let filename = path
            .file_name()
            .unwrap_or_else(|| std::ffi::OsStr::new("academyd.log"));

        // Ensure the directory exists before tracing-appender tries to open it.
        if let Err(e) = std::fs::create_dir_all(dir) {
            eprintln!(
                "warn: could not create log directory '{}': {e} — falling back to stdout",
                dir.display()
            );
            if use_json {
                tracing_subscriber::fmt().json().with_env_filter(log_level).init();
            } else {
                tracing_subscriber::fmt().with_env_filter(log_level).compact().init();
            }
            return None;
        }

        let appender = tracing_appender::rolling::daily(dir, filename);
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);

        if use_json {
            tracing_subscriber::registry()
                .with(EnvFilter::new(log_level))
                .with(fmt::layer().json())
                .with(fmt::layer().json().with_writer(non_blocking))
                .init();
        } else {
            tracing_subscriber::registry()
                .with(EnvFilter::new(log_level))
                .with(fmt::layer().compact())
                .with(fmt::layer().with_writer(non_blocking))
                .init();
        }

        Some(guard)
    } else if use_json {
        tracing_subscriber::fmt().json().with_env_filter(log_level).init();
        None
    } else {
        tracing_subscriber::fmt().with_env_filter(log_level).compact().init();
        None
    }
}
