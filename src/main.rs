use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use wayback_snapshot_archiver::archiver::{
    tool, ArchiveTool, Pipeline, ReconcileOptions, Reconciler, Scheduler,
};
use wayback_snapshot_archiver::config::Config;
use wayback_snapshot_archiver::db::Database;
use wayback_snapshot_archiver::ledger::{load_worklist, FailureLog, ProgressLedger};
use wayback_snapshot_archiver::wayback::{write_worklist, CdxClient, CdxQuery};

/// Archive Wayback Machine captures listed in a worklist into a capture store.
#[derive(Debug, Parser)]
#[command(name = "wayback-snapshot-archiver", version, about)]
struct Args {
    /// File with one capture URL per line.
    worklist: PathBuf,

    /// Discover captures of DOMAIN via the CDX API and write them to WORKLIST first.
    #[arg(long, value_name = "DOMAIN")]
    discover: Option<String>,

    /// Number of concurrent archive tasks (overrides WORKER_CONCURRENCY).
    #[arg(long)]
    workers: Option<usize>,

    /// URLs per tool invocation (overrides BATCH_SIZE).
    #[arg(long)]
    batch_size: Option<usize>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if let Err(e) = run(args).await {
        error!("Fatal error: {e:#}");
        std::process::exit(1);
    }
}

#[allow(clippy::too_many_lines)]
async fn run(args: Args) -> Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    init_tracing()?;

    info!("Starting wayback-snapshot-archiver");

    let mut config = Config::from_env().context("Failed to load configuration")?;
    if let Some(workers) = args.workers {
        config.worker_concurrency = workers;
    }
    if let Some(batch_size) = args.batch_size {
        config.batch_size = batch_size;
    }
    config.validate().context("Invalid configuration")?;

    info!(
        archive_root = %config.archive_root.display(),
        collection = %config.collection_name,
        workers = config.worker_concurrency,
        batch_size = config.batch_size,
        "Configuration loaded"
    );

    if let Some(domain) = args.discover.as_deref() {
        let client = CdxClient::new(config.cdx_api_url.clone())?;
        let query = CdxQuery {
            from: config.cdx_from.clone(),
            to: config.cdx_to.clone(),
        };
        let urls = client
            .snapshots(domain, &query)
            .await
            .with_context(|| format!("CDX discovery failed for {domain}"))?;
        write_worklist(&args.worklist, &urls).await?;
        info!(
            domain = %domain,
            captures = urls.len(),
            path = %args.worklist.display(),
            "Worklist written"
        );
    }

    let worklist = load_worklist(&args.worklist).await?;
    if worklist.is_empty() {
        warn!(path = %args.worklist.display(), "Worklist is empty, nothing to do");
        return Ok(());
    }

    tokio::fs::create_dir_all(&config.archive_root)
        .await
        .with_context(|| {
            format!(
                "Failed to create archive root: {}",
                config.archive_root.display()
            )
        })?;

    let ledger = Arc::new(ProgressLedger::new(config.success_ledger_path()));
    let failures = Arc::new(FailureLog::new(config.error_log_path()));

    let pending = ledger.pending(&worklist).await?;
    if pending.is_empty() {
        info!(
            urls = worklist.len(),
            ledger = %ledger.path().display(),
            "All worklist URLs are already archived"
        );
        return Ok(());
    }
    info!(
        total = worklist.len(),
        pending = pending.len(),
        done = worklist.len() - pending.len(),
        "Worklist loaded"
    );

    match tool::check_tool(&config.archive_tool_path).await {
        Ok(version) => info!(tool = %config.archive_tool_path, version = %version, "Archive tool found"),
        Err(e) => warn!(
            tool = %config.archive_tool_path,
            "Archive tool check failed, invocations will likely fail: {e:#}"
        ),
    }

    if config.enable_tool_wal {
        if let Err(e) = tool::enable_wal_mode(&config.archive_root).await {
            warn!("Could not enable WAL on the tool index: {e:#}");
        }
    }

    if let Some(parent) = config
        .database_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
    {
        tokio::fs::create_dir_all(parent).await.with_context(|| {
            format!("Failed to create database directory: {}", parent.display())
        })?;
    }

    let db = Database::new(&config.database_path, &config.collection_name)
        .await
        .context("Failed to initialize capture database")?;

    info!(
        path = %config.database_path.display(),
        collection = %db.collection(),
        "Capture database initialized"
    );

    let reconciler = Reconciler::new(
        Arc::new(db.clone()),
        Arc::clone(&ledger),
        ReconcileOptions {
            device_profile: config.device_profile.clone(),
            validation: config.url_validation(),
            verify_integrity: config.verify_integrity,
        },
    );
    let invoker = Arc::new(ArchiveTool::new(config.tool_config()));
    let pipeline = Arc::new(Pipeline::new(
        invoker,
        reconciler,
        config.retry_policy(),
        failures,
    ));
    let scheduler = Scheduler::new(
        pipeline,
        config.worker_concurrency,
        config.batch_size,
        config.max_store_failures,
    );

    let shutdown = scheduler.shutdown_token();
    let signal_handle = tokio::spawn(async move {
        shutdown_signal().await;
        warn!("Shutdown requested; finishing running tasks and skipping the rest");
        shutdown.cancel();
    });

    let summary = scheduler.run(&pending).await;
    signal_handle.abort();

    db.close().await;

    if summary.failed > 0 {
        warn!(
            failed = summary.failed,
            error_log = %config.error_log_path().display(),
            "Some URLs failed; see the error log"
        );
    }

    info!("Shutdown complete");

    Ok(())
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,wayback_snapshot_archiver=debug"));

    // Check if JSON logging is requested
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| matches!(v.to_lowercase().as_str(), "json" | "structured"))
        .unwrap_or(false);

    if use_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
