//! # warden
//!
//! Lists a bucket once, skips every object the ledger says is unchanged since
//! its last scan, and runs the rest through the scanner chain and into the
//! configured reporter.
//!
//! Exits non-zero only when startup fails (configuration, ledger, scanner
//! chain, reporter or listing). Per-object failures are logged and counted
//! in the closing summary; they never change the exit code.

use clap::Parser;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use warden_config::{Config, StorageKind};
use warden_ledger::{Database, Ledger};
use warden_pool::{Pool, PoolOptions};
use warden_scanner::Engine;
use warden_storage::{BackendHandle, StorageBackend};
use warden_storage::backend::{LocalBackend, S3Backend};

/// Incremental object-storage threat scanner.
#[derive(Parser, Debug)]
#[command(name = "warden", version)]
struct Cli {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(short, long, env = "WARDEN_CONFIG")]
    config: Option<PathBuf>,

    /// Number of concurrent workers (overrides config)
    #[arg(short, long)]
    workers: Option<usize>,

    /// Only scan objects whose key starts with this prefix (overrides config)
    #[arg(short, long)]
    prefix: Option<String>,

    /// Leave the ledger untouched for objects whose report could not be delivered
    #[arg(long)]
    require_delivery: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let (dotenv, cli) = parse_cli(dotenvy::dotenv, std::env::args_os());

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        // Stdout belongs to the JSON reporter.
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Ok(path) = dotenv {
        info!(path = %path.display(), "Loaded environment file");
    }

    let mut config = match warden_config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            error!(error = ?err, "Invalid configuration");
            return ExitCode::FAILURE;
        },
    };
    if let Some(workers) = cli.workers {
        config.scan.workers = workers;
    }
    if let Some(prefix) = cli.prefix {
        config.storage.prefix = Some(prefix);
    }
    config.scan.require_delivery |= cli.require_delivery;
    if let Err(err) = config.validate() {
        error!(error = ?err, "Invalid configuration");
        return ExitCode::FAILURE;
    }

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(Fatal(stage)) => {
            error!(stage, "Startup failed; no objects were scanned");
            ExitCode::FAILURE
        },
    }
}

/// Load the environment file, then parse `args` with it in place so the file
/// can supply `WARDEN_CONFIG`.
fn parse_cli<I>(dotenv: impl FnOnce() -> dotenvy::Result<PathBuf>, args: I) -> (dotenvy::Result<PathBuf>, Cli)
where
    I: IntoIterator,
    I::Item: Into<OsString> + Clone,
{
    let loaded = dotenv();
    (loaded, Cli::parse_from(args))
}

/// A startup failure; the details have already been logged.
struct Fatal(&'static str);

/// Log a startup error and turn it into [`Fatal`].
fn fatal<E: std::fmt::Debug>(stage: &'static str) -> impl FnOnce(E) -> Fatal {
    move |err| {
        error!(stage, error = ?err, "Startup step failed");
        Fatal(stage)
    }
}

async fn run(config: Config) -> Result<(), Fatal> {
    let db = Database::connect(&config.ledger.path).await.map_err(fatal("ledger"))?;
    let backend = backend(&config).map_err(fatal("storage"))?;
    let engine = Engine::from_options(&config.scanners).await.map_err(fatal("scanners"))?;
    let reporter = warden_report::build(&config.reporter).map_err(fatal("reporter"))?;
    let staging_dir = config.scan.staging_dir();
    std::fs::create_dir_all(&staging_dir).map_err(fatal("staging"))?;

    let objects = backend.list(config.storage.prefix.as_deref()).await.map_err(fatal("listing"))?;
    info!(backend = backend.name(), bucket = backend.bucket(), objects = objects.len(), "Listed bucket");

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            let signal = shutdown_signal().await;
            warn!(signal, "Interrupted; finishing in-flight objects");
            cancel.cancel();
        }
    });

    let options = PoolOptions {
        workers: config.scan.workers,
        staging_dir,
        require_delivery: config.scan.require_delivery,
    };
    let pool = Pool::new(backend, Ledger::from(&db), Arc::new(engine), reporter, options);
    let summary = pool.run(objects, cancel).await;
    info!(
        listed = summary.listed,
        duplicates = summary.duplicates,
        skipped = summary.skipped,
        scanned = summary.scanned,
        download_failures = summary.download_failures,
        delivery_failures = summary.delivery_failures,
        ledger_failures = summary.ledger_failures,
        withheld = summary.withheld,
        unprocessed = summary.unprocessed,
        "Scan pass finished"
    );
    db.close().await;
    Ok(())
}

/// Wait for Ctrl-C or, on Unix, SIGTERM, and name the one that arrived.
async fn shutdown_signal() -> &'static str {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "Cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            },
            Err(err) => {
                warn!(error = %err, "Cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            },
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => "SIGINT",
        () = terminate => "SIGTERM",
    }
}

fn backend(config: &Config) -> warden_storage::error::Result<BackendHandle> {
    let storage = &config.storage;
    let backend: BackendHandle = match storage.kind {
        StorageKind::S3 => Arc::new(S3Backend::new(
            "s3",
            &storage.bucket,
            &storage.region,
            storage.endpoint.as_deref(),
            storage.key_id.as_deref().unwrap_or_default(),
            storage.key_secret.as_deref().unwrap_or_default(),
        )),
        StorageKind::Local => {
            let root = storage.path.as_deref().map(std::path::absolute).transpose().map_err(
                warden_storage::error::ErrorKind::Io,
            )?;
            let name = match storage.bucket.trim() {
                "" => "local",
                bucket => bucket,
            };
            Arc::new(LocalBackend::new(name, root.unwrap_or_default())?)
        },
    };
    Ok(backend)
}
