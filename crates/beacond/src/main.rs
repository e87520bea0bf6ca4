//! beacond: the Beacon daemon.
//!
//! Single binary that assembles the Beacon subsystems:
//! - State store (redb)
//! - Sweep scheduler (probe, reconcile, notify)
//! - Status page and on-demand check endpoint
//!
//! # Usage
//!
//! ```text
//! beacond --config beacon.toml standalone --port 8080 --data-dir /var/lib/beacon
//! beacond --config beacon.toml check --url http://127.0.0.1:8080
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use beacon_health::SweepScheduler;
use beacond::config::BeaconConfig;
use beacond::daemon::{CheckRun, build_monitor, local_daemon_url, open_store, run_check, sync_services};

const DEFAULT_LOG_FILTER: &str = "info,beacond=debug,beacon=debug";

#[derive(Parser)]
#[command(name = "beacond", about = "Beacon uptime monitor and status page")]
struct Cli {
    /// Path to the configuration file. Defaults to ./beacon.toml if present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    /// Telegram bot token; overrides the config file.
    #[arg(long, global = true, env = "BEACON_TELEGRAM_TOKEN", hide_env_values = true)]
    telegram_token: Option<String>,

    /// Telegram chat id; overrides the config file.
    #[arg(long, global = true, env = "BEACON_TELEGRAM_CHAT_ID")]
    telegram_chat_id: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the status page and check services on a timer.
    Standalone {
        /// Port to listen on.
        #[arg(long)]
        port: Option<u16>,

        /// Data directory for persistent state.
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Seconds between sweeps.
        #[arg(long)]
        interval: Option<u64>,
    },
    /// Run a single sweep, print the results and exit.
    ///
    /// A running daemon is asked to sweep; otherwise the store is opened
    /// directly.
    Check {
        /// Base URL of a running daemon. Defaults to the configured port on
        /// localhost.
        #[arg(long, env = "BEACON_URL")]
        url: Option<String>,

        /// Data directory for persistent state.
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let mut config = BeaconConfig::load(cli.config.as_deref())?;
    config.override_telegram(cli.telegram_token, cli.telegram_chat_id);

    match cli.command {
        Command::Standalone {
            port,
            data_dir,
            interval,
        } => {
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(data_dir) = data_dir {
                config.server.data_dir = data_dir;
            }
            if let Some(interval) = interval {
                config.check.interval_secs = interval;
            }
            config.validate()?;
            run_standalone(config).await
        }
        Command::Check { url, data_dir } => {
            if let Some(data_dir) = data_dir {
                config.server.data_dir = data_dir;
            }
            config.validate()?;
            let url = url.unwrap_or_else(|| local_daemon_url(&config));
            run_check_command(config, &url).await
        }
    }
}

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run_standalone(config: BeaconConfig) -> anyhow::Result<()> {
    info!("Beacon daemon starting in standalone mode");

    // ── Initialize subsystems ──────────────────────────────────

    let store = open_store(&config.server.data_dir)?;
    sync_services(&store, &config.services)?;

    let monitor = build_monitor(store, &config)?;

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Start background tasks ─────────────────────────────────

    let scheduler = SweepScheduler::new(monitor.clone(), config.check.interval());
    let scheduler_handle = tokio::spawn(scheduler.run(shutdown_rx));

    // ── Start HTTP server ──────────────────────────────────────

    let router = beacond::build_router(monitor);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));

    info!(%addr, "HTTP server starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Graceful shutdown on Ctrl-C.
    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install CTRL+C handler");
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    server.await?;

    // Let in-flight sweeps finish, within reason.
    let drain = config.check.settings().retry.budget() + Duration::from_secs(5);
    if tokio::time::timeout(drain, scheduler_handle).await.is_err() {
        warn!(?drain, "sweep scheduler did not stop in time");
    }

    info!("Beacon daemon stopped");
    Ok(())
}

async fn run_check_command(config: BeaconConfig, daemon_url: &str) -> anyhow::Result<()> {
    let report = match run_check(&config, daemon_url).await? {
        CheckRun::Remote(url) => {
            println!("sweep completed by running daemon at {url}");
            return Ok(());
        }
        CheckRun::Local(report) => report,
    };

    for check in &report.checked {
        let latency = check
            .service
            .response_time_ms
            .map(|ms| format!("{ms}ms"))
            .unwrap_or_else(|| "-".to_string());
        let change = match check.transition {
            Some(t) if t.is_baseline() => " (first check)".to_string(),
            Some(t) => format!(" (was {})", t.from.label()),
            None => String::new(),
        };
        println!(
            "{:<24} {:<8} {:>8}{}",
            check.service.name,
            check.service.status().label(),
            latency,
            change
        );
    }
    for failure in &report.failures {
        println!("{:<24} ERROR    {}", failure.name, failure.error);
    }

    if !report.is_complete() {
        anyhow::bail!("{} service check(s) failed", report.failures.len());
    }
    Ok(())
}
