//! Wiring shared by the `standalone` and `check` commands.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use tracing::{debug, info};

use beacon_health::{Monitor, Notifier, SweepReport, probe_client};
use beacon_state::StateStore;

use crate::config::{BeaconConfig, ServiceConfig};

pub const DB_FILE: &str = "beacon.redb";

/// Slack on top of the worst-case sweep time when waiting on a daemon.
const REMOTE_CHECK_SLACK: Duration = Duration::from_secs(5);

/// Open (creating if needed) the store under `data_dir`.
pub fn open_store(data_dir: &Path) -> anyhow::Result<StateStore> {
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("failed to create data dir {}", data_dir.display()))?;
    let db_path = data_dir.join(DB_FILE);
    let store = StateStore::open(&db_path)
        .with_context(|| format!("failed to open state store {}", db_path.display()))?;
    info!(path = ?db_path, "state store opened");
    Ok(store)
}

/// Register every configured service. Existing services keep their state;
/// a changed url is updated in place.
pub fn sync_services(store: &StateStore, services: &[ServiceConfig]) -> anyhow::Result<()> {
    let now = beacon_state::time::now();
    for svc in services {
        let registered = store
            .register_service(svc.name.trim(), &svc.url, now)
            .with_context(|| format!("failed to register service {:?}", svc.name))?;
        debug!(service_id = registered.id, name = %registered.name, url = %registered.url, "service registered");
    }
    info!(count = services.len(), "configured services registered");
    Ok(())
}

/// Build the sweep driver from configuration.
pub fn build_monitor(store: StateStore, config: &BeaconConfig) -> anyhow::Result<Monitor> {
    let client = probe_client().context("failed to build HTTP client")?;
    let notifier = Notifier::new(
        client.clone(),
        config.notify.telegram.channel(),
        config.check.timeout(),
    );
    Ok(Monitor::new(store, client, notifier, config.check.settings()))
}

// ── One-shot check ──────────────────────────────────────────────

/// Where a `check` sweep ran.
#[derive(Debug)]
pub enum CheckRun {
    /// The daemon listening at this address ran the sweep.
    Remote(String),
    /// No daemon answered; the sweep ran against the store directly.
    Local(SweepReport),
}

/// Address of a daemon started with `config` on this host.
pub fn local_daemon_url(config: &BeaconConfig) -> String {
    format!("http://127.0.0.1:{}", config.server.port)
}

/// Ask the daemon at `base` to sweep now.
///
/// Returns `Ok(false)` when nothing accepts the connection. A daemon that
/// answers with an error status is an error.
pub async fn trigger_remote_check(base: &str, timeout: Duration) -> anyhow::Result<bool> {
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .context("failed to build HTTP client")?;
    let url = format!("{}/check", base.trim_end_matches('/'));

    let response = match client.get(&url).send().await {
        Ok(response) => response,
        Err(e) if e.is_connect() => {
            debug!(%url, error = %e, "no daemon answered");
            return Ok(false);
        }
        Err(e) => return Err(anyhow::Error::new(e).context(format!("check request to {url} failed"))),
    };

    let status = response.status();
    if !status.is_success() {
        anyhow::bail!("daemon at {base} answered {status}");
    }
    info!(%url, "sweep triggered on running daemon");
    Ok(true)
}

/// Sweep against the store under `data_dir`. Fails if a daemon holds it.
pub async fn run_local_check(config: &BeaconConfig) -> anyhow::Result<SweepReport> {
    let store = open_store(&config.server.data_dir)?;
    sync_services(&store, &config.services)?;
    let monitor = build_monitor(store, config)?;
    Ok(monitor.run_sweep().await?)
}

/// Run one sweep through the daemon at `daemon_url`, or locally if none
/// is running.
pub async fn run_check(config: &BeaconConfig, daemon_url: &str) -> anyhow::Result<CheckRun> {
    let timeout = config.check.settings().retry.budget() + REMOTE_CHECK_SLACK;
    if trigger_remote_check(daemon_url, timeout).await? {
        return Ok(CheckRun::Remote(daemon_url.to_string()));
    }
    info!(data_dir = ?config.server.data_dir, "no running daemon, checking against the local store");
    Ok(CheckRun::Local(run_local_check(config).await?))
}
