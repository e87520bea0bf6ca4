//! HTTP surface of the daemon.
//!
//! | Route | Handler |
//! |---|---|
//! | `/` | Status page |
//! | `/api/status` | Status snapshot as JSON |
//! | `/check` | Run a sweep now, then render the status page |
//! | `/healthz` | Liveness |

use axum::Router;
use axum::extract::State;
use axum::response::Html;
use axum::routing::get;
use tracing::{error, info};

use beacon_dashboard::{DashboardState, dashboard_router, render_status};
use beacon_health::Monitor;

#[derive(Clone)]
struct AppState {
    monitor: Monitor,
}

/// Build the full router: dashboard routes plus the on-demand check.
pub fn build_router(monitor: Monitor) -> Router {
    let dashboard = dashboard_router(DashboardState {
        store: monitor.store().clone(),
    });

    Router::new()
        .route("/check", get(check_now))
        .route("/healthz", get(healthz))
        .with_state(AppState { monitor })
        .merge(dashboard)
}

/// Sweep failures are logged; the page always renders from whatever state
/// was persisted.
async fn check_now(State(state): State<AppState>) -> Html<String> {
    match state.monitor.run_sweep().await {
        Ok(report) => info!(
            checked = report.checked.len(),
            failures = report.failures.len(),
            "on-demand sweep finished"
        ),
        Err(e) => error!(error = %e, "on-demand sweep failed"),
    }
    render_status(state.monitor.store(), beacon_state::time::now())
}

async fn healthz() -> &'static str {
    "ok"
}
