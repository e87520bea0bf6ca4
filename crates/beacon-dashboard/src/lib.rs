//! beacon-dashboard: server-rendered public status page for Beacon.
//!
//! Reads the persisted state only; it never triggers checks itself.
//!
//! # Routes
//!
//! | Route | Handler |
//! |---|---|
//! | `/` | Status page (HTML) |
//! | `/api/status` | Status snapshot (JSON) |

pub mod pages;
pub mod snapshot;
pub mod views;

use axum::Router;
use axum::routing::get;
use beacon_state::StateStore;

pub use pages::{render_snapshot, render_status};
pub use snapshot::StatusSnapshot;

/// Shared state for dashboard handlers.
#[derive(Clone)]
pub struct DashboardState {
    pub store: StateStore,
}

/// Build the dashboard router.
pub fn dashboard_router(state: DashboardState) -> Router {
    Router::new()
        .route("/", get(pages::status_page))
        .route("/api/status", get(pages::status_json))
        .with_state(state)
}
