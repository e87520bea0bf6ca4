//! Dashboard page handlers.
//!
//! Each handler loads a [`StatusSnapshot`] from the state store and either
//! renders it through an Askama template or returns it as JSON.

use askama::Template;
use axum::Json;
use axum::extract::State;
use axum::response::Html;
use chrono::{DateTime, Utc};

use beacon_state::StateStore;

use crate::DashboardState;
use crate::snapshot::StatusSnapshot;
use crate::views::*;

/// Number of recent transitions listed under the services.
const RECENT_CHANGES_SHOWN: usize = 20;

fn render<T: Template>(tmpl: T) -> Html<String> {
    Html(tmpl.render().unwrap_or_else(|e| {
        format!("<pre>Template error: {e}</pre>")
    }))
}

#[derive(Template)]
#[template(path = "status.html")]
struct StatusTemplate {
    all_operational: bool,
    services: Vec<ServiceView>,
    changes: Vec<ChangeView>,
    last_updated: String,
    refresh_secs: u32,
}

/// Render the status page for an already-loaded snapshot.
pub fn render_snapshot(snapshot: &StatusSnapshot) -> Html<String> {
    render(StatusTemplate {
        all_operational: snapshot.all_operational(),
        services: snapshot
            .services
            .iter()
            .map(|s| ServiceView::from_service(s, snapshot))
            .collect(),
        changes: build_changes(snapshot, RECENT_CHANGES_SHOWN),
        last_updated: format_timestamp(&snapshot.last_updated),
        refresh_secs: 60,
    })
}

/// Load the current state from `store` and render the status page.
pub fn render_status(store: &StateStore, now: DateTime<Utc>) -> Html<String> {
    render_snapshot(&StatusSnapshot::load_or_empty(store, now))
}

pub async fn status_page(State(state): State<DashboardState>) -> Html<String> {
    render_status(&state.store, beacon_state::time::now())
}

pub async fn status_json(State(state): State<DashboardState>) -> Json<StatusSnapshot> {
    Json(StatusSnapshot::load_or_empty(&state.store, beacon_state::time::now()))
}
