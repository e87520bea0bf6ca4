//! View types for the status page template.
//!
//! These carry pre-formatted strings so the template stays simple.

use chrono::{DateTime, TimeDelta, Utc};

use beacon_state::{ChangelogEntry, Service, ServiceStatus};

use crate::snapshot::{StatusSnapshot, changelog_window};

// ── Service View ────────────────────────────────────────────────

pub struct ServiceView {
    pub name: String,
    pub url: String,
    pub status_text: &'static str,
    pub status_class: &'static str,
    pub status_icon: &'static str,
    /// e.g. "Up for 3h 12m".
    pub duration_display: String,
    pub response_display: String,
    pub last_checked_display: String,
    pub timeline: Vec<TimelineSegment>,
}

impl ServiceView {
    pub fn from_service(service: &Service, snapshot: &StatusSnapshot) -> Self {
        let now = snapshot.generated_at;
        let status = service.status();
        let entries: Vec<&ChangelogEntry> = snapshot.changelog_for(service).collect();

        let duration_display = match service.status_changed_at {
            Some(since) => format!("{} for {}", status_text(status), format_duration(since, now)),
            None => "Not checked yet".to_string(),
        };

        Self {
            name: service.name.clone(),
            url: service.url.clone(),
            status_text: status_text(status),
            status_class: status_class(status),
            status_icon: status_icon(status),
            duration_display,
            response_display: service
                .response_time_ms
                .map(|ms| format!("{ms}ms"))
                .unwrap_or_else(|| "-".to_string()),
            last_checked_display: service
                .last_checked_at
                .map(|t| format_timestamp(&t))
                .unwrap_or_else(|| "Never".to_string()),
            timeline: build_timeline(service, &entries, now),
        }
    }
}

// ── Timeline ────────────────────────────────────────────────────

/// One contiguous stretch of the 24-hour bar.
#[derive(Debug, Clone, PartialEq)]
pub struct TimelineSegment {
    pub status: ServiceStatus,
    pub class: &'static str,
    /// Width as a percentage of the window, e.g. "12.50".
    pub width: String,
    /// Hover text, e.g. "Down for 2h 5m".
    pub title: String,
}

/// Reconstruct the last 24 hours of a service from its changelog.
///
/// `entries` must belong to `service` and be sorted oldest first. Time before
/// the service was created, or before its first check, is shown as unknown.
pub fn build_timeline(
    service: &Service,
    entries: &[&ChangelogEntry],
    now: DateTime<Utc>,
) -> Vec<TimelineSegment> {
    let window_start = now - changelog_window();
    let total = (now - window_start).num_seconds().max(1);

    let mut spans: Vec<(ServiceStatus, i64)> = Vec::new();
    let mut push = |status: ServiceStatus, from: DateTime<Utc>, to: DateTime<Utc>| {
        let secs = (to - from).num_seconds();
        if secs <= 0 {
            return;
        }
        match spans.last_mut() {
            Some((last, len)) if *last == status => *len += secs,
            _ => spans.push((status, secs)),
        }
    };

    let mut cursor = service.created_at.clamp(window_start, now);
    push(ServiceStatus::Unknown, window_start, cursor);

    // With no flips in the window, a status change inside it is the baseline.
    if entries.is_empty() {
        if let Some(baseline) = service.status_changed_at {
            let at = baseline.clamp(cursor, now);
            push(ServiceStatus::Unknown, cursor, at);
            cursor = at;
        }
    }

    // Before the first recorded flip the service was in that flip's
    // previous state; with no flips, in its current state.
    let mut state = entries
        .first()
        .map(|e| ServiceStatus::from_reachable(e.previous_status))
        .unwrap_or_else(|| service.status());

    for entry in entries {
        let at = entry.changed_at.clamp(cursor, now);
        push(state, cursor, at);
        cursor = at;
        state = ServiceStatus::from_reachable(entry.new_status);
    }
    push(state, cursor, now);

    spans
        .into_iter()
        .map(|(status, seconds)| TimelineSegment {
            status,
            class: status_class(status),
            width: format!("{:.2}", seconds as f64 * 100.0 / total as f64),
            title: format!(
                "{} for {}",
                status_text(status),
                format_duration(now - TimeDelta::seconds(seconds), now)
            ),
        })
        .collect()
}

// ── Recent changes ──────────────────────────────────────────────

pub struct ChangeView {
    pub service_name: String,
    pub from_text: &'static str,
    pub to_text: &'static str,
    pub to_class: &'static str,
    pub at_display: String,
}

/// Recent transitions across all services, newest first.
pub fn build_changes(snapshot: &StatusSnapshot, limit: usize) -> Vec<ChangeView> {
    snapshot
        .recent_changelog
        .iter()
        .rev()
        .take(limit)
        .map(|entry| {
            let service_name = snapshot
                .services
                .iter()
                .find(|s| s.id == entry.service_id)
                .map(|s| s.name.clone())
                .unwrap_or_else(|| format!("#{}", entry.service_id));
            let to = ServiceStatus::from_reachable(entry.new_status);
            ChangeView {
                service_name,
                from_text: status_text(ServiceStatus::from_reachable(entry.previous_status)),
                to_text: status_text(to),
                to_class: status_class(to),
                at_display: format_timestamp(&entry.changed_at),
            }
        })
        .collect()
}

// ── Formatting Helpers ──────────────────────────────────────────

/// Coarse elapsed time since `since`, e.g. "2d 3h", "4h 10m", "5m 2s", "9s".
pub fn format_duration(since: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let seconds = (now - since).num_seconds().max(0);
    let minutes = seconds / 60;
    let hours = minutes / 60;
    let days = hours / 24;

    if days > 0 {
        format!("{days}d {}h", hours % 24)
    } else if hours > 0 {
        format!("{hours}h {}m", minutes % 60)
    } else if minutes > 0 {
        format!("{minutes}m {}s", seconds % 60)
    } else {
        format!("{seconds}s")
    }
}

pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

pub fn status_text(status: ServiceStatus) -> &'static str {
    match status {
        ServiceStatus::Up => "Up",
        ServiceStatus::Down => "Down",
        ServiceStatus::Unknown => "Unknown",
    }
}

pub fn status_class(status: ServiceStatus) -> &'static str {
    match status {
        ServiceStatus::Up => "up",
        ServiceStatus::Down => "down",
        ServiceStatus::Unknown => "unknown",
    }
}

fn status_icon(status: ServiceStatus) -> &'static str {
    match status {
        ServiceStatus::Up => "🟢",
        ServiceStatus::Down => "🔴",
        ServiceStatus::Unknown => "⚪",
    }
}
