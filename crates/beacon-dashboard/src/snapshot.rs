//! The read model behind the status page.

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use tracing::error;

use beacon_state::time::db_timestamp;
use beacon_state::{ChangelogEntry, Service, StateResult, StateStore};

/// How far back the changelog is loaded for the timeline.
pub const CHANGELOG_WINDOW_HOURS: i64 = 24;

pub fn changelog_window() -> TimeDelta {
    TimeDelta::hours(CHANGELOG_WINDOW_HOURS)
}

/// Everything the dashboard shows, read from the store in one go.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StatusSnapshot {
    /// Tracked services, sorted by name.
    pub services: Vec<Service>,
    /// Most recent `last_checked_at` of any service, or the load time if
    /// nothing has been checked yet.
    #[serde(with = "db_timestamp")]
    pub last_updated: DateTime<Utc>,
    /// Transitions within [`CHANGELOG_WINDOW_HOURS`] of the load time, oldest first.
    pub recent_changelog: Vec<ChangelogEntry>,
    /// Load time; the reference point for durations and the timeline.
    #[serde(skip)]
    pub generated_at: DateTime<Utc>,
}

impl StatusSnapshot {
    pub fn load(store: &StateStore, now: DateTime<Utc>) -> StateResult<Self> {
        let mut services = store.list_services()?;
        services.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));

        let recent_changelog = store.list_changelog_since(now - changelog_window())?;

        let last_updated = services
            .iter()
            .filter_map(|s| s.last_checked_at)
            .max()
            .unwrap_or(now);

        Ok(Self {
            services,
            last_updated,
            recent_changelog,
            generated_at: now,
        })
    }

    /// Load a snapshot, falling back to an empty one if the store fails.
    ///
    /// Visitors never see a store error, only an empty page.
    pub fn load_or_empty(store: &StateStore, now: DateTime<Utc>) -> Self {
        Self::load(store, now).unwrap_or_else(|e| {
            error!(error = %e, "failed to load status snapshot");
            Self::empty(now)
        })
    }

    pub fn empty(now: DateTime<Utc>) -> Self {
        Self {
            services: Vec::new(),
            last_updated: now,
            recent_changelog: Vec::new(),
            generated_at: now,
        }
    }

    /// True when every service is known to be up.
    ///
    /// A service that has never been checked does not count as up.
    pub fn all_operational(&self) -> bool {
        self.services.iter().all(|s| s.status_changed_at.is_some() && s.is_up)
    }

    /// Changelog entries for one service, oldest first.
    pub fn changelog_for(&self, service: &Service) -> impl Iterator<Item = &ChangelogEntry> {
        let id = service.id;
        self.recent_changelog.iter().filter(move |e| e.service_id == id)
    }
}
