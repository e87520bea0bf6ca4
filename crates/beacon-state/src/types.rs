//! Domain types for the Beacon state store.
//!
//! A [`Service`] is the durable record of one probe target and its last
//! known reachability. A [`ChangelogEntry`] records one up/down flip.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::time::{db_timestamp, db_timestamp_opt};

/// Unique, immutable identifier of a tracked service.
pub type ServiceId = u64;

// ── Service ───────────────────────────────────────────────────────

/// A tracked HTTP service and its last persisted check result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Service {
    pub id: ServiceId,
    /// Display name.
    pub name: String,
    /// Probe target.
    pub url: String,
    /// Last known reachability. Meaningless while `status_changed_at` is unset.
    pub is_up: bool,
    /// Time of the most recent probe, successful or not.
    #[serde(with = "db_timestamp_opt")]
    pub last_checked_at: Option<DateTime<Utc>>,
    /// Time of the most recent transition; `None` until the first check.
    #[serde(with = "db_timestamp_opt")]
    pub status_changed_at: Option<DateTime<Utc>>,
    /// Latency of the most recent response; `None` if the probe got no response.
    pub response_time_ms: Option<u64>,
    #[serde(with = "db_timestamp")]
    pub created_at: DateTime<Utc>,
}

impl Service {
    /// A service that has never been checked.
    pub fn new(
        id: ServiceId,
        name: impl Into<String>,
        url: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            url: url.into(),
            is_up: false,
            last_checked_at: None,
            status_changed_at: None,
            response_time_ms: None,
            created_at,
        }
    }

    /// Persisted status, `Unknown` until the first check is recorded.
    pub fn status(&self) -> ServiceStatus {
        if self.status_changed_at.is_none() {
            ServiceStatus::Unknown
        } else {
            ServiceStatus::from_reachable(self.is_up)
        }
    }
}

/// Up/down classification of a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    Up,
    Down,
    Unknown,
}

impl ServiceStatus {
    pub fn from_reachable(reachable: bool) -> Self {
        if reachable { Self::Up } else { Self::Down }
    }

    /// Upper-case label used in notifications.
    pub fn label(self) -> &'static str {
        match self {
            Self::Up => "UP",
            Self::Down => "DOWN",
            Self::Unknown => "UNKNOWN",
        }
    }
}

// ── Changelog ─────────────────────────────────────────────────────

/// One recorded up/down transition. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChangelogEntry {
    /// Assigned by the store on append.
    pub id: u64,
    pub service_id: ServiceId,
    #[serde(with = "bool_as_int")]
    pub previous_status: bool,
    #[serde(with = "bool_as_int")]
    pub new_status: bool,
    #[serde(with = "db_timestamp")]
    pub changed_at: DateTime<Utc>,
}

impl ChangelogEntry {
    /// An entry not yet appended; the store assigns `id`.
    pub fn new(
        service_id: ServiceId,
        previous_status: bool,
        new_status: bool,
        changed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: 0,
            service_id,
            previous_status,
            new_status,
            changed_at,
        }
    }
}

/// Booleans are encoded as `0`/`1` on the wire.
mod bool_as_int {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(u8::from(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        match u8::deserialize(deserializer)? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(serde::de::Error::custom(format!(
                "expected 0 or 1, found {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, h, 0, 0).unwrap()
    }

    #[test]
    fn new_service_is_unknown() {
        let svc = Service::new(1, "api", "https://example.com", ts(0));
        assert_eq!(svc.status(), ServiceStatus::Unknown);
    }

    #[test]
    fn status_follows_is_up_after_first_check() {
        let mut svc = Service::new(1, "api", "https://example.com", ts(0));
        svc.status_changed_at = Some(ts(1));
        assert_eq!(svc.status(), ServiceStatus::Down);
        svc.is_up = true;
        assert_eq!(svc.status(), ServiceStatus::Up);
    }

    #[test]
    fn service_json_uses_db_timestamps() {
        let mut svc = Service::new(7, "api", "https://example.com", ts(0));
        svc.last_checked_at = Some(ts(2));
        let json = serde_json::to_value(&svc).unwrap();
        assert_eq!(json["created_at"], "2025-06-01 00:00:00");
        assert_eq!(json["last_checked_at"], "2025-06-01 02:00:00");
        assert!(json["status_changed_at"].is_null());

        let back: Service = serde_json::from_value(json).unwrap();
        assert_eq!(back, svc);
    }

    #[test]
    fn changelog_encodes_status_as_integers() {
        let entry = ChangelogEntry::new(3, true, false, ts(5));
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["previous_status"], 1);
        assert_eq!(json["new_status"], 0);
    }

    #[test]
    fn changelog_rejects_non_binary_status() {
        let json = r#"{"id":1,"service_id":1,"previous_status":2,"new_status":0,"changed_at":"2025-06-01 00:00:00"}"#;
        assert!(serde_json::from_str::<ChangelogEntry>(json).is_err());
    }

    #[test]
    fn status_labels() {
        assert_eq!(ServiceStatus::from_reachable(true).label(), "UP");
        assert_eq!(ServiceStatus::from_reachable(false).label(), "DOWN");
    }
}
