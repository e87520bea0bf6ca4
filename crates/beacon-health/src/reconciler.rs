//! State reconciliation. Turns a probe outcome into the next persisted
//! state of a service.
//!
//! [`decide`] is the pure transition function; [`reconcile`] runs it inside
//! a single store transaction so the read of the previous state, the
//! decision and the write cannot interleave with another writer.
//!
//! | previous | reachable | effect |
//! |---|---|---|
//! | unknown | any | baseline: set `is_up` and `status_changed_at`, no changelog |
//! | up | true | refresh `last_checked_at`, `response_time_ms` |
//! | up | false | flip to down, changelog `1 → 0` |
//! | down | false | refresh `last_checked_at`, `response_time_ms` |
//! | down | true | flip to up, changelog `0 → 1` |

use chrono::{DateTime, Utc};
use serde::Deserialize;

use beacon_state::{ChangelogEntry, Service, ServiceId, ServiceStatus, StateResult, StateStore};

use crate::checker::ProbeOutcome;

/// Whether establishing the baseline on a service's first check notifies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FirstCheckPolicy {
    /// Only genuine up/down flips notify.
    #[default]
    Silent,
    /// The first observation notifies as well.
    Notify,
}

/// A change of classification detected by one check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: ServiceStatus,
    pub to: ServiceStatus,
    pub at: DateTime<Utc>,
}

impl Transition {
    /// The first observation of a service, out of `Unknown`.
    pub fn is_baseline(&self) -> bool {
        self.from == ServiceStatus::Unknown
    }

    /// Changelog record for this transition. Baselines are not logged.
    pub fn changelog_entry(&self, service_id: ServiceId) -> Option<ChangelogEntry> {
        if self.is_baseline() {
            return None;
        }
        Some(ChangelogEntry::new(
            service_id,
            self.from == ServiceStatus::Up,
            self.to == ServiceStatus::Up,
            self.at,
        ))
    }

    pub fn should_notify(&self, policy: FirstCheckPolicy) -> bool {
        !self.is_baseline() || policy == FirstCheckPolicy::Notify
    }

    /// Derive the transition between two persisted rows, if any.
    pub fn between(previous: &Service, current: &Service) -> Option<Self> {
        let (from, to) = (previous.status(), current.status());
        if from == to {
            return None;
        }
        Some(Self {
            from,
            to,
            at: current.status_changed_at?,
        })
    }
}

/// Next state of a service plus the transition that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckDecision {
    pub service: Service,
    pub transition: Option<Transition>,
}

/// Compute the next persisted state of `previous` given a probe outcome.
pub fn decide(previous: &Service, outcome: &ProbeOutcome, now: DateTime<Utc>) -> CheckDecision {
    let mut next = previous.clone();

    // Never move backwards, even if the clock does.
    next.last_checked_at = Some(match previous.last_checked_at {
        Some(last) if last > now => last,
        _ => now,
    });
    next.response_time_ms = outcome.latency_ms;

    let from = previous.status();
    let to = ServiceStatus::from_reachable(outcome.reachable());
    let transition = (from != to).then(|| {
        next.is_up = outcome.reachable();
        next.status_changed_at = Some(now);
        Transition { from, to, at: now }
    });

    CheckDecision {
        service: next,
        transition,
    }
}

/// Result of a reconciled check.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled {
    pub service: Service,
    pub transition: Option<Transition>,
    pub changelog: Option<ChangelogEntry>,
}

/// Apply `outcome` to service `id` atomically.
///
/// The previous state is re-read inside the write transaction, so a
/// concurrent check of the same service is decided against whatever the
/// other check wrote.
pub fn reconcile(
    store: &StateStore,
    id: ServiceId,
    outcome: &ProbeOutcome,
    now: DateTime<Utc>,
) -> StateResult<Reconciled> {
    let recorded = store.record_check(id, |previous| {
        let decision = decide(previous, outcome, now);
        let changelog = decision
            .transition
            .and_then(|t| t.changelog_entry(previous.id));
        (decision.service, changelog)
    })?;

    Ok(Reconciled {
        transition: Transition::between(&recorded.previous, &recorded.current),
        service: recorded.current,
        changelog: recorded.changelog,
    })
}

/// Human-readable notification text for a service's new status.
pub fn transition_message(service: &Service, to: ServiceStatus) -> String {
    format!(
        "Service \"{}\" is now {}.\nURL: {}",
        service.name,
        to.label(),
        service.url
    )
}
