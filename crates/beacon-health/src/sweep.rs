//! Sweep driver: one pass over every tracked service.
//!
//! Each service is checked in its own task: probe with retry, reconcile
//! against the store, notify on transition. A failure in one task (store
//! error or panic) is recorded in the [`SweepReport`] and does not affect
//! the others.

use std::sync::Arc;
use std::time::Instant;

use reqwest::Client;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use beacon_state::{Service, ServiceId, StateError, StateStore};

use crate::checker::{ProbeOutcome, millis};
use crate::notifier::Notifier;
use crate::reconciler::{FirstCheckPolicy, Transition, reconcile, transition_message};
use crate::retry::{RetryPolicy, probe_with_retry};

/// Everything a check needs besides the store and clients.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckSettings {
    pub retry: RetryPolicy,
    pub first_check: FirstCheckPolicy,
}

#[derive(Debug, Error)]
pub enum CheckError {
    #[error("state store: {0}")]
    Store(#[from] StateError),

    #[error("check task aborted: {0}")]
    Task(String),
}

/// Outcome of checking one service.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceCheck {
    pub service: Service,
    pub outcome: ProbeOutcome,
    pub transition: Option<Transition>,
    /// Whether a notification was delivered for this check.
    pub notified: bool,
}

/// A service whose check could not be completed this sweep.
#[derive(Debug)]
pub struct CheckFailure {
    pub service_id: ServiceId,
    pub name: String,
    pub error: CheckError,
}

/// Per-service results of one sweep, in listing order.
#[derive(Debug, Default)]
pub struct SweepReport {
    pub checked: Vec<ServiceCheck>,
    pub failures: Vec<CheckFailure>,
}

impl SweepReport {
    /// Checks that changed a service's classification.
    pub fn transitions(&self) -> impl Iterator<Item = &ServiceCheck> {
        self.checked.iter().filter(|c| c.transition.is_some())
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Runs sweeps. Cheap to clone; clones share the store, client and notifier.
#[derive(Clone)]
pub struct Monitor {
    store: StateStore,
    client: Client,
    notifier: Arc<Notifier>,
    settings: Arc<CheckSettings>,
}

impl Monitor {
    pub fn new(store: StateStore, client: Client, notifier: Notifier, settings: CheckSettings) -> Self {
        Self {
            store,
            client,
            notifier: Arc::new(notifier),
            settings: Arc::new(settings),
        }
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn settings(&self) -> &CheckSettings {
        &self.settings
    }

    /// Check every tracked service once.
    ///
    /// Fails only if the service listing itself cannot be read; per-service
    /// failures are reported in the returned [`SweepReport`].
    pub async fn run_sweep(&self) -> Result<SweepReport, CheckError> {
        let started = Instant::now();
        let services = self.store.list_services()?;
        debug!(count = services.len(), "sweep starting");

        let tasks: Vec<_> = services
            .into_iter()
            .map(|service| {
                let monitor = self.clone();
                let id = service.id;
                let name = service.name.clone();
                (id, name, tokio::spawn(async move { monitor.check_service(service).await }))
            })
            .collect();

        let mut report = SweepReport::default();
        for (service_id, name, handle) in tasks {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => Err(CheckError::Task(e.to_string())),
            };
            match result {
                Ok(check) => report.checked.push(check),
                Err(error) => {
                    error!(service_id, %name, %error, "service check failed");
                    report.failures.push(CheckFailure {
                        service_id,
                        name,
                        error,
                    });
                }
            }
        }

        info!(
            checked = report.checked.len(),
            transitions = report.transitions().count(),
            failures = report.failures.len(),
            elapsed_ms = millis(started.elapsed()),
            "sweep completed"
        );
        Ok(report)
    }

    /// Probe, reconcile and notify for a single service.
    pub async fn check_service(&self, service: Service) -> Result<ServiceCheck, CheckError> {
        let outcome = probe_with_retry(&self.client, &service.url, &self.settings.retry).await;
        let now = beacon_state::time::now();

        let reconciled = reconcile(&self.store, service.id, &outcome, now)?;

        let mut notified = false;
        if let Some(transition) = reconciled.transition {
            if transition.is_baseline() {
                info!(service_id = service.id, name = %service.name, status = ?transition.to, "baseline status recorded");
            } else {
                warn!(
                    service_id = service.id,
                    name = %service.name,
                    from = ?transition.from,
                    to = ?transition.to,
                    "service status changed"
                );
            }

            if self.notifier.is_enabled() && transition.should_notify(self.settings.first_check) {
                let message = transition_message(&reconciled.service, transition.to);
                notified = self.notifier.notify(&message).await;
            }
        }

        Ok(ServiceCheck {
            service: reconciled.service,
            outcome,
            transition: reconciled.transition,
            notified,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_state::ServiceStatus;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::checker::probe_client;
    use crate::retry::RetryBackoff;

    fn settings() -> CheckSettings {
        CheckSettings {
            retry: RetryPolicy {
                max_attempts: 2,
                delay: Duration::from_millis(10),
                backoff: RetryBackoff::Flat,
                timeout: Duration::from_millis(200),
            },
            first_check: FirstCheckPolicy::Silent,
        }
    }

    fn monitor(store: StateStore) -> Monitor {
        let client = probe_client().unwrap();
        Monitor::new(store, client.clone(), Notifier::disabled(client), settings())
    }

    #[tokio::test]
    async fn empty_sweep_is_complete() {
        let monitor = monitor(StateStore::open_in_memory().unwrap());
        let report = monitor.run_sweep().await.unwrap();
        assert!(report.checked.is_empty());
        assert!(report.is_complete());
    }

    #[tokio::test]
    async fn sweep_checks_services_in_listing_order() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/up"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/down"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let store = StateStore::open_in_memory().unwrap();
        let now = beacon_state::time::now();
        store.register_service("b-up", &format!("{}/up", server.uri()), now).unwrap();
        store.register_service("a-down", &format!("{}/down", server.uri()), now).unwrap();

        let report = monitor(store.clone()).run_sweep().await.unwrap();

        let names: Vec<_> = report.checked.iter().map(|c| c.service.name.as_str()).collect();
        assert_eq!(names, ["b-up", "a-down"]);
        assert_eq!(report.checked[0].service.status(), ServiceStatus::Up);
        assert_eq!(report.checked[1].service.status(), ServiceStatus::Down);
        // Baselines are transitions but not notified under the silent policy.
        assert_eq!(report.transitions().count(), 2);
        assert!(report.checked.iter().all(|c| !c.notified));
    }

    #[tokio::test]
    async fn flip_without_channel_is_not_notified() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let store = StateStore::open_in_memory().unwrap();
        let mut svc = store
            .register_service("api", &server.uri(), beacon_state::time::now())
            .unwrap();
        svc.is_up = true;
        svc.status_changed_at = Some(svc.created_at);
        svc.last_checked_at = Some(svc.created_at);
        store.put_service(&svc).unwrap();

        let monitor = monitor(store.clone());
        assert!(!monitor.notifier.is_enabled());
        let check = monitor.check_service(svc).await.unwrap();
        let t = check.transition.unwrap();
        assert_eq!((t.from, t.to), (ServiceStatus::Up, ServiceStatus::Down));
        assert!(!check.notified);
        assert_eq!(store.list_changelog_since(check.service.created_at).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn missing_row_fails_only_that_service() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let store = StateStore::open_in_memory().unwrap();
        let now = beacon_state::time::now();
        let kept = store.register_service("kept", &server.uri(), now).unwrap();
        let gone = store.register_service("gone", &server.uri(), now).unwrap();

        let monitor = monitor(store.clone());
        store.remove_service(gone.id).unwrap();
        let err = monitor.check_service(gone.clone()).await.unwrap_err();
        assert!(matches!(err, CheckError::Store(StateError::ServiceNotFound(id)) if id == gone.id));

        let check = monitor.check_service(kept.clone()).await.unwrap();
        assert!(check.service.is_up);
    }
}
