//! End-to-end sweep tests.
//!
//! Runs full sweeps against wiremock-backed services and a wiremock
//! Telegram endpoint, with an in-memory state store.

use std::time::Duration;

use beacon_health::*;
use beacon_state::{Service, ServiceStatus, StateStore};
use chrono::{DateTime, TimeZone, Utc};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TOKEN: &str = "T0KEN";

fn long_ago() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

fn settings(first_check: FirstCheckPolicy) -> CheckSettings {
    CheckSettings {
        retry: RetryPolicy {
            max_attempts: 3,
            delay: Duration::from_millis(10),
            backoff: RetryBackoff::Flat,
            timeout: Duration::from_millis(200),
        },
        first_check,
    }
}

fn monitor(store: &StateStore, telegram: &MockServer, first_check: FirstCheckPolicy) -> Monitor {
    let client = probe_client().unwrap();
    let channel = TelegramChannel::from_credentials(Some(TOKEN.into()), Some("42".into()))
        .unwrap()
        .with_api_base(telegram.uri());
    let notifier = Notifier::new(client.clone(), Some(channel), Duration::from_secs(2));
    Monitor::new(store.clone(), client, notifier, settings(first_check))
}

/// Register a service and mark it as already observed in `is_up`.
fn seeded(store: &StateStore, name: &str, url: &str, is_up: bool) -> Service {
    let mut svc = store.register_service(name, url, long_ago()).unwrap();
    svc.is_up = is_up;
    svc.status_changed_at = Some(long_ago());
    svc.last_checked_at = Some(long_ago());
    store.put_service(&svc).unwrap();
    svc
}

async fn telegram_expecting(times: u64, text: &str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/bot{TOKEN}/sendMessage")))
        .and(body_string_contains(text))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"ok":true}"#))
        .expect(times)
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn up_service_that_times_out_goes_down_once() {
    let service = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .expect(3)
        .mount(&service)
        .await;
    let telegram = telegram_expecting(1, "DOWN").await;

    let store = StateStore::open_in_memory().unwrap();
    let svc = seeded(&store, "api", &service.uri(), true);

    let report = monitor(&store, &telegram, FirstCheckPolicy::Silent)
        .run_sweep()
        .await
        .unwrap();

    assert!(report.is_complete());
    let check = &report.checked[0];
    assert_eq!(check.outcome, ProbeOutcome::failed());
    assert!(check.notified);
    let t = check.transition.unwrap();
    assert_eq!((t.from, t.to), (ServiceStatus::Up, ServiceStatus::Down));

    let stored = store.get_service(svc.id).unwrap().unwrap();
    assert!(!stored.is_up);
    assert_eq!(stored.response_time_ms, None);
    assert!(stored.status_changed_at.unwrap() > long_ago());

    let log = store.list_changelog_since(long_ago()).unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].service_id, svc.id);
    assert!(log[0].previous_status);
    assert!(!log[0].new_status);
}

#[tokio::test]
async fn down_service_that_answers_comes_back_up() {
    let service = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&service)
        .await;
    let telegram = telegram_expecting(1, "UP").await;

    let store = StateStore::open_in_memory().unwrap();
    let svc = seeded(&store, "api", &service.uri(), false);

    monitor(&store, &telegram, FirstCheckPolicy::Silent)
        .run_sweep()
        .await
        .unwrap();

    let stored = store.get_service(svc.id).unwrap().unwrap();
    assert_eq!(stored.status(), ServiceStatus::Up);
    assert!(stored.response_time_ms.is_some());

    let log = store.list_changelog_since(long_ago()).unwrap();
    assert_eq!(log.len(), 1);
    assert!(!log[0].previous_status);
    assert!(log[0].new_status);
}

#[tokio::test]
async fn repeated_sweeps_without_change_are_idempotent() {
    let service = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&service)
        .await;
    let telegram = telegram_expecting(0, "").await;

    let store = StateStore::open_in_memory().unwrap();
    let svc = seeded(&store, "api", &service.uri(), true);
    let monitor = monitor(&store, &telegram, FirstCheckPolicy::Silent);

    monitor.run_sweep().await.unwrap();
    let after_first = store.get_service(svc.id).unwrap().unwrap();
    monitor.run_sweep().await.unwrap();
    let after_second = store.get_service(svc.id).unwrap().unwrap();

    assert!(after_second.is_up);
    assert_eq!(after_second.status_changed_at, Some(long_ago()));
    assert_eq!(after_second.status_changed_at, after_first.status_changed_at);
    assert!(after_second.last_checked_at >= after_first.last_checked_at);
    assert!(after_first.last_checked_at.unwrap() > long_ago());
    assert!(store.list_changelog_since(long_ago()).unwrap().is_empty());
}

#[tokio::test]
async fn first_check_sets_baseline_silently() {
    let service = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&service)
        .await;
    let telegram = telegram_expecting(0, "").await;

    let store = StateStore::open_in_memory().unwrap();
    let svc = store
        .register_service("api", &service.uri(), long_ago())
        .unwrap();
    assert_eq!(svc.status(), ServiceStatus::Unknown);

    let report = monitor(&store, &telegram, FirstCheckPolicy::Silent)
        .run_sweep()
        .await
        .unwrap();

    assert!(report.checked[0].transition.unwrap().is_baseline());
    assert!(!report.checked[0].notified);

    let stored = store.get_service(svc.id).unwrap().unwrap();
    assert_eq!(stored.status(), ServiceStatus::Down);
    // A bad status is still a response, so its latency is kept.
    assert!(stored.response_time_ms.is_some());
    assert!(store.list_changelog_since(long_ago()).unwrap().is_empty());
}

#[tokio::test]
async fn first_check_notifies_when_configured() {
    let service = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&service)
        .await;
    let telegram = telegram_expecting(1, "UP").await;

    let store = StateStore::open_in_memory().unwrap();
    store
        .register_service("api", &service.uri(), long_ago())
        .unwrap();

    let report = monitor(&store, &telegram, FirstCheckPolicy::Notify)
        .run_sweep()
        .await
        .unwrap();

    assert!(report.checked[0].notified);
    assert!(store.list_changelog_since(long_ago()).unwrap().is_empty());
}

#[tokio::test]
async fn one_failing_service_does_not_affect_the_others() {
    let up = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&up)
        .await;
    let telegram = telegram_expecting(1, "DOWN").await;

    let store = StateStore::open_in_memory().unwrap();
    let healthy = seeded(&store, "healthy", &up.uri(), true);
    let broken = seeded(&store, "broken", "http://127.0.0.1:1/", true);

    let report = monitor(&store, &telegram, FirstCheckPolicy::Silent)
        .run_sweep()
        .await
        .unwrap();

    assert_eq!(report.checked.len(), 2);
    assert_eq!(report.transitions().count(), 1);
    assert!(store.get_service(healthy.id).unwrap().unwrap().is_up);
    assert!(!store.get_service(broken.id).unwrap().unwrap().is_up);
}

#[tokio::test]
async fn notification_failure_does_not_roll_back_state() {
    let service = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&service)
        .await;
    let telegram = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(502))
        .expect(1)
        .mount(&telegram)
        .await;

    let store = StateStore::open_in_memory().unwrap();
    let svc = seeded(&store, "api", &service.uri(), true);

    let report = monitor(&store, &telegram, FirstCheckPolicy::Silent)
        .run_sweep()
        .await
        .unwrap();

    assert!(report.is_complete());
    assert!(!report.checked[0].notified);
    assert!(!store.get_service(svc.id).unwrap().unwrap().is_up);
    assert_eq!(store.list_changelog_since(long_ago()).unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn overlapping_sweeps_record_one_flip() {
    let service = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&service)
        .await;
    let telegram = telegram_expecting(1, "DOWN").await;

    let store = StateStore::open_in_memory().unwrap();
    let svc = seeded(&store, "api", &service.uri(), true);
    let m = monitor(&store, &telegram, FirstCheckPolicy::Silent);

    let (a, b) = tokio::join!(m.run_sweep(), m.run_sweep());
    let (a, b) = (a.unwrap(), b.unwrap());
    assert!(a.is_complete() && b.is_complete());

    let flips = a.transitions().count() + b.transitions().count();
    assert_eq!(flips, 1);
    let notified = a
        .checked
        .iter()
        .chain(&b.checked)
        .filter(|c| c.notified)
        .count();
    assert_eq!(notified, 1);

    let log = store.list_changelog_since(long_ago()).unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].service_id, svc.id);
    assert!(!store.get_service(svc.id).unwrap().unwrap().is_up);
}
