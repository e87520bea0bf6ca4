//! Health check probe logic.
//!
//! Performs a single bounded-time HTTP GET against a service URL and
//! classifies the outcome. Network failures are observations, not errors.

use std::time::{Duration, Instant};

use reqwest::{Client, StatusCode, redirect};
use tracing::debug;

/// Hard per-attempt timeout applied when none is configured.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Identifying client header sent with every probe.
pub const USER_AGENT: &str = concat!("beacon-health/", env!("CARGO_PKG_VERSION"));

/// Result of a single health probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeResult {
    /// The endpoint answered with a status in [200, 400).
    Healthy,
    /// The endpoint answered with any other status.
    Unhealthy,
    /// No response: timeout, DNS, TLS, refused or reset.
    Failed,
}

/// Classified probe result plus the time it took to get a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub result: ProbeResult,
    /// `None` when no response was received.
    pub latency_ms: Option<u64>,
}

impl ProbeOutcome {
    pub fn failed() -> Self {
        Self {
            result: ProbeResult::Failed,
            latency_ms: None,
        }
    }

    pub fn responded(status: StatusCode, latency_ms: u64) -> Self {
        Self {
            result: classify(status),
            latency_ms: Some(latency_ms),
        }
    }

    /// Whether the service counts as up.
    pub fn reachable(&self) -> bool {
        self.result == ProbeResult::Healthy
    }
}

/// 2xx and 3xx count as reachable; a redirect still proves the server answers.
pub fn classify(status: StatusCode) -> ProbeResult {
    if (200..400).contains(&status.as_u16()) {
        ProbeResult::Healthy
    } else {
        ProbeResult::Unhealthy
    }
}

/// Whole milliseconds in `elapsed`, saturating at `u64::MAX`.
pub(crate) fn millis(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

/// Build the HTTP client used for probes.
///
/// Redirects are not followed, so a 3xx is observed as-is.
pub fn probe_client() -> reqwest::Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .redirect(redirect::Policy::none())
        .build()
}

/// Perform an HTTP GET probe against `url`.
///
/// The response body is never read: the response is dropped as soon as the
/// status line is in, which cancels the body stream.
pub async fn http_probe(client: &Client, url: &str, timeout: Duration) -> ProbeOutcome {
    let started = Instant::now();
    let request = client.get(url).timeout(timeout).send();

    match tokio::time::timeout(timeout, request).await {
        Ok(Ok(response)) => {
            let latency_ms = millis(started.elapsed());
            let status = response.status();
            drop(response);

            let outcome = ProbeOutcome::responded(status, latency_ms);
            if !outcome.reachable() {
                debug!(%status, %url, "health probe got non-2xx/3xx");
            }
            outcome
        }
        Ok(Err(e)) => {
            debug!(error = %e, %url, "health probe request failed");
            ProbeOutcome::failed()
        }
        Err(_) => {
            debug!(%url, ?timeout, "health probe timed out");
            ProbeOutcome::failed()
        }
    }
}
