//! Bounded retry around [`http_probe`].
//!
//! Only `Failed` probes (no response at all) are retried. A response with
//! a bad status is a definite answer and is returned immediately.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::checker::{DEFAULT_PROBE_TIMEOUT, ProbeOutcome, ProbeResult, http_probe};

/// Cap for exponential backoff.
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// How the delay between attempts evolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryBackoff {
    /// Same delay before every retry.
    #[default]
    Flat,
    /// Delay doubles before each retry, capped at 60s.
    Exponential,
}

/// Retry parameters for one service check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. `0` behaves like `1`.
    pub max_attempts: u32,
    /// Base delay between attempts.
    pub delay: Duration,
    pub backoff: RetryBackoff,
    /// Timeout applied to each attempt independently.
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(1),
            backoff: RetryBackoff::Flat,
            timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }
}

impl RetryPolicy {
    /// Delay to sleep before the `retry`-th retry (1-based).
    pub fn delay_before(&self, retry: u32) -> Duration {
        match self.backoff {
            RetryBackoff::Flat => self.delay,
            RetryBackoff::Exponential => {
                let factor = 1u32.checked_shl(retry.saturating_sub(1)).unwrap_or(u32::MAX);
                self.delay.saturating_mul(factor).min(MAX_BACKOFF)
            }
        }
    }

    /// Worst-case wall time of one check under this policy.
    pub fn budget(&self) -> Duration {
        let attempts = self.max_attempts.max(1);
        let sleeps: Duration = (1..attempts).map(|n| self.delay_before(n)).sum();
        self.timeout.saturating_mul(attempts) + sleeps
    }
}

/// Probe `url`, retrying transport failures according to `policy`.
pub async fn probe_with_retry(client: &Client, url: &str, policy: &RetryPolicy) -> ProbeOutcome {
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        let outcome = http_probe(client, url, policy.timeout).await;
        if outcome.result != ProbeResult::Failed || attempt >= attempts {
            if outcome.result == ProbeResult::Failed {
                debug!(%url, attempts, "probe failed on every attempt");
            }
            return outcome;
        }

        let delay = policy.delay_before(attempt);
        debug!(%url, attempt, ?delay, "probe failed, retrying");
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}
