//! beacon-health: uptime checking for Beacon.
//!
//! Probes each tracked service over HTTP, reconciles the result against the
//! persisted state, records up/down flips in the changelog and sends a
//! notification when a service changes state.
//!
//! # Architecture
//!
//! ```text
//! SweepScheduler (one tick per interval)
//!   └── Monitor::run_sweep()
//!       └── per-service task
//!           ├── probe_with_retry() → http_probe() → ProbeOutcome
//!           ├── reconcile() → StateStore::record_check (one write txn)
//!           └── Notifier::notify() on a non-baseline transition
//! ```
//!
//! Probe failures are observations, not errors: a service that cannot be
//! reached is simply down. Only store failures surface as [`CheckError`],
//! and those abort the affected service for one sweep only.

pub mod checker;
pub mod notifier;
pub mod reconciler;
pub mod retry;
pub mod scheduler;
pub mod sweep;

pub use checker::{ProbeOutcome, ProbeResult, http_probe, probe_client};
pub use notifier::{Notifier, TelegramChannel};
pub use reconciler::{FirstCheckPolicy, Transition, decide, reconcile};
pub use retry::{RetryBackoff, RetryPolicy, probe_with_retry};
pub use scheduler::SweepScheduler;
pub use sweep::{CheckError, CheckSettings, Monitor, ServiceCheck, SweepReport};
