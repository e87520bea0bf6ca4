//! beacon-state: embedded state store for Beacon.
//!
//! Backed by [redb](https://docs.rs/redb), persists the tracked services
//! and the append-only changelog of their up/down transitions.
//!
//! # Architecture
//!
//! Records are JSON-serialized into redb's `&[u8]` value columns under
//! `u64` keys, so a table scan yields services in creation order.
//! Timestamps are stored as `YYYY-MM-DD HH:MM:SS` UTC strings (see
//! [`time`]).
//!
//! Every write runs in its own redb write transaction. redb admits a
//! single writer at a time, which makes [`StateStore::record_check`] an
//! atomic read-decide-write for one service row.

pub mod error;
pub mod store;
pub mod tables;
pub mod time;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::{RecordedCheck, StateStore};
pub use types::*;
