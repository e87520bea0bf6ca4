//! StateStore: redb-backed persistence for Beacon.
//!
//! Provides typed operations over services and the changelog. All values
//! are JSON-serialized into redb's `&[u8]` value columns. The store
//! supports both on-disk and in-memory backends (the latter for testing).

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use redb::{Database, ReadableDatabase, ReadableTable, WriteTransaction};
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Rows written by [`StateStore::record_check`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCheck {
    /// The row as it was read inside the transaction.
    pub previous: Service,
    /// The row as it was written.
    pub current: Service,
    /// The changelog entry appended in the same transaction, if any.
    pub changelog: Option<ChangelogEntry>,
}

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(SERVICES).map_err(map_err!(Table))?;
        txn.open_table(CHANGELOG).map_err(map_err!(Table))?;
        txn.open_table(SEQUENCES).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Services ───────────────────────────────────────────────────

    /// Register a service by name, returning the stored record.
    ///
    /// Idempotent: if a service with this name exists its id, history and
    /// state are kept and only the URL is refreshed.
    pub fn register_service(&self, name: &str, url: &str, now: DateTime<Utc>) -> StateResult<Service> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existing = {
            let table = txn.open_table(SERVICES).map_err(map_err!(Table))?;
            let mut found = None;
            for entry in table.iter().map_err(map_err!(Read))? {
                let (_, value) = entry.map_err(map_err!(Read))?;
                let svc: Service = decode(value.value())?;
                if svc.name == name {
                    found = Some(svc);
                    break;
                }
            }
            found
        };

        let service = match existing {
            Some(mut svc) => {
                if svc.url == url {
                    txn.abort().map_err(map_err!(Transaction))?;
                    return Ok(svc);
                }
                debug!(service_id = svc.id, old = %svc.url, new = %url, "service url updated");
                svc.url = url.to_string();
                svc
            }
            None => {
                let id = next_id(&txn, SERVICE_SEQUENCE)?;
                debug!(service_id = id, %name, %url, "service registered");
                Service::new(id, name, url, now)
            }
        };

        put_service_in(&txn, &service)?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(service)
    }

    /// Insert or overwrite a service record as-is.
    pub fn put_service(&self, service: &Service) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        put_service_in(&txn, service)?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Get a service by id.
    pub fn get_service(&self, id: ServiceId) -> StateResult<Option<Service>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(SERVICES).map_err(map_err!(Table))?;
        match table.get(id).map_err(map_err!(Read))? {
            Some(guard) => Ok(Some(decode(guard.value())?)),
            None => Ok(None),
        }
    }

    /// List all services in id (creation) order.
    pub fn list_services(&self) -> StateResult<Vec<Service>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(SERVICES).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            results.push(decode(value.value())?);
        }
        Ok(results)
    }

    /// Delete a service. Its changelog entries are left in place.
    /// Returns true if it existed.
    pub fn remove_service(&self, id: ServiceId) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(SERVICES).map_err(map_err!(Table))?;
            existed = table.remove(id).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(service_id = id, existed, "service removed");
        Ok(existed)
    }

    /// Atomically read a service, let `decide` compute its next state, and
    /// write the result together with an optional changelog entry.
    ///
    /// `decide` runs inside the write transaction, so no other writer can
    /// touch the row between the read and the write. `id` and `created_at`
    /// of the returned row are pinned to the persisted values.
    pub fn record_check<F>(&self, id: ServiceId, decide: F) -> StateResult<RecordedCheck>
    where
        F: FnOnce(&Service) -> (Service, Option<ChangelogEntry>),
    {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;

        let previous: Service = {
            let table = txn.open_table(SERVICES).map_err(map_err!(Table))?;
            let guard = table
                .get(id)
                .map_err(map_err!(Read))?
                .ok_or(StateError::ServiceNotFound(id))?;
            decode(guard.value())?
        };

        let (mut current, changelog) = decide(&previous);
        current.id = previous.id;
        current.created_at = previous.created_at;
        put_service_in(&txn, &current)?;

        let changelog = match changelog {
            Some(mut entry) => {
                entry.service_id = id;
                append_changelog_in(&txn, &mut entry)?;
                Some(entry)
            }
            None => None,
        };

        txn.commit().map_err(map_err!(Transaction))?;
        Ok(RecordedCheck {
            previous,
            current,
            changelog,
        })
    }

    // ── Changelog ──────────────────────────────────────────────────

    /// Append a changelog entry, returning it with its assigned id.
    pub fn append_changelog(&self, entry: &ChangelogEntry) -> StateResult<ChangelogEntry> {
        let mut entry = entry.clone();
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        append_changelog_in(&txn, &mut entry)?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(entry)
    }

    /// List changelog entries with `changed_at >= since`, oldest first.
    pub fn list_changelog_since(&self, since: DateTime<Utc>) -> StateResult<Vec<ChangelogEntry>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(CHANGELOG).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let entry: ChangelogEntry = decode(value.value())?;
            if entry.changed_at >= since {
                results.push(entry);
            }
        }
        results.sort_by_key(|e| (e.changed_at, e.id));
        Ok(results)
    }
}

fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> StateResult<T> {
    serde_json::from_slice(bytes).map_err(map_err!(Deserialize))
}

fn put_service_in(txn: &WriteTransaction, service: &Service) -> StateResult<()> {
    let value = serde_json::to_vec(service).map_err(map_err!(Serialize))?;
    let mut table = txn.open_table(SERVICES).map_err(map_err!(Table))?;
    table
        .insert(service.id, value.as_slice())
        .map_err(map_err!(Write))?;
    Ok(())
}

fn append_changelog_in(txn: &WriteTransaction, entry: &mut ChangelogEntry) -> StateResult<()> {
    entry.id = next_id(txn, CHANGELOG_SEQUENCE)?;
    let value = serde_json::to_vec(entry).map_err(map_err!(Serialize))?;
    let mut table = txn.open_table(CHANGELOG).map_err(map_err!(Table))?;
    table
        .insert(entry.id, value.as_slice())
        .map_err(map_err!(Write))?;
    debug!(
        entry_id = entry.id,
        service_id = entry.service_id,
        previous = entry.previous_status,
        new = entry.new_status,
        "changelog entry appended"
    );
    Ok(())
}

/// Allocate the next id of a sequence (ids start at 1).
fn next_id(txn: &WriteTransaction, sequence: &str) -> StateResult<u64> {
    let mut table = txn.open_table(SEQUENCES).map_err(map_err!(Table))?;
    let last = table
        .get(sequence)
        .map_err(map_err!(Read))?
        .map(|guard| guard.value())
        .unwrap_or(0);
    let next = last + 1;
    table.insert(sequence, next).map_err(map_err!(Write))?;
    Ok(next)
}
