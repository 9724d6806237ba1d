use crate::codec::PersistenceCodec;
use crate::error::{Result, StoreError};
use crate::query::Query;
use crate::table::AlertTable;
use chrono::{Duration, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing;
use vigil_common::types::{Alert, AlertFields, AlertLevel};

/// Tunables for [`AlertStore::open`].
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// How long closed alerts are retained before eviction removes them.
    pub retention: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            retention: Duration::days(7),
        }
    }
}

/// The public operation surface over the alert table.
///
/// Owns the table behind a mutex and the persistence codec. Every
/// operation takes the lock for its whole logical effect, so callers on
/// the event-delivery path, the eviction timer, and management surfaces
/// never observe a table mid-mutation. Flushes serialize behind their
/// own lock and snapshot the table just before writing, so the last
/// write always carries the newest state; the table lock is only held
/// for the snapshot, never for the file I/O.
///
/// The in-memory table is authoritative: a mutating operation that
/// cannot flush still completes, and the failed flush is logged as a
/// warning. Only [`AlertStore::flush`] and [`AlertStore::open`] surface
/// persistence errors.
pub struct AlertStore {
    table: Mutex<AlertTable>,
    flush_lock: Mutex<()>,
    codec: PersistenceCodec,
    retention: Duration,
}

impl AlertStore {
    /// Load the persisted table from `<data_dir>/alerter.db` and build
    /// the store around it. Corrupt lines are skipped; entries that would
    /// duplicate a uuid or an open dedup key are dropped with a warning.
    pub fn open(data_dir: &Path, options: StoreOptions) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let codec = PersistenceCodec::new(data_dir.join("alerter.db"));
        let loaded = codec.load()?;

        let mut table = AlertTable::new();
        let mut dropped = 0;
        for alert in loaded.alerts {
            if !table.insert_loaded(alert) {
                dropped += 1;
            }
        }
        if dropped > 0 {
            tracing::warn!(
                path = %codec.path().display(),
                dropped,
                "Dropped persisted alerts that duplicated a uuid or open condition"
            );
        }
        tracing::info!(
            path = %codec.path().display(),
            alerts = table.len(),
            "Alert store loaded"
        );

        Ok(Self {
            table: Mutex::new(table),
            flush_lock: Mutex::new(()),
            codec,
            retention: options.retention,
        })
    }

    /// Lock the table, recovering from a poisoned mutex if necessary.
    fn lock_table(&self) -> MutexGuard<'_, AlertTable> {
        self.table
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Apply one alert-shaped event.
    ///
    /// Returns the affected alert's uuid, or `Ok(None)` when a recovery
    /// arrived for a condition with no open alert (ignored, nothing
    /// persisted). Events missing level/attribute/pattern are rejected
    /// with [`StoreError::InvalidAlertFields`] and dropped.
    pub fn store(&self, event: &HashMap<String, Value>) -> Result<Option<String>> {
        let fields = AlertFields::from_properties(event).map_err(|missing| {
            tracing::warn!(missing, "Dropping alert event with missing fields");
            StoreError::InvalidAlertFields { missing }
        })?;

        let outcome = self.lock_table().upsert(fields, Utc::now());
        let uuid = outcome.uuid().map(str::to_string);
        if uuid.is_some() {
            self.flush_best_effort();
        }
        Ok(uuid)
    }

    /// Snapshot of all alerts.
    pub fn list(&self) -> Vec<Alert> {
        self.lock_table().get_all()
    }

    /// Alerts matching the query. An empty query matches everything; a
    /// malformed one matches nothing.
    pub fn query(&self, q: &str) -> Vec<Alert> {
        let query = Query::parse(q);
        let mut matched: Vec<Alert> = self
            .lock_table()
            .get_all()
            .into_iter()
            .filter(|a| query.matches(a))
            .collect();
        matched.sort_by(|a, b| a.first_seen.cmp(&b.first_seen));
        matched
    }

    /// Tag matching alerts with the responsible rule's name.
    pub fn flag(&self, q: &str, rule_name: &str) -> usize {
        let query = Query::parse(q);
        let count = self.lock_table().set_flag(|a| query.matches(a), rule_name);
        if count > 0 {
            self.flush_best_effort();
        }
        count
    }

    /// Remove matching alerts. Commonly called with `uuid:<value>`.
    pub fn delete(&self, q: &str) -> usize {
        let query = Query::parse(q);
        let removed = self.lock_table().remove_where(|a| query.matches(a));
        if !removed.is_empty() {
            self.flush_best_effort();
        }
        removed.len()
    }

    /// Remove all closed alerts regardless of age.
    pub fn cleanup(&self) -> usize {
        let removed = self.lock_table().remove_where(|a| a.back_to_normal);
        if !removed.is_empty() {
            tracing::info!(removed = removed.len(), "Cleaned up recovered alerts");
            self.flush_best_effort();
        }
        removed.len()
    }

    /// Remove closed alerts last seen strictly before the retention
    /// cutoff. Open alerts are never evicted.
    pub fn evict(&self) -> usize {
        let cutoff = Utc::now() - self.retention;
        let removed = self.lock_table().evict_older_than(cutoff);
        if !removed.is_empty() {
            tracing::info!(
                removed = removed.len(),
                cutoff = %cutoff,
                "Evicted recovered alerts past retention"
            );
            self.flush_best_effort();
        }
        removed.len()
    }

    /// Legacy probe: is an open alert known for this attribute and level?
    pub fn known(&self, attribute: &str, level: AlertLevel) -> bool {
        self.lock_table().known(attribute, level)
    }

    /// All known alert uuids, for operator-facing completion. Never
    /// fails; a store in trouble completes to nothing.
    pub fn known_uuids(&self) -> Vec<String> {
        self.list().into_iter().map(|a| a.uuid).collect()
    }

    /// Persist the current table state. Used at shutdown; mutating
    /// operations flush on their own best-effort.
    pub fn flush(&self) -> Result<()> {
        let _write = self
            .flush_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // Snapshot under the flush lock: whoever writes last wrote the
        // newest state, and the table lock is released before the I/O.
        let snapshot = self.lock_table().get_all();
        self.codec.flush(&snapshot)
    }

    fn flush_best_effort(&self) {
        if let Err(e) = self.flush() {
            tracing::warn!(error = %e, "Alert store flush failed, in-memory state is ahead of disk");
        }
    }
}
