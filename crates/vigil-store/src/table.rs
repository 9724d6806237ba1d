use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing;
use vigil_common::types::{Alert, AlertFields, AlertLevel};

/// Key: (attribute, pattern, level)
type DedupKey = (String, String, AlertLevel);

/// In-memory indexed collection of alerts.
///
/// Keyed primarily by `uuid` for direct lookup and secondarily by dedup
/// key for the upsert path. Invariant: at most one open
/// (`back_to_normal == false`) alert exists per dedup key; `open_index`
/// tracks exactly the open alerts.
#[derive(Default)]
pub struct AlertTable {
    alerts: HashMap<String, Alert>,
    open_index: HashMap<DedupKey, String>,
}

/// Outcome of [`AlertTable::upsert`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Upsert {
    /// A new open alert was created.
    Created(String),
    /// An existing open alert was refreshed or closed in place.
    Updated(String),
    /// A recovery arrived with nothing open for its key; dropped so that
    /// repeated below-threshold evaluations cannot grow the table.
    RedundantRecovery,
}

impl Upsert {
    /// The affected alert's uuid, if any alert was touched.
    pub fn uuid(&self) -> Option<&str> {
        match self {
            Upsert::Created(uuid) | Upsert::Updated(uuid) => Some(uuid),
            Upsert::RedundantRecovery => None,
        }
    }
}

impl AlertTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.alerts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }

    /// Apply the dedup/recovery algorithm to one validated event.
    ///
    /// A firing refreshes the open alert for its key in place, or creates
    /// one when none exists. A recovery closes the open alert for its
    /// key, or is ignored when nothing was open.
    pub fn upsert(&mut self, fields: AlertFields, now: DateTime<Utc>) -> Upsert {
        let key = (fields.attribute.clone(), fields.pattern.clone(), fields.level);
        let open_uuid = self.open_index.get(&key).cloned();

        if fields.back_to_normal {
            let Some(uuid) = open_uuid else {
                tracing::debug!(
                    attribute = %fields.attribute,
                    pattern = %fields.pattern,
                    level = %fields.level,
                    "Recovery for a condition with no open alert, ignored"
                );
                return Upsert::RedundantRecovery;
            };
            // Transition: open -> closed.
            if let Some(alert) = self.alerts.get_mut(&uuid) {
                alert.back_to_normal = true;
                alert.last_seen = now;
                alert.properties = fields.properties;
            }
            self.open_index.remove(&key);
            return Upsert::Updated(uuid);
        }

        if let Some(uuid) = open_uuid {
            // Repeated firing of the same condition: refresh, never duplicate.
            if let Some(alert) = self.alerts.get_mut(&uuid) {
                alert.last_seen = now;
                alert.properties = fields.properties;
            }
            return Upsert::Updated(uuid);
        }

        let uuid = uuid::Uuid::new_v4().to_string();
        let alert = Alert {
            uuid: uuid.clone(),
            level: fields.level,
            attribute: fields.attribute,
            pattern: fields.pattern,
            back_to_normal: false,
            rule_name: None,
            first_seen: now,
            last_seen: now,
            properties: fields.properties,
        };
        self.open_index.insert(key, uuid.clone());
        self.alerts.insert(uuid.clone(), alert);
        Upsert::Created(uuid)
    }

    /// Insert an alert reloaded from persistence, preserving its uuid.
    /// Returns false when the alert would violate the one-open-alert
    /// invariant or collide on uuid; the caller skips such entries.
    pub fn insert_loaded(&mut self, alert: Alert) -> bool {
        if self.alerts.contains_key(&alert.uuid) {
            return false;
        }
        if !alert.back_to_normal {
            let key = alert.dedup_key();
            if self.open_index.contains_key(&key) {
                return false;
            }
            self.open_index.insert(key, alert.uuid.clone());
        }
        self.alerts.insert(alert.uuid.clone(), alert);
        true
    }

    /// Snapshot of all alerts. Order is not significant.
    pub fn get_all(&self) -> Vec<Alert> {
        self.alerts.values().cloned().collect()
    }

    /// Remove and return all alerts satisfying `predicate`.
    pub fn remove_where<F>(&mut self, predicate: F) -> Vec<Alert>
    where
        F: Fn(&Alert) -> bool,
    {
        let uuids: Vec<String> = self
            .alerts
            .values()
            .filter(|a| predicate(a))
            .map(|a| a.uuid.clone())
            .collect();
        let mut removed = Vec::with_capacity(uuids.len());
        for uuid in uuids {
            if let Some(alert) = self.alerts.remove(&uuid) {
                if !alert.back_to_normal {
                    self.open_index.remove(&alert.dedup_key());
                }
                removed.push(alert);
            }
        }
        removed
    }

    /// Remove closed alerts whose `last_seen` is strictly older than
    /// `cutoff`. An alert exactly at the cutoff stays; open alerts are
    /// never touched regardless of age.
    pub fn evict_older_than(&mut self, cutoff: DateTime<Utc>) -> Vec<Alert> {
        self.remove_where(|a| a.back_to_normal && a.last_seen < cutoff)
    }

    /// Set `rule_name` on all alerts satisfying `predicate`. Returns the
    /// number of alerts touched; zero matches is not an error.
    pub fn set_flag<F>(&mut self, predicate: F, rule_name: &str) -> usize
    where
        F: Fn(&Alert) -> bool,
    {
        let mut count = 0;
        for alert in self.alerts.values_mut() {
            if predicate(alert) {
                alert.rule_name = Some(rule_name.to_string());
                count += 1;
            }
        }
        count
    }

    /// Legacy reduced-form probe: is any alert open for this attribute
    /// and level, whatever its pattern?
    pub fn known(&self, attribute: &str, level: AlertLevel) -> bool {
        self.open_index
            .keys()
            .any(|(attr, _, lvl)| attr == attribute && *lvl == level)
    }
}
