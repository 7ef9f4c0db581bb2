//! In-memory alert suppression state.
//!
//! Tracks when each (subscriber, entity) pair was last alerted and which side
//! of its geofence each entity was last seen on. The store is owned by the
//! scheduler and passed into each engine call; every method takes an explicit
//! `now` so tests can drive the clock deterministically.
//!
//! State lives for the process lifetime only. After a restart the first pass
//! re-seeds from scratch, which can replay "first observation" alerts.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};

/// Cooldown timestamps and geofence inside/outside state.
///
/// Bounded by subscriber x entity cardinality, so no eviction is needed.
#[derive(Debug, Default)]
pub struct AlertStore {
    last_alerts: HashMap<String, DateTime<Utc>>,
    inside: HashMap<String, bool>,
}

impl AlertStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `key` was alerted less than `window` ago.
    pub fn in_cooldown(&self, key: &str, window: Duration, now: DateTime<Utc>) -> bool {
        self.last_alerts
            .get(key)
            .is_some_and(|last| now - *last < window)
    }

    /// Record that an alert for `key` was emitted at `now`.
    pub fn mark_alerted(&mut self, key: &str, now: DateTime<Utc>) {
        self.last_alerts.insert(key.to_string(), now);
    }

    /// Last known geofence side for an entity; `None` until first evaluated.
    pub fn inside_state(&self, entity_id: &str) -> Option<bool> {
        self.inside.get(entity_id).copied()
    }

    pub fn set_inside_state(&mut self, entity_id: &str, inside: bool) {
        self.inside.insert(entity_id.to_string(), inside);
    }

    /// Number of keys currently carrying a cooldown timestamp.
    pub fn cooldown_count(&self) -> usize {
        self.last_alerts.len()
    }

    /// Composite key for a (subscriber, entity) proximity cooldown.
    pub fn proximity_key(subscriber_id: &str, entity_id: &str) -> String {
        format!("{subscriber_id}_{entity_id}")
    }

    /// Composite key for a per-entity running-alert cooldown.
    pub fn running_key(entity_id: &str) -> String {
        format!("running_{entity_id}")
    }
}
