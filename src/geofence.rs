//! Geofence breach detection and running-pattern alerts.

use chrono::{DateTime, Duration, Utc};

use crate::geo;
use crate::model::{AlertTag, EntitySnapshot, GeofenceAlert, GeofenceEvent, RunningAlert};
use crate::state::AlertStore;

/// Minimum gap between running alerts for the same entity, in milliseconds.
pub const RUNNING_COOLDOWN_MS: i64 = 5 * 60 * 1000;

/// Evaluate geofence membership for every entity with an assigned polygon.
///
/// Per-entity state machine over {unknown, inside, outside}:
/// - unknown -> inside: record state, stay silent
/// - unknown -> outside: record state and emit a breach (an entity whose
///   first observed position is already outside alerts immediately)
/// - inside -> outside: breach
/// - outside -> inside: return
/// - no transition: no alert
///
/// Entities without a geofence are not evaluated at all.
pub fn evaluate(entities: &[EntitySnapshot], store: &mut AlertStore) -> Vec<GeofenceAlert> {
    let mut alerts = Vec::new();

    for entity in entities {
        let Some(fence) = &entity.geofence else {
            continue;
        };

        let is_inside = geo::point_in_polygon(entity.location.point(), &fence.vertices);

        let event = match store.inside_state(&entity.id) {
            Some(true) if !is_inside => Some(GeofenceEvent::Breach),
            Some(false) if is_inside => Some(GeofenceEvent::Return),
            Some(_) => None,
            None if !is_inside => Some(GeofenceEvent::Breach),
            None => None,
        };

        store.set_inside_state(&entity.id, is_inside);

        if let Some(event) = event {
            alerts.push(GeofenceAlert {
                entity_id: entity.id.clone(),
                event,
                location: entity.location.point(),
                created_by: fence.created_by.clone(),
            });
        }
    }

    alerts
}

/// Emit a running alert for every entity whose latest report carries the
/// running tag, at most once per entity per cooldown window.
///
/// Independent of geofence state; an entity needs no polygon to be flagged.
pub fn detect_running(
    entities: &[EntitySnapshot],
    store: &mut AlertStore,
    now: DateTime<Utc>,
) -> Vec<RunningAlert> {
    let window = Duration::milliseconds(RUNNING_COOLDOWN_MS);
    let mut alerts = Vec::new();

    for entity in entities {
        if entity.location.alert_tag != AlertTag::Running {
            continue;
        }

        let key = AlertStore::running_key(&entity.id);
        if store.in_cooldown(&key, window, now) {
            continue;
        }

        store.mark_alerted(&key, now);
        alerts.push(RunningAlert {
            entity_id: entity.id.clone(),
            location: entity.location.point(),
            timestamp: entity.location.timestamp,
        });
    }

    alerts
}
