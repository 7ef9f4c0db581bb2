//! Proximity evaluation: which subscribers are near which entities.

use chrono::{DateTime, Duration, Utc};

use crate::geo;
use crate::model::{EntitySnapshot, ProximityAlert, Subscriber};
use crate::state::AlertStore;

/// Default alert radius in kilometers.
pub const DEFAULT_RADIUS_KM: f64 = 5.0;

/// Default per-(subscriber, entity) cooldown in milliseconds.
pub const DEFAULT_COOLDOWN_MS: i64 = 5 * 60 * 1000;

/// Evaluate every subscriber with a known location against every entity.
///
/// An alert is emitted when the distance is within `radius_km` and the
/// (subscriber, entity) pair is not in cooldown. The cooldown is marked at
/// emission, so a pair alerts at most once per window; leaving and re-entering
/// the radius before the window expires stays suppressed. Subscribers without
/// a location contribute nothing.
pub fn evaluate(
    subscribers: &[Subscriber],
    entities: &[EntitySnapshot],
    radius_km: f64,
    cooldown: Duration,
    store: &mut AlertStore,
    now: DateTime<Utc>,
) -> Vec<ProximityAlert> {
    let mut alerts = Vec::new();

    for subscriber in subscribers {
        let Some(location) = subscriber.location else {
            continue;
        };

        for entity in entities {
            let distance_km = geo::distance_km(
                location.latitude,
                location.longitude,
                entity.location.latitude,
                entity.location.longitude,
            );

            if distance_km > radius_km {
                continue;
            }

            let key = AlertStore::proximity_key(subscriber.endpoint(), &entity.id);
            if store.in_cooldown(&key, cooldown, now) {
                continue;
            }

            store.mark_alerted(&key, now);
            alerts.push(ProximityAlert {
                subscriber_id: subscriber.endpoint().to_string(),
                entity_id: entity.id.clone(),
                distance_km,
                location: entity.location.point(),
            });
        }
    }

    alerts
}
