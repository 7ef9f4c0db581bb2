//! Notification formatting and delivery fan-out.
//!
//! Proximity alerts go to the single subscriber that triggered them; geofence
//! and running alerts are broadcast to every registered destination. Each
//! delivery is attempted in isolation: one destination failing (or being
//! gone) never blocks the rest of the batch. Destinations that report
//! permanent failure are dropped from the registry.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::model::{
    GeofenceAlert, GeofenceEvent, NotificationData, NotificationPayload, ProximityAlert,
    RunningAlert,
};
use crate::push::{PushChannel, PushError};
use crate::registry::Registry;

/// Tally of a delivery batch.
#[derive(Debug, Clone, Copy, Default)]
pub struct BroadcastOutcome {
    pub attempted: usize,
    pub delivered: usize,
    /// Destinations removed after reporting permanent failure.
    pub removed: usize,
}

/// Delivers formatted alerts through the push channel.
pub struct Dispatcher {
    channel: Arc<dyn PushChannel>,
    registry: Registry,
}

impl Dispatcher {
    pub fn new(channel: Arc<dyn PushChannel>, registry: Registry) -> Self {
        Self { channel, registry }
    }

    /// Deliver a batch of proximity alerts, each to its own subscriber.
    ///
    /// Returns the number of successful deliveries.
    pub async fn send_proximity_batch(
        &self,
        alerts: &[ProximityAlert],
        now: DateTime<Utc>,
    ) -> usize {
        let mut tasks = JoinSet::new();

        for alert in alerts {
            let channel = Arc::clone(&self.channel);
            let destination = alert.subscriber_id.clone();
            let payload = proximity_payload(alert, now);

            tasks.spawn(async move {
                let result = channel.deliver(&destination, &payload).await;
                (destination, payload, result)
            });
        }

        self.collect(tasks).await.delivered
    }

    /// Deliver one payload to every destination.
    pub async fn broadcast(
        &self,
        payload: &NotificationPayload,
        destinations: Vec<String>,
    ) -> BroadcastOutcome {
        let mut tasks = JoinSet::new();

        for destination in destinations {
            let channel = Arc::clone(&self.channel);
            let payload = payload.clone();

            tasks.spawn(async move {
                let result = channel.deliver(&destination, &payload).await;
                (destination, payload, result)
            });
        }

        self.collect(tasks).await
    }

    async fn collect(
        &self,
        mut tasks: JoinSet<(String, NotificationPayload, Result<(), PushError>)>,
    ) -> BroadcastOutcome {
        let mut outcome = BroadcastOutcome::default();

        while let Some(joined) = tasks.join_next().await {
            let Ok((destination, payload, result)) = joined else {
                warn!("delivery task panicked");
                continue;
            };

            outcome.attempted += 1;
            match result {
                Ok(()) => {
                    outcome.delivered += 1;
                    info!(destination = %destination, title = %payload.title, "push sent");
                }
                Err(PushError::Gone) => {
                    warn!(destination = %destination, "destination gone, removing subscriber");
                    match self.registry.remove(&destination).await {
                        Ok(true) => outcome.removed += 1,
                        Ok(false) => {}
                        Err(error) => {
                            warn!(destination = %destination, %error, "failed to remove subscriber")
                        }
                    }
                }
                Err(error) => {
                    warn!(destination = %destination, %error, "push delivery failed");
                }
            }
        }

        outcome
    }
}

/// Payload for a targeted proximity alert, distance included.
pub fn proximity_payload(alert: &ProximityAlert, now: DateTime<Utc>) -> NotificationPayload {
    NotificationPayload {
        title: "🚨 Elephant Within Perimeter".to_string(),
        body: format!(
            "An elephant is {:.2}km away from your location. Seek shelter and stay safe!",
            alert.distance_km
        ),
        data: Some(NotificationData {
            elephant_id: Some(alert.entity_id.clone()),
            distance: Some(format!("{:.2}", alert.distance_km)),
            timestamp: now,
        }),
    }
}

/// Broadcast variant of the proximity alert, without a per-subscriber
/// distance.
pub fn proximity_broadcast_payload(now: DateTime<Utc>) -> NotificationPayload {
    NotificationPayload {
        title: "🚨 Elephant Within Perimeter".to_string(),
        body: "Elephant Within Perimeter. Seek Shelter and Stay Safe!".to_string(),
        data: Some(NotificationData {
            elephant_id: None,
            distance: None,
            timestamp: now,
        }),
    }
}

/// Payload for a geofence breach or re-entry, broadcast to all destinations.
pub fn geofence_payload(alert: &GeofenceAlert, now: DateTime<Utc>) -> NotificationPayload {
    let (title, body) = match alert.event {
        GeofenceEvent::Breach => (
            format!("🚨 GEOFENCE BREACH: {}", alert.entity_id),
            format!(
                "{} has crossed the geofence boundary! Immediate action required.",
                alert.entity_id
            ),
        ),
        GeofenceEvent::Return => (
            format!("✅ {} Re-entered Geofence", alert.entity_id),
            format!(
                "{} has returned inside the geofence boundary.",
                alert.entity_id
            ),
        ),
    };

    NotificationPayload {
        title,
        body,
        data: Some(NotificationData {
            elephant_id: Some(alert.entity_id.clone()),
            distance: None,
            timestamp: now,
        }),
    }
}

/// Payload for a running-pattern alert, broadcast to all destinations.
pub fn running_payload(alert: &RunningAlert) -> NotificationPayload {
    NotificationPayload {
        title: format!("🏃 RUNNING DETECTED: {}", alert.entity_id),
        body: format!(
            "{} is running! Possible agitation or threat. Check dashboard immediately.",
            alert.entity_id
        ),
        data: Some(NotificationData {
            elephant_id: Some(alert.entity_id.clone()),
            distance: None,
            timestamp: alert.timestamp,
        }),
    }
}
