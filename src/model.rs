//! Data models for TrunkLink.
//!
//! The canonical domain types shared across the alerting pipeline: resolved
//! location reports, geofences, subscribers, the alert events emitted by the
//! evaluation engines, and the payload shape delivered to the push channel.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

/// Movement classification attached to a location report by the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AlertTag {
    /// Ordinary scheduled position update.
    #[default]
    Routine,
    /// The tracker flagged an anomalous movement pattern.
    Running,
}

impl AlertTag {
    /// Map the wire-level `alert_type` string onto a tag.
    ///
    /// Anything other than the literal running marker (including a missing
    /// field) is treated as a routine update.
    pub fn from_wire(value: Option<&str>) -> Self {
        match value {
            Some("running_detected") => AlertTag::Running,
            _ => AlertTag::Routine,
        }
    }
}

/// One timestamped, fully normalized location observation.
///
/// Produced by the resolver from raw wire reports; anything missing a
/// coordinate or timestamp never becomes a `LocationReport`.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationReport {
    pub latitude: f64,
    pub longitude: f64,
    pub timestamp: DateTime<Utc>,
    pub alert_tag: AlertTag,
}

impl LocationReport {
    /// The position of this report as a point.
    pub fn point(&self) -> GeoPoint {
        GeoPoint {
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }
}

/// A polygon boundary assigned to a tracked entity.
///
/// Vertices form a closed ring; the final edge back to the first vertex is
/// implicit. Provenance is carried along so ranger alerts can name who drew
/// the boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct Geofence {
    pub vertices: Vec<GeoPoint>,
    pub created_by: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

/// A tracked entity with its latest resolved position.
///
/// This is the immutable per-pass view the engines evaluate: one entity key,
/// one authoritative location, and the assigned geofence if any.
#[derive(Debug, Clone)]
pub struct EntitySnapshot {
    pub id: String,
    pub location: LocationReport,
    pub geofence: Option<Geofence>,
}

/// A web-push subscription as handed to us by the client.
///
/// Only the endpoint is interpreted (it is the subscriber's natural key);
/// encryption keys and any other fields ride along opaquely for the push
/// transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushSubscription {
    pub endpoint: String,
    #[serde(flatten)]
    pub details: serde_json::Map<String, Value>,
}

/// A registered alert recipient.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscriber {
    pub subscription: PushSubscription,
    /// Last reported position. No proximity alerts are evaluated until set.
    pub location: Option<GeoPoint>,
    /// Arbitrary contact metadata supplied at subscribe time.
    pub contact: Value,
    pub subscribed_at: DateTime<Utc>,
}

impl Subscriber {
    /// The push-destination handle identifying this subscriber.
    pub fn endpoint(&self) -> &str {
        &self.subscription.endpoint
    }
}

/// Emitted when a tracked entity comes within the alert radius of a
/// subscriber.
#[derive(Debug, Clone, PartialEq)]
pub struct ProximityAlert {
    /// Destination handle of the subscriber to notify.
    pub subscriber_id: String,
    pub entity_id: String,
    pub distance_km: f64,
    pub location: GeoPoint,
}

/// Direction of a geofence state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeofenceEvent {
    /// The entity left its polygon.
    Breach,
    /// The entity came back inside.
    Return,
}

impl GeofenceEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            GeofenceEvent::Breach => "breach",
            GeofenceEvent::Return => "return",
        }
    }
}

impl std::fmt::Display for GeofenceEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Emitted when an entity crosses its geofence boundary in either direction.
#[derive(Debug, Clone, PartialEq)]
pub struct GeofenceAlert {
    pub entity_id: String,
    pub event: GeofenceEvent,
    pub location: GeoPoint,
    /// Who drew the breached boundary, when known.
    pub created_by: Option<String>,
}

/// Emitted when an entity's latest report is tagged as running.
#[derive(Debug, Clone, PartialEq)]
pub struct RunningAlert {
    pub entity_id: String,
    pub location: GeoPoint,
    pub timestamp: DateTime<Utc>,
}

/// The JSON document handed to the push channel for every notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub title: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<NotificationData>,
}

/// Structured alert context carried alongside the human-readable copy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationData {
    #[serde(rename = "elephantId", skip_serializing_if = "Option::is_none")]
    pub elephant_id: Option<String>,
    /// Distance in km, formatted to two decimals.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alert_tag_from_wire() {
        assert_eq!(
            AlertTag::from_wire(Some("running_detected")),
            AlertTag::Running
        );
        assert_eq!(
            AlertTag::from_wire(Some("routine_update")),
            AlertTag::Routine
        );
        assert_eq!(AlertTag::from_wire(Some("unknown")), AlertTag::Routine);
        assert_eq!(AlertTag::from_wire(None), AlertTag::Routine);
    }

    #[test]
    fn test_notification_payload_serialization() {
        let payload = NotificationPayload {
            title: "title".to_string(),
            body: "body".to_string(),
            data: Some(NotificationData {
                elephant_id: Some("dumbo".to_string()),
                distance: Some("3.14".to_string()),
                timestamp: "2024-01-01T00:00:00Z".parse().unwrap(),
            }),
        };

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["data"]["elephantId"], "dumbo");
        assert_eq!(json["data"]["distance"], "3.14");
    }

    #[test]
    fn test_notification_payload_omits_empty_data() {
        let payload = NotificationPayload {
            title: "title".to_string(),
            body: "body".to_string(),
            data: None,
        };

        let json = serde_json::to_value(&payload).unwrap();
        assert!(json.get("data").is_none());
    }

    #[test]
    fn test_push_subscription_keeps_opaque_fields() {
        let raw = serde_json::json!({
            "endpoint": "https://push.example/abc",
            "keys": {"p256dh": "pk", "auth": "ak"}
        });

        let subscription: PushSubscription = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(subscription.endpoint, "https://push.example/abc");
        assert_eq!(serde_json::to_value(&subscription).unwrap(), raw);
    }
}
