//! Client for the upstream location feed.
//!
//! The feed is a Firebase-RTDB-style REST endpoint serving one JSON document
//! of every tracked entity: a map from entity key to its raw location
//! reports, an optional legacy `livelocation`, and an optional geofence in a
//! pipe-delimited coordinate format.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::model::{AlertTag, EntitySnapshot, GeoPoint, Geofence, LocationReport};
use crate::resolver::{self, CoordField, TimestampField};

/// Upstream fetch timeout; the feed is a bounded-latency dependency.
const FETCH_TIMEOUT: Duration = Duration::from_secs(15);

/// Client for fetching the tracked-entity document.
#[derive(Clone)]
pub struct FeedClient {
    client: reqwest::Client,
    base_url: String,
}

impl FeedClient {
    /// Create a new feed client for the given database base URL.
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Fetch all tracked entities.
    ///
    /// A JSON `null` body (no entities yet) is an empty map, not an error.
    pub async fn fetch_entities(&self) -> anyhow::Result<HashMap<String, RawEntity>> {
        let url = format!("{}/elephants.json", self.base_url);

        let response = self.client.get(&url).timeout(FETCH_TIMEOUT).send().await?;
        let data = response
            .json::<Option<HashMap<String, RawEntity>>>()
            .await?;

        Ok(data.unwrap_or_default())
    }
}

/// A tracked entity exactly as the feed serves it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawEntity {
    /// Report-ID keyed raw location reports. Values are kept as raw JSON so
    /// one malformed report cannot poison the rest of the entity.
    #[serde(default)]
    pub locations: Option<HashMap<String, Value>>,
    /// Legacy directly-set position, used only when `locations` is
    /// absent or empty.
    #[serde(default)]
    pub livelocation: Option<RawLiveLocation>,
    #[serde(default)]
    pub geofence: Option<RawGeofence>,
}

/// Legacy flat position without report history.
#[derive(Debug, Clone, Deserialize)]
pub struct RawLiveLocation {
    #[serde(default, alias = "latitude")]
    pub lat: Option<CoordField>,
    #[serde(default, alias = "longitude")]
    pub lng: Option<CoordField>,
    #[serde(default)]
    pub timestamp: Option<TimestampField>,
}

impl RawLiveLocation {
    /// Convert to a canonical report, stamping `now` when the legacy record
    /// carries no timestamp of its own.
    fn to_report(&self, now: DateTime<Utc>) -> Option<LocationReport> {
        Some(LocationReport {
            latitude: self.lat.as_ref()?.as_f64()?,
            longitude: self.lng.as_ref()?.as_f64()?,
            timestamp: self
                .timestamp
                .as_ref()
                .and_then(TimestampField::parse)
                .unwrap_or(now),
            alert_tag: AlertTag::Routine,
        })
    }
}

/// A geofence exactly as the feed serves it.
#[derive(Debug, Clone, Deserialize)]
pub struct RawGeofence {
    #[serde(default)]
    pub coordinates: Option<String>,
    #[serde(default)]
    pub created_by: Option<String>,
    #[serde(default)]
    pub created_at: Option<TimestampField>,
}

impl RawGeofence {
    pub fn parse(&self) -> Result<Geofence, GeofenceParseError> {
        let raw = self
            .coordinates
            .as_deref()
            .ok_or(GeofenceParseError::MissingCoordinates)?;

        Ok(Geofence {
            vertices: parse_coordinates(raw)?,
            created_by: self.created_by.clone(),
            created_at: self.created_at.as_ref().and_then(TimestampField::parse),
        })
    }
}

/// Ways a wire-format geofence can be unusable.
#[derive(Debug, Error)]
pub enum GeofenceParseError {
    #[error("geofence has no coordinate string")]
    MissingCoordinates,
    #[error("invalid coordinate pair '{0}'")]
    InvalidPair(String),
    #[error("polygon needs at least 3 vertices, got {0}")]
    TooFewVertices(usize),
}

/// Parse the pipe-delimited `"lat,lng|lat,lng|..."` coordinate format.
///
/// A single trailing pipe is tolerated (the drawing tool appends one).
pub fn parse_coordinates(raw: &str) -> Result<Vec<GeoPoint>, GeofenceParseError> {
    let trimmed = raw.strip_suffix('|').unwrap_or(raw);

    let mut vertices = Vec::new();
    for pair in trimmed.split('|') {
        let invalid = || GeofenceParseError::InvalidPair(pair.to_string());

        let (lat, lng) = pair.split_once(',').ok_or_else(invalid)?;
        vertices.push(GeoPoint {
            latitude: lat.trim().parse().map_err(|_| invalid())?,
            longitude: lng.trim().parse().map_err(|_| invalid())?,
        });
    }

    if vertices.len() < 3 {
        return Err(GeofenceParseError::TooFewVertices(vertices.len()));
    }

    Ok(vertices)
}

impl RawEntity {
    /// Resolve this entity into the immutable view the engines evaluate.
    ///
    /// The latest valid report wins; the legacy `livelocation` is consulted
    /// only when the report map is absent or empty, with `now` substituted
    /// for its missing timestamp. Returns `None` when no position can be
    /// resolved at all. An unparseable geofence is logged and treated as no
    /// geofence assigned.
    pub fn snapshot(&self, id: &str, now: DateTime<Utc>) -> Option<EntitySnapshot> {
        let location = match &self.locations {
            Some(reports) if !reports.is_empty() => resolver::resolve_latest(reports.values()),
            _ => self.livelocation.as_ref().and_then(|live| live.to_report(now)),
        }?;

        let geofence = self.geofence.as_ref().and_then(|raw| match raw.parse() {
            Ok(fence) => Some(fence),
            Err(error) => {
                warn!(entity = id, %error, "ignoring unparseable geofence");
                None
            }
        });

        Some(EntitySnapshot {
            id: id.to_string(),
            location,
            geofence,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn at(seconds: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(seconds, 0).unwrap()
    }

    #[test]
    fn test_parse_coordinates_trailing_pipe() {
        let vertices = parse_coordinates("6.5,80.1|6.6,80.2|6.7,80.0|").unwrap();
        assert_eq!(vertices.len(), 3);
        assert_eq!(vertices[0].latitude, 6.5);
        assert_eq!(vertices[2].longitude, 80.0);
    }

    #[test]
    fn test_parse_coordinates_without_trailing_pipe() {
        let vertices = parse_coordinates("0,0|0,1|1,1|1,0").unwrap();
        assert_eq!(vertices.len(), 4);
    }

    #[test]
    fn test_parse_coordinates_rejects_malformed() {
        assert!(matches!(
            parse_coordinates("6.5|6.6,80.2|6.7,80.0"),
            Err(GeofenceParseError::InvalidPair(_))
        ));
        assert!(matches!(
            parse_coordinates("a,b|6.6,80.2|6.7,80.0"),
            Err(GeofenceParseError::InvalidPair(_))
        ));
        assert!(matches!(
            parse_coordinates("6.5,80.1|6.6,80.2|"),
            Err(GeofenceParseError::TooFewVertices(2))
        ));
    }

    #[test]
    fn test_snapshot_resolves_latest_report() {
        let entity: RawEntity = serde_json::from_value(json!({
            "locations": {
                "r1": {"lat": 1, "lng": 1, "timestamp": "2024-01-01T00:00:00Z"},
                "r2": {"lat": 2, "lng": 2, "timestamp": "2024-01-02T00:00:00Z"}
            }
        }))
        .unwrap();

        let snapshot = entity.snapshot("dumbo", at(0)).unwrap();
        assert_eq!(snapshot.location.latitude, 2.0);
        assert!(snapshot.geofence.is_none());
    }

    #[test]
    fn test_snapshot_falls_back_to_livelocation() {
        let entity: RawEntity = serde_json::from_value(json!({
            "livelocation": {"lat": "6.5", "lng": "80.1"}
        }))
        .unwrap();

        let now = at(1_700_000_000);
        let snapshot = entity.snapshot("dumbo", now).unwrap();
        assert_eq!(snapshot.location.latitude, 6.5);
        // The legacy record has no timestamp; the caller's clock stands in.
        assert_eq!(snapshot.location.timestamp, now);
    }

    #[test]
    fn test_snapshot_prefers_reports_over_livelocation() {
        let entity: RawEntity = serde_json::from_value(json!({
            "locations": {
                "r1": {"lat": 1, "lng": 1, "timestamp": "2024-01-01T00:00:00Z"}
            },
            "livelocation": {"lat": 9, "lng": 9}
        }))
        .unwrap();

        let snapshot = entity.snapshot("dumbo", at(0)).unwrap();
        assert_eq!(snapshot.location.latitude, 1.0);
    }

    #[test]
    fn test_snapshot_none_when_nothing_resolvable() {
        let entity: RawEntity = serde_json::from_value(json!({
            "locations": {"r1": {"lat": 1}}
        }))
        .unwrap();
        assert!(entity.snapshot("dumbo", at(0)).is_none());

        let empty = RawEntity::default();
        assert!(empty.snapshot("dumbo", at(0)).is_none());
    }

    #[test]
    fn test_snapshot_carries_parsed_geofence() {
        let entity: RawEntity = serde_json::from_value(json!({
            "locations": {
                "r1": {"lat": 1, "lng": 1, "timestamp": "2024-01-01T00:00:00Z"}
            },
            "geofence": {
                "coordinates": "0,0|0,2|2,2|2,0|",
                "created_by": "ranger-1",
                "created_at": 1704067200000i64
            }
        }))
        .unwrap();

        let snapshot = entity.snapshot("dumbo", at(0)).unwrap();
        let fence = snapshot.geofence.unwrap();
        assert_eq!(fence.vertices.len(), 4);
        assert_eq!(fence.created_by.as_deref(), Some("ranger-1"));
        assert!(fence.created_at.is_some());
    }

    #[test]
    fn test_snapshot_drops_unparseable_geofence() {
        let entity: RawEntity = serde_json::from_value(json!({
            "locations": {
                "r1": {"lat": 1, "lng": 1, "timestamp": "2024-01-01T00:00:00Z"}
            },
            "geofence": {"coordinates": "not|a|polygon"}
        }))
        .unwrap();

        let snapshot = entity.snapshot("dumbo", at(0)).unwrap();
        assert!(snapshot.geofence.is_none());
    }
}
