//! Normalization of raw location reports into canonical [`LocationReport`]s.
//!
//! Tracker uplinks arrive in several shapes depending on the ingestion path:
//! flat objects, objects nested under `uplink_message.decoded_payload`,
//! coordinates under `latitude`/`longitude` or `lat`/`lng`, and numerics
//! quoted as strings. This module folds all of them into one canonical type
//! and selects the single latest authoritative position; ambiguity never
//! leaks past it.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::model::{AlertTag, LocationReport};

/// A location report as it appears on the wire, before normalization.
#[derive(Debug, Clone, Deserialize)]
pub struct RawReport {
    #[serde(default, alias = "lat")]
    pub latitude: Option<CoordField>,
    #[serde(default, alias = "lng")]
    pub longitude: Option<CoordField>,
    #[serde(default)]
    pub timestamp: Option<TimestampField>,
    #[serde(default)]
    pub alert_type: Option<String>,
    /// Transport envelope used by LoRaWAN uplinks.
    #[serde(default)]
    pub uplink_message: Option<UplinkMessage>,
}

/// The envelope some reports are wrapped in.
#[derive(Debug, Clone, Deserialize)]
pub struct UplinkMessage {
    #[serde(default)]
    pub decoded_payload: Option<Box<RawReport>>,
}

/// A coordinate that may arrive as a number or a quoted string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CoordField {
    Number(f64),
    Text(String),
}

impl CoordField {
    /// Coerce to a float, stripping stray quote characters from string
    /// values.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CoordField::Number(n) => Some(*n),
            CoordField::Text(s) => s.replace('"', "").trim().parse().ok(),
        }
    }
}

/// A timestamp that may arrive as epoch milliseconds or an RFC 3339 string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TimestampField {
    Millis(i64),
    Text(String),
}

impl TimestampField {
    pub fn parse(&self) -> Option<DateTime<Utc>> {
        match self {
            TimestampField::Millis(ms) => DateTime::from_timestamp_millis(*ms),
            TimestampField::Text(s) => DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.with_timezone(&Utc)),
        }
    }
}

impl RawReport {
    /// Produce a canonical report, or `None` if any required field is
    /// missing or unparseable.
    pub fn normalize(&self) -> Option<LocationReport> {
        // Unwrap the transport envelope when present; the payload carries
        // the same field layout as a flat report.
        let payload = self
            .uplink_message
            .as_ref()
            .and_then(|m| m.decoded_payload.as_deref())
            .unwrap_or(self);

        let latitude = payload.latitude.as_ref()?.as_f64()?;
        let longitude = payload.longitude.as_ref()?.as_f64()?;
        let timestamp = payload.timestamp.as_ref()?.parse()?;

        Some(LocationReport {
            latitude,
            longitude,
            timestamp,
            alert_tag: AlertTag::from_wire(payload.alert_type.as_deref()),
        })
    }
}

/// Normalize a single raw JSON report.
///
/// Values that do not deserialize into a recognized report shape are invalid
/// and yield `None`.
pub fn normalize(raw: &Value) -> Option<LocationReport> {
    serde_json::from_value::<RawReport>(raw.clone())
        .ok()
        .and_then(|report| report.normalize())
}

/// Select the latest valid report from a raw report collection.
///
/// Invalid entries are discarded; they never win latest-selection. Among
/// valid reports the greatest parsed timestamp wins, and an equal timestamp
/// does not displace the report seen first.
///
/// Returns `None` when the input is empty or every entry is invalid.
pub fn resolve_latest<'a, I>(reports: I) -> Option<LocationReport>
where
    I: IntoIterator<Item = &'a Value>,
{
    let mut latest: Option<LocationReport> = None;

    for report in reports.into_iter().filter_map(normalize) {
        match &latest {
            Some(current) if report.timestamp <= current.timestamp => {}
            _ => latest = Some(report),
        }
    }

    latest
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resolve_latest_picks_greatest_timestamp() {
        let r1 = json!({"lat": 1, "lng": 1, "timestamp": "2024-01-01T00:00:00Z"});
        let r2 = json!({"lat": 2, "lng": 2, "timestamp": "2024-01-02T00:00:00Z"});

        let latest = resolve_latest([&r1, &r2]).unwrap();
        assert_eq!(latest.latitude, 2.0);
        assert_eq!(latest.longitude, 2.0);

        // Iteration order must not matter.
        let latest = resolve_latest([&r2, &r1]).unwrap();
        assert_eq!(latest.latitude, 2.0);
    }

    #[test]
    fn test_resolve_latest_tie_keeps_first_seen() {
        let r1 = json!({"lat": 1, "lng": 1, "timestamp": "2024-01-01T00:00:00Z"});
        let r2 = json!({"lat": 2, "lng": 2, "timestamp": "2024-01-01T00:00:00Z"});

        let latest = resolve_latest([&r1, &r2]).unwrap();
        assert_eq!(latest.latitude, 1.0);
    }

    #[test]
    fn test_normalize_quoted_string_coordinates() {
        let raw = json!({
            "latitude": "12.5",
            "longitude": "\"80.25\"",
            "timestamp": "2024-01-01T00:00:00Z"
        });

        let report = normalize(&raw).unwrap();
        assert_eq!(report.latitude, 12.5);
        assert_eq!(report.longitude, 80.25);
    }

    #[test]
    fn test_normalize_unwraps_uplink_envelope() {
        let raw = json!({
            "uplink_message": {
                "decoded_payload": {
                    "latitude": 6.5,
                    "longitude": 80.1,
                    "timestamp": "2024-03-01T12:00:00Z",
                    "alert_type": "running_detected"
                }
            }
        });

        let report = normalize(&raw).unwrap();
        assert_eq!(report.latitude, 6.5);
        assert_eq!(report.alert_tag, AlertTag::Running);
    }

    #[test]
    fn test_normalize_accepts_epoch_millis() {
        let raw = json!({"lat": 1.0, "lng": 2.0, "timestamp": 1704067200000i64});

        let report = normalize(&raw).unwrap();
        assert_eq!(
            report.timestamp,
            "2024-01-01T00:00:00Z".parse::<DateTime<Utc>>().unwrap()
        );
    }

    #[test]
    fn test_invalid_reports_never_win() {
        let missing_ts = json!({"lat": 9.0, "lng": 9.0});
        let missing_lng = json!({"lat": 9.0, "timestamp": "2030-01-01T00:00:00Z"});
        let garbage = json!({"lat": {"nested": true}, "lng": 1, "timestamp": "2030-01-01T00:00:00Z"});
        let valid = json!({"lat": 1.0, "lng": 1.0, "timestamp": "2024-01-01T00:00:00Z"});

        let latest = resolve_latest([&missing_ts, &missing_lng, &garbage, &valid]).unwrap();
        assert_eq!(latest.latitude, 1.0);
    }

    #[test]
    fn test_resolve_latest_empty_or_all_invalid() {
        let empty: Vec<Value> = Vec::new();
        assert!(resolve_latest(&empty).is_none());

        let invalid = json!({"lat": 1.0});
        assert!(resolve_latest([&invalid]).is_none());
    }

    #[test]
    fn test_default_alert_tag_is_routine() {
        let raw = json!({"lat": 1.0, "lng": 1.0, "timestamp": "2024-01-01T00:00:00Z"});
        assert_eq!(normalize(&raw).unwrap().alert_tag, AlertTag::Routine);
    }
}
