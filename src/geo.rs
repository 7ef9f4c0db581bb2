//! Geographic primitives: great-circle distance and point-in-polygon tests.
//!
//! Both functions are pure; all alerting state lives elsewhere.

use crate::model::GeoPoint;

/// Mean Earth radius in kilometers.
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance between two points via the haversine formula.
///
/// Symmetric in its arguments and zero for identical points.
pub fn distance_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}

/// Even-odd ray-casting test for polygon membership.
///
/// `vertices` form a closed ring; the edge from the last vertex back to the
/// first is implicit. A point exactly on an edge yields a deterministic but
/// unspecified result. Fewer than three vertices is degenerate and always
/// reports outside.
pub fn point_in_polygon(point: GeoPoint, vertices: &[GeoPoint]) -> bool {
    if vertices.len() < 3 {
        return false;
    }

    let (x, y) = (point.latitude, point.longitude);
    let mut inside = false;
    let mut j = vertices.len() - 1;

    for i in 0..vertices.len() {
        let (xi, yi) = (vertices[i].latitude, vertices[i].longitude);
        let (xj, yj) = (vertices[j].latitude, vertices[j].longitude);

        let crosses = ((yi > y) != (yj > y)) && (x < (xj - xi) * (y - yi) / (yj - yi) + xi);
        if crosses {
            inside = !inside;
        }
        j = i;
    }

    inside
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(latitude: f64, longitude: f64) -> GeoPoint {
        GeoPoint {
            latitude,
            longitude,
        }
    }

    fn unit_square() -> Vec<GeoPoint> {
        vec![
            point(0.0, 0.0),
            point(0.0, 1.0),
            point(1.0, 1.0),
            point(1.0, 0.0),
        ]
    }

    #[test]
    fn test_distance_zero_at_identical_points() {
        assert_eq!(distance_km(12.34, 56.78, 12.34, 56.78), 0.0);
        assert_eq!(distance_km(0.0, 0.0, 0.0, 0.0), 0.0);
    }

    #[test]
    fn test_distance_symmetric() {
        let forward = distance_km(6.5, 80.1, 7.2, 80.9);
        let backward = distance_km(7.2, 80.9, 6.5, 80.1);
        assert!((forward - backward).abs() < 1e-9);
    }

    #[test]
    fn test_distance_equator_regression() {
        // 0.045 degrees of longitude at the equator is roughly 5 km.
        let d = distance_km(0.0, 0.0, 0.0, 0.045);
        assert!((d - 5.0).abs() / 5.0 < 0.01, "got {d} km");
    }

    #[test]
    fn test_point_in_polygon_inside() {
        assert!(point_in_polygon(point(0.5, 0.5), &unit_square()));
    }

    #[test]
    fn test_point_in_polygon_outside() {
        assert!(!point_in_polygon(point(2.0, 2.0), &unit_square()));
        assert!(!point_in_polygon(point(-0.5, 0.5), &unit_square()));
    }

    #[test]
    fn test_point_in_polygon_degenerate() {
        assert!(!point_in_polygon(point(0.5, 0.5), &[]));
        assert!(!point_in_polygon(
            point(0.5, 0.5),
            &[point(0.0, 0.0), point(1.0, 1.0)]
        ));
    }

    #[test]
    fn test_point_in_polygon_concave() {
        // L-shaped polygon; the notch at the top right is outside.
        let polygon = vec![
            point(0.0, 0.0),
            point(0.0, 2.0),
            point(1.0, 2.0),
            point(1.0, 1.0),
            point(2.0, 1.0),
            point(2.0, 0.0),
        ];
        assert!(point_in_polygon(point(0.5, 1.5), &polygon));
        assert!(!point_in_polygon(point(1.5, 1.5), &polygon));
    }
}
