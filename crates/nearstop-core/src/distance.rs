//! Great-circle distance between geographic points.
//!
//! Distances are computed with the Haversine formula on a spherical Earth.
//! This is accurate to well within the error of a phone-grade position fix,
//! which is all the proximity check needs.

use serde::{Deserialize, Serialize};

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// A point on the Earth's surface in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Latitude in degrees.
    pub latitude: f64,

    /// Longitude in degrees.
    pub longitude: f64,
}

impl GeoPoint {
    /// Create a new point from latitude and longitude in degrees.
    #[must_use]
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Great-circle distance to `other` in meters.
    #[must_use]
    pub fn distance_to(&self, other: &Self) -> f64 {
        haversine_distance(
            self.latitude,
            self.longitude,
            other.latitude,
            other.longitude,
        )
    }
}

/// Great-circle distance in meters between two points given in degrees.
///
/// Never fails and never returns a negative value. The intermediate term is
/// clamped to `[0, 1]` so rounding near coincident or antipodal points cannot
/// push the square roots out of their domain.
///
/// # Example
///
/// ```rust
/// use nearstop_core::distance::haversine_distance;
///
/// let d = haversine_distance(35.0, 139.0, 35.01, 139.0);
/// assert!((d - 1112.0).abs() < 2.0);
/// ```
#[must_use]
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();

    let sin_d_lat = (d_lat / 2.0).sin();
    let sin_d_lon = (d_lon / 2.0).sin();

    let a = sin_d_lat.mul_add(
        sin_d_lat,
        lat1.to_radians().cos() * lat2.to_radians().cos() * sin_d_lon * sin_d_lon,
    );
    let a = a.clamp(0.0, 1.0);

    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_METERS * c
}

/// Format a distance for display, e.g. `"1113m"`.
///
/// Rounds to the nearest whole meter. An unknown distance renders as `"--"`.
#[must_use]
pub fn format_distance(meters: Option<f64>) -> String {
    match meters {
        Some(m) if m.is_finite() => format!("{:.0}m", m.round()),
        _ => "--".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_to_self_is_zero() {
        let points = [
            (0.0, 0.0),
            (35.0, 139.0),
            (-33.8688, 151.2093),
            (89.9999, -179.9999),
        ];
        for (lat, lon) in points {
            assert_eq!(haversine_distance(lat, lon, lat, lon), 0.0);
        }
    }

    #[test]
    fn test_distance_is_symmetric() {
        let a = GeoPoint::new(35.681_236, 139.767_125);
        let b = GeoPoint::new(34.702_485, 135.495_951);
        let ab = a.distance_to(&b);
        let ba = b.distance_to(&a);
        assert!((ab - ba).abs() < 1e-6);
        // Tokyo to Osaka is roughly 400 km
        assert!(ab > 395_000.0 && ab < 410_000.0);
    }

    #[test]
    fn test_one_hundredth_degree_latitude() {
        let d = haversine_distance(35.01, 139.0, 35.0, 139.0);
        assert!((d - 1111.95).abs() < 1.0, "got {d}");

        let d = haversine_distance(35.001, 139.0, 35.0, 139.0);
        assert!((d - 111.19).abs() < 0.5, "got {d}");
    }

    #[test]
    fn test_antipodal_points_are_finite() {
        let d = haversine_distance(0.0, 0.0, 0.0, 180.0);
        assert!(d.is_finite());
        let half_circumference = std::f64::consts::PI * EARTH_RADIUS_METERS;
        assert!((d - half_circumference).abs() < 1.0);

        let d = haversine_distance(90.0, 0.0, -90.0, 0.0);
        assert!(d.is_finite() && d > 0.0);
    }

    #[test]
    fn test_tiny_distances_are_non_negative() {
        let d = haversine_distance(51.5, -0.12, 51.5 + 1e-12, -0.12);
        assert!(d >= 0.0);
        assert!(d < 1e-3);
    }

    #[test]
    fn test_format_distance() {
        assert_eq!(format_distance(Some(1111.95)), "1112m");
        assert_eq!(format_distance(Some(490.0)), "490m");
        assert_eq!(format_distance(Some(0.4)), "0m");
        assert_eq!(format_distance(None), "--");
        assert_eq!(format_distance(Some(f64::NAN)), "--");
    }
}
