use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Mean Earth radius used by the haversine formula, in kilometers.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// A point on the globe in decimal degrees.
///
/// Coordinates are transient values: they arrive with a request, get checked
/// with [`Coordinate::validate`], and are never persisted on their own.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Error, PartialEq)]
pub enum CoordinateError {
    #[error("latitude must be within [-90, 90], got {0}")]
    Latitude(f64),
    #[error("longitude must be within [-180, 180], got {0}")]
    Longitude(f64),
}

impl Coordinate {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Coordinate {
            latitude,
            longitude,
        }
    }

    /// Checks the latitude/longitude ranges. NaN fails both range checks.
    pub fn validate(&self) -> Result<(), CoordinateError> {
        if !(-90.0..=90.0).contains(&self.latitude) {
            return Err(CoordinateError::Latitude(self.latitude));
        }
        if !(-180.0..=180.0).contains(&self.longitude) {
            return Err(CoordinateError::Longitude(self.longitude));
        }
        Ok(())
    }
}

/// Great-circle distance between `a` and `b` in kilometers (haversine).
///
/// The result is symmetric, zero for identical points and grows with the
/// angular separation. Ranges are not checked here; callers validate input
/// at the boundary.
pub fn distance(a: Coordinate, b: Coordinate) -> f64 {
    let phi1 = a.latitude.to_radians();
    let phi2 = b.latitude.to_radians();
    let d_phi = (b.latitude - a.latitude).to_radians();
    let d_lambda = (b.longitude - a.longitude).to_radians();

    let h = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    // rounding can push h a hair above 1 for antipodal points
    let h = h.clamp(0.0, 1.0);
    2.0 * EARTH_RADIUS_KM * h.sqrt().atan2((1.0 - h).sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONNAUGHT_PLACE: Coordinate = Coordinate::new(28.6139, 77.2090);
    const INDIA_GATE_ROAD: Coordinate = Coordinate::new(28.6129, 77.2295);

    #[test]
    fn test_distance_to_self_is_zero() {
        for c in [
            CONNAUGHT_PLACE,
            Coordinate::new(0.0, 0.0),
            Coordinate::new(-89.9, 179.9),
            Coordinate::new(51.5074, -0.1278),
        ] {
            assert!(distance(c, c).abs() < 1e-6, "non-zero self distance for {c:?}");
        }
    }

    #[test]
    fn test_distance_is_symmetric() {
        let pairs = [
            (CONNAUGHT_PLACE, INDIA_GATE_ROAD),
            (Coordinate::new(40.7128, -74.0060), Coordinate::new(34.0522, -118.2437)),
            (Coordinate::new(-33.8688, 151.2093), Coordinate::new(35.6762, 139.6503)),
        ];
        for (a, b) in pairs {
            assert!((distance(a, b) - distance(b, a)).abs() < 1e-9);
        }
    }

    #[test]
    fn test_known_delhi_fixture() {
        let d = distance(CONNAUGHT_PLACE, INDIA_GATE_ROAD);
        // haversine with R = 6371 km gives 2.004 km for this pair
        assert!((d - 2.0).abs() < 0.05, "got {d}");
    }

    #[test]
    fn test_distance_along_meridian_matches_arc_length() {
        let origin = Coordinate::new(10.0, 20.0);
        let north = Coordinate::new(10.0 + (2.5 / EARTH_RADIUS_KM).to_degrees(), 20.0);
        assert!((distance(origin, north) - 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_distance_grows_with_separation() {
        let origin = Coordinate::new(0.0, 0.0);
        let mut last = 0.0;
        for step in 1..=18 {
            let d = distance(origin, Coordinate::new(0.0, step as f64 * 10.0));
            assert!(d > last, "not monotonic at step {step}");
            last = d;
        }
    }

    #[test]
    fn test_antipodal_points_are_half_circumference() {
        let d = distance(Coordinate::new(0.0, 0.0), Coordinate::new(0.0, 180.0));
        assert!((d - std::f64::consts::PI * EARTH_RADIUS_KM).abs() < 1e-6);
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        assert!(CONNAUGHT_PLACE.validate().is_ok());
        assert!(Coordinate::new(90.0, -180.0).validate().is_ok());
        assert_eq!(
            Coordinate::new(90.5, 0.0).validate(),
            Err(CoordinateError::Latitude(90.5))
        );
        assert_eq!(
            Coordinate::new(0.0, -181.0).validate(),
            Err(CoordinateError::Longitude(-181.0))
        );
        assert!(Coordinate::new(f64::NAN, 0.0).validate().is_err());
    }
}
