//! Great-circle distance on a spherical Earth
//!
//! Haversine is accurate to well under 1% at the scales we care about
//! (trigger radii of tens of metres, entrances a few km apart).

use crate::domain::types::GeoPoint;

/// Mean Earth radius (km)
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Haversine distance between two points in kilometres
pub fn distance_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    // Round-off can push h slightly outside [0, 1] for identical or antipodal points
    let h = h.clamp(0.0, 1.0);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_KM * c
}

/// Haversine distance in metres
#[inline]
pub fn distance_m(a: GeoPoint, b: GeoPoint) -> f64 {
    distance_km(a, b) * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    const GREENWICH_NORTH: GeoPoint = GeoPoint::new(51.4842, -0.0097);
    const GREENWICH_SOUTH: GeoPoint = GeoPoint::new(51.4820, -0.0081);

    #[test]
    fn test_identical_points_are_zero() {
        assert_eq!(distance_km(GREENWICH_NORTH, GREENWICH_NORTH), 0.0);
        let origin = GeoPoint::new(0.0, 0.0);
        assert_eq!(distance_km(origin, origin), 0.0);
    }

    #[test]
    fn test_symmetric() {
        let pairs = [
            (GREENWICH_NORTH, GREENWICH_SOUTH),
            (GeoPoint::new(-33.86, 151.21), GeoPoint::new(40.71, -74.0)),
            (GeoPoint::new(89.9, 10.0), GeoPoint::new(-89.9, -170.0)),
        ];
        for (a, b) in pairs {
            assert!((distance_km(a, b) - distance_km(b, a)).abs() < 1e-9);
        }
    }

    #[test]
    fn test_antipodal_is_half_circumference() {
        let d = distance_km(GeoPoint::new(0.0, 0.0), GeoPoint::new(0.0, 180.0));
        assert!(d.is_finite());
        let half = std::f64::consts::PI * EARTH_RADIUS_KM;
        assert!((d - half).abs() < 1e-6, "got {d}");

        let poles = distance_km(GeoPoint::new(90.0, 0.0), GeoPoint::new(-90.0, 0.0));
        assert!((poles - half).abs() < 1e-6);
    }

    #[test]
    fn test_one_degree_latitude() {
        // 1 degree of latitude is ~111.19 km on a 6371 km sphere
        let d = distance_km(GeoPoint::new(0.0, 0.0), GeoPoint::new(1.0, 0.0));
        assert!((d - 111.195).abs() < 0.01, "got {d}");
    }

    #[test]
    fn test_greenwich_entrances_distance() {
        // The two Greenwich shafts are roughly 270 m apart
        let d = distance_m(GREENWICH_NORTH, GREENWICH_SOUTH);
        assert!((250.0..300.0).contains(&d), "got {d}");
    }

    #[test]
    fn test_short_distance_accuracy() {
        // 0.0009 degrees of latitude is ~100 m
        let a = GeoPoint::new(51.5, 0.0);
        let b = GeoPoint::new(51.5009, 0.0);
        let d = distance_m(a, b);
        assert!((d - 100.08).abs() < 1.0, "got {d}");
    }
}
