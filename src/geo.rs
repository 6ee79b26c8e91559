// 🌍 Distance Metric - Haversine on a spherical Earth
// One sphere model for both index pruning (bounding boxes) and ranking

use crate::error::{NearbyError, Result};
use serde::{Deserialize, Serialize};

/// Mean Earth radius in kilometres.
///
/// The bounding box used to prune the spatial index is derived from this same
/// radius, so pruning and ranking always agree on the Earth model.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Outward padding applied to index bounding boxes (degrees, ~0.1 m).
/// Only widens the candidate set; the exact metric still decides membership.
const BBOX_PAD_DEG: f64 = 1e-6;

// ============================================================================
// GEO POINT
// ============================================================================

/// A WGS84 coordinate pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    /// Build a point, rejecting non-finite or out-of-range coordinates
    pub fn new(lat: f64, lon: f64) -> Result<Self> {
        if !lat.is_finite() || !lon.is_finite() {
            return Err(NearbyError::InvalidRequest(format!(
                "coordinates must be finite (lat={}, lon={})",
                lat, lon
            )));
        }
        if !(-90.0..=90.0).contains(&lat) {
            return Err(NearbyError::InvalidRequest(format!(
                "latitude {} outside [-90, 90]",
                lat
            )));
        }
        if !(-180.0..=180.0).contains(&lon) {
            return Err(NearbyError::InvalidRequest(format!(
                "longitude {} outside [-180, 180]",
                lon
            )));
        }
        Ok(Self { lat, lon })
    }

    /// Great-circle distance to another point in kilometres
    pub fn distance_km(&self, other: &GeoPoint) -> f64 {
        distance_km(*self, *other)
    }
}

/// Great-circle (haversine) distance between two points in kilometres.
///
/// Symmetric, non-negative, and exactly `0.0` for identical coordinate pairs.
pub fn distance_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lon = (b.lon - a.lon).to_radians();

    let h = ((delta_lat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (delta_lon / 2.0).sin().powi(2))
    .clamp(0.0, 1.0);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_KM * c
}

// ============================================================================
// BOUNDING BOX
// ============================================================================

/// Inclusive longitude interval, never crossing the antimeridian
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LonRange {
    pub min_lon: f64,
    pub max_lon: f64,
}

impl LonRange {
    pub fn contains(&self, lon: f64) -> bool {
        lon >= self.min_lon && lon <= self.max_lon
    }
}

/// Lat/lon box enclosing every point within a radius of a center.
///
/// A box that would cross the antimeridian is split into two longitude ranges.
/// A box that reaches a pole spans all longitudes.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub lon_ranges: Vec<LonRange>,
}

impl BoundingBox {
    pub fn around(center: GeoPoint, radius_km: f64) -> Self {
        let angular = radius_km / EARTH_RADIUS_KM;
        let delta_lat = angular.to_degrees() + BBOX_PAD_DEG;

        let min_lat = center.lat - delta_lat;
        let max_lat = center.lat + delta_lat;

        if min_lat <= -90.0 || max_lat >= 90.0 {
            return Self {
                min_lat: min_lat.max(-90.0),
                max_lat: max_lat.min(90.0),
                lon_ranges: vec![LonRange { min_lon: -180.0, max_lon: 180.0 }],
            };
        }

        // Widest longitude reach happens away from the center parallel
        let ratio = (angular.sin() / center.lat.to_radians().cos()).min(1.0);
        let delta_lon = ratio.asin().to_degrees() + BBOX_PAD_DEG;
        if delta_lon >= 180.0 {
            return Self {
                min_lat,
                max_lat,
                lon_ranges: vec![LonRange { min_lon: -180.0, max_lon: 180.0 }],
            };
        }

        let min_lon = center.lon - delta_lon;
        let max_lon = center.lon + delta_lon;

        let lon_ranges = if min_lon < -180.0 {
            vec![
                LonRange { min_lon: min_lon + 360.0, max_lon: 180.0 },
                LonRange { min_lon: -180.0, max_lon },
            ]
        } else if max_lon > 180.0 {
            vec![
                LonRange { min_lon, max_lon: 180.0 },
                LonRange { min_lon: -180.0, max_lon: max_lon - 360.0 },
            ]
        } else {
            vec![LonRange { min_lon, max_lon }]
        };

        Self { min_lat, max_lat, lon_ranges }
    }

    pub fn contains(&self, point: GeoPoint) -> bool {
        point.lat >= self.min_lat
            && point.lat <= self.max_lat
            && self.lon_ranges.iter().any(|r| r.contains(point.lon))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn p(lat: f64, lon: f64) -> GeoPoint {
        GeoPoint::new(lat, lon).unwrap()
    }

    #[test]
    fn test_rejects_invalid_coordinates() {
        assert!(GeoPoint::new(f64::NAN, 0.0).is_err());
        assert!(GeoPoint::new(0.0, f64::INFINITY).is_err());
        assert!(GeoPoint::new(90.5, 0.0).is_err());
        assert!(GeoPoint::new(-91.0, 0.0).is_err());
        assert!(GeoPoint::new(0.0, 180.1).is_err());
        assert!(GeoPoint::new(90.0, -180.0).is_ok());
    }

    #[test]
    fn test_distance_zero_for_same_point() {
        let a = p(51.0, 17.0);
        assert_eq!(distance_km(a, a), 0.0);
    }

    #[test]
    fn test_known_distance() {
        // Wroclaw -> Warsaw, roughly 301 km
        let wroclaw = p(51.1079, 17.0385);
        let warsaw = p(52.2297, 21.0122);
        let d = distance_km(wroclaw, warsaw);
        assert!((d - 301.0).abs() < 3.0, "got {}", d);
    }

    #[test]
    fn test_one_degree_of_latitude() {
        let d = distance_km(p(0.0, 0.0), p(1.0, 0.0));
        let expected = EARTH_RADIUS_KM * 1.0_f64.to_radians();
        assert!((d - expected).abs() < 1e-9);
    }

    #[test]
    fn test_bbox_splits_at_antimeridian() {
        let bbox = BoundingBox::around(p(0.0, 179.95), 20.0);
        assert_eq!(bbox.lon_ranges.len(), 2);
        assert!(bbox.contains(p(0.0, -179.95)));
        assert!(bbox.contains(p(0.0, 179.99)));
        assert!(!bbox.contains(p(0.0, 0.0)));
    }

    #[test]
    fn test_bbox_near_pole_spans_all_longitudes() {
        let bbox = BoundingBox::around(p(89.95, 10.0), 20.0);
        assert_eq!(bbox.max_lat, 90.0);
        assert_eq!(
            bbox.lon_ranges,
            vec![LonRange { min_lon: -180.0, max_lon: 180.0 }]
        );
        assert!(bbox.contains(p(89.99, -170.0)));
    }

    proptest! {
        #[test]
        fn prop_distance_symmetric_and_non_negative(
            lat1 in -90.0f64..=90.0, lon1 in -180.0f64..=180.0,
            lat2 in -90.0f64..=90.0, lon2 in -180.0f64..=180.0,
        ) {
            let a = p(lat1, lon1);
            let b = p(lat2, lon2);
            let ab = distance_km(a, b);
            let ba = distance_km(b, a);
            prop_assert!(ab >= 0.0);
            prop_assert!((ab - ba).abs() <= 1e-9);
            prop_assert!(ab <= std::f64::consts::PI * EARTH_RADIUS_KM + 1e-6);
        }

        #[test]
        fn prop_bbox_contains_every_point_within_radius(
            lat in -89.0f64..=89.0, lon in -180.0f64..=180.0,
            radius_km in 0.1f64..200.0,
            bearing in 0.0f64..360.0, frac in 0.0f64..=1.0,
        ) {
            let center = p(lat, lon);
            // Destination point on the sphere at bearing/distance from center
            let d = radius_km * frac / EARTH_RADIUS_KM;
            let (lat1, lon1, brg) = (lat.to_radians(), lon.to_radians(), bearing.to_radians());
            let lat2 = (lat1.sin() * d.cos() + lat1.cos() * d.sin() * brg.cos()).asin();
            let lon2 = lon1
                + (brg.sin() * d.sin() * lat1.cos()).atan2(d.cos() - lat1.sin() * lat2.sin());
            let mut lon2 = lon2.to_degrees();
            if lon2 > 180.0 { lon2 -= 360.0; }
            if lon2 < -180.0 { lon2 += 360.0; }
            let target = p(lat2.to_degrees().clamp(-90.0, 90.0), lon2);

            prop_assume!(distance_km(center, target) <= radius_km);
            let bbox = BoundingBox::around(center, radius_km);
            prop_assert!(bbox.contains(target), "{:?} not in {:?}", target, bbox);
        }
    }
}
