// 📍 Point-of-interest records and the result row shape
// Rows are read-only on the query path; ingestion lives in `import`

use crate::geo::GeoPoint;
use serde::{Deserialize, Serialize};

// ============================================================================
// ATTRIBUTES
// ============================================================================

/// Named facts about an entity. Every field is independently nullable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Attributes {
    pub service_carwash: Option<bool>,
    pub service_food: Option<bool>,
    pub service_coffee: Option<bool>,
    pub service_shop: Option<bool>,

    /// Human-readable operating hours, e.g. "Mo-Su 06:00-22:00"
    pub opening_hours_display: Option<String>,
}

// ============================================================================
// ENTITY
// ============================================================================

/// A persisted point of interest
#[derive(Debug, Clone, PartialEq)]
pub struct PointOfInterest {
    /// Stable identity, assigned at creation
    pub id: i64,
    pub name: Option<String>,
    pub brand: Option<String>,
    pub address: Option<String>,
    /// Sole geometry used for indexing; always valid WGS84
    pub location: GeoPoint,
    pub attributes: Attributes,
}

impl PointOfInterest {
    /// Attach a computed distance, producing the outgoing row
    pub fn into_result(self, distance_km: f64) -> NearbyResult {
        NearbyResult {
            id: self.id,
            name: self.name,
            brand: self.brand,
            address: self.address,
            lat: self.location.lat,
            lon: self.location.lon,
            distance_km,
            attributes: self.attributes,
        }
    }
}

// ============================================================================
// RESULT ROW
// ============================================================================

/// One ranked result: entity summary plus its exact distance from the origin.
///
/// Serializes as a flat JSON object:
/// `{id, name, brand, address, lat, lon, distance_km, service_*, opening_hours_display}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NearbyResult {
    pub id: i64,
    pub name: Option<String>,
    pub brand: Option<String>,
    pub address: Option<String>,
    pub lat: f64,
    pub lon: f64,
    pub distance_km: f64,
    #[serde(flatten)]
    pub attributes: Attributes,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_serializes_flat() {
        let poi = PointOfInterest {
            id: 7,
            name: Some("Orlen".to_string()),
            brand: Some("ORLEN".to_string()),
            address: None,
            location: GeoPoint::new(51.0, 17.0).unwrap(),
            attributes: Attributes {
                service_coffee: Some(true),
                opening_hours_display: Some("24/7".to_string()),
                ..Attributes::default()
            },
        };

        let json = serde_json::to_value(poi.into_result(1.25)).unwrap();

        assert_eq!(json["id"], 7);
        assert_eq!(json["brand"], "ORLEN");
        assert!(json["address"].is_null());
        assert_eq!(json["lat"], 51.0);
        assert_eq!(json["distance_km"], 1.25);
        assert_eq!(json["service_coffee"], true);
        assert!(json["service_food"].is_null());
        assert_eq!(json["opening_hours_display"], "24/7");
    }
}
