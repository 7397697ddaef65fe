//! Geo Utilities
//!
//! Great-circle distance and nearby-quest filtering over the quest catalog.

use serde::{Deserialize, Serialize};

use crate::quest::{QuestMeta, QuestRegistry};

/// Mean earth radius used by the haversine formula
const EARTH_RADIUS_KM: f64 = 6371.0;

/// A latitude/longitude pair in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Whether both coordinates are finite and inside their valid ranges
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }
}

/// Distance in kilometres between two points
pub fn haversine_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
}

/// A quest within reach of some origin
#[derive(Debug, Clone, Serialize)]
pub struct NearbyQuest {
    #[serde(flatten)]
    pub quest: QuestMeta,
    pub distance_km: f64,
}

/// Quests whose resolved coordinates lie within `radius_km` of `origin`,
/// closest first. Quests without coordinates are skipped.
pub fn nearby_quests(registry: &QuestRegistry, origin: GeoPoint, radius_km: f64) -> Vec<NearbyQuest> {
    let mut nearby: Vec<NearbyQuest> = registry
        .all_quests()
        .into_iter()
        .filter_map(|quest| {
            let position = quest.position?;
            let distance_km = haversine_km(origin, position);
            (distance_km <= radius_km).then_some(NearbyQuest { quest, distance_km })
        })
        .collect();

    // Stable sort keeps catalog order for equal distances
    nearby.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
    nearby
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_haversine_known_distance() {
        let krakow = GeoPoint::new(50.0614, 19.9366);
        let warsaw = GeoPoint::new(52.2297, 21.0122);

        let d = haversine_km(krakow, warsaw);
        assert!((d - 252.0).abs() < 3.0, "got {d}");
        assert_eq!(haversine_km(krakow, krakow), 0.0);
    }

    #[test]
    fn test_haversine_is_symmetric() {
        let a = GeoPoint::new(53.9006, 27.5590);
        let b = GeoPoint::new(41.7151, 44.8271);
        assert!((haversine_km(a, b) - haversine_km(b, a)).abs() < 1e-9);
    }

    #[test]
    fn test_point_validity() {
        assert!(GeoPoint::new(0.0, 0.0).is_valid());
        assert!(!GeoPoint::new(91.0, 0.0).is_valid());
        assert!(!GeoPoint::new(0.0, f64::NAN).is_valid());
    }

    #[test]
    fn test_nearby_quests_sorted_and_filtered() {
        let registry = QuestRegistry::builtin();
        let krakow = GeoPoint::new(50.0614, 19.9366);

        let nearby = nearby_quests(&registry, krakow, 30.0);
        assert!(!nearby.is_empty());
        assert!(nearby.iter().all(|q| q.distance_km <= 30.0));
        assert!(nearby.windows(2).all(|w| w[0].distance_km <= w[1].distance_km));
        assert!(nearby.iter().all(|q| q.quest.city_id == "krakow"));

        let nothing = nearby_quests(&registry, GeoPoint::new(-45.0, 170.0), 10.0);
        assert!(nothing.is_empty());
    }
}
