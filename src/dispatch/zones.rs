//! Risk zones: static zones around monitored locations and hotspot zones
//! raised when incidents cluster.

use serde::{Deserialize, Serialize};

use super::{Coordinates, Incident, MonitoredLocation};

const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance between two points in meters (haversine).
pub fn distance_m(a: Coordinates, b: Coordinates) -> f64 {
    let phi1 = a.lat.to_radians();
    let phi2 = b.lat.to_radians();
    let d_phi = (b.lat - a.lat).to_radians();
    let d_lambda = (b.lng - a.lng).to_radians();

    let h = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().atan2((1.0 - h).sqrt())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Monitored,
    HighRisk,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskZone {
    pub lat: f64,
    pub lng: f64,
    /// Radius in meters.
    pub radius: f64,
    pub level: RiskLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl RiskZone {
    pub fn centre(&self) -> Coordinates {
        Coordinates::new(self.lat, self.lng)
    }

    pub fn contains(&self, point: Coordinates) -> bool {
        distance_m(self.centre(), point) <= self.radius
    }
}

/// Thresholds for zone derivation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoneRules {
    pub location_radius_m: f64,
    pub hotspot_radius_m: f64,
    pub hotspot_min_neighbors: usize,
    pub hotspot_zone_radius_m: f64,
}

/// One monitored zone per configured location.
pub fn location_zones(locations: &[MonitoredLocation], radius_m: f64) -> Vec<RiskZone> {
    locations
        .iter()
        .map(|loc| RiskZone {
            lat: loc.lat,
            lng: loc.lon,
            radius: radius_m,
            level: RiskLevel::Monitored,
            message: None,
        })
        .collect()
}

/// Returns a high-risk zone centred on `candidate` if enough active incidents
/// already sit within the hotspot radius.
pub fn hotspot<'a>(
    active: impl Iterator<Item = &'a Incident>,
    candidate: &Incident,
    rules: &ZoneRules,
) -> Option<RiskZone> {
    let neighbors = active
        .filter(|i| distance_m(i.location, candidate.location) < rules.hotspot_radius_m)
        .count();

    if rules.hotspot_min_neighbors == 0 || neighbors < rules.hotspot_min_neighbors {
        return None;
    }

    Some(RiskZone {
        lat: candidate.location.lat,
        lng: candidate.location.lng,
        radius: rules.hotspot_zone_radius_m,
        level: RiskLevel::HighRisk,
        message: Some(format!(
            "DANGER: High frequency of {} detected here.",
            candidate.kind
        )),
    })
}

/// Whether a raised hotspot still has enough active incidents around its
/// centre. The incident that raised it sits at the centre and counts.
pub fn hotspot_holds<'a>(
    zone: &RiskZone,
    active: impl Iterator<Item = &'a Incident>,
    rules: &ZoneRules,
) -> bool {
    let nearby = active
        .filter(|i| distance_m(i.location, zone.centre()) < rules.hotspot_radius_m)
        .count();
    rules.hotspot_min_neighbors > 0 && nearby > rules.hotspot_min_neighbors
}
