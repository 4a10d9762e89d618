//! Threat derivation from environmental signals.

use rand::Rng;

use super::provider::WeatherSample;
use crate::dispatch::Severity;

/// Wind speed above which a cyclone warning is raised (km/h, strict).
pub const CYCLONE_WIND_KMH: f64 = 60.0;
/// One-hour rainfall above which a flash flood alert is raised (mm, strict).
pub const FLASH_FLOOD_RAIN_MM: f64 = 40.0;

pub const CYCLONE_WARNING: &str = "Cyclone Warning";
pub const FLASH_FLOOD_ALERT: &str = "Flash Flood Alert";
pub const SECURITY_THREAT: &str = "Security Threat";

pub const STANDARD_RECOMMENDATION: &str = "Deploy Standard Response Protocols";
const SECURITY_RECOMMENDATION: &str = "Increase patrol and setup checkpoints.";

/// A candidate incident before identity and unit assignment.
#[derive(Debug, Clone, PartialEq)]
pub struct Threat {
    pub kind: &'static str,
    pub severity: Severity,
    pub description: String,
    pub recommendation: Option<&'static str>,
}

impl Threat {
    pub fn recommendation(&self) -> &'static str {
        self.recommendation.unwrap_or(STANDARD_RECOMMENDATION)
    }
}

pub fn ms_to_kmh(speed_ms: f64) -> f64 {
    speed_ms * 3.6
}

/// Wind takes precedence over rain; at most one weather threat per sample.
pub fn weather_threat(location: &str, sample: &WeatherSample) -> Option<Threat> {
    classify_weather(location, ms_to_kmh(sample.wind_speed_ms), sample.rain_1h_mm)
}

pub fn classify_weather(location: &str, wind_kmh: f64, rain_1h_mm: f64) -> Option<Threat> {
    if wind_kmh > CYCLONE_WIND_KMH {
        Some(Threat {
            kind: CYCLONE_WARNING,
            severity: Severity::Critical,
            description: format!(
                "Hurricane force winds ({} km/h) in {}.",
                wind_kmh as i64, location
            ),
            recommendation: None,
        })
    } else if rain_1h_mm > FLASH_FLOOD_RAIN_MM {
        Some(Threat {
            kind: FLASH_FLOOD_ALERT,
            severity: Severity::Critical,
            description: format!(
                "Critical rainfall ({} mm/hr) in {}.",
                rain_1h_mm, location
            ),
            recommendation: None,
        })
    } else {
        None
    }
}

/// Stochastic security check; fires when `roll < probability`.
pub fn security_threat(location: &str, roll: f64, probability: f64) -> Option<Threat> {
    if roll >= probability {
        return None;
    }
    Some(Threat {
        kind: SECURITY_THREAT,
        severity: Severity::Critical,
        description: format!(
            "Intel chatter indicates potential unrest in {} sector.",
            location
        ),
        recommendation: Some(SECURITY_RECOMMENDATION),
    })
}

/// All candidate threats for one location step.
pub fn derive_threats<R: Rng>(
    location: &str,
    sample: &WeatherSample,
    rng: &mut R,
    security_probability: f64,
) -> Vec<Threat> {
    let mut threats = Vec::new();
    if let Some(t) = weather_threat(location, sample) {
        threats.push(t);
    }
    let roll: f64 = rng.gen();
    if let Some(t) = security_threat(location, roll, security_probability) {
        threats.push(t);
    }
    threats
}
