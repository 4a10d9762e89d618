//! Incident registry, unit assignment, stats and the serialized mutation path.

pub mod assign;
pub mod engine;
pub mod stats;
pub mod store;
pub mod zones;

pub use self::engine::Dispatcher;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("incident id already registered: {0}")]
    DuplicateId(String),
    #[error("incident not found: {0}")]
    NotFound(String),
    #[error("environmental signal provider unavailable: {0}")]
    ProviderUnavailable(String),
    #[error("invalid report: {0}")]
    Validation(String),
    #[error("dispatcher is shutting down")]
    ShuttingDown,
}

/// Severity levels for tracked incidents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Whether an incident at this severity counts toward `Stats::critical`.
    pub fn is_critical(self) -> bool {
        matches!(self, Severity::High | Severity::Critical)
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Low => write!(f, "Low"),
            Severity::Medium => write!(f, "Medium"),
            Severity::High => write!(f, "High"),
            Severity::Critical => write!(f, "Critical"),
        }
    }
}

/// A latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }
}

/// A single tracked emergency event.
///
/// Field names on the wire follow the dashboard's existing contract
/// (`type`, `assignedUnit`, `is_critical`, `ai_recommendation`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
    pub location: Coordinates,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "assignedUnit")]
    pub assigned_unit: String,
    pub is_critical: bool,
    pub ai_recommendation: String,
}

/// A responder resource with a declared specialty set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Unit {
    pub id: String,
    #[serde(rename = "type")]
    pub operation: String,
    pub base: Coordinates,
    pub specialty: Vec<String>,
}

/// Aggregate counters describing registry state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub total: u64,
    pub active: u64,
    pub resolved: u64,
    pub critical: u64,
}

/// Static configuration for a location polled by the detection loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoredLocation {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
}

impl MonitoredLocation {
    pub fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.lat, self.lon)
    }
}
