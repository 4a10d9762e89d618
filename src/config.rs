//! TOML configuration for the dispatch service.
//!
//! Every section carries defaults so a partial (or empty) file is valid.
//! The unit registry is an ordered array: declaration order decides which
//! unit wins when several specialties match an incident type.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::detect::DetectionSettings;
use crate::dispatch::assign::{MatchMode, UnitAssigner};
use crate::dispatch::zones::ZoneRules;
use crate::dispatch::{Coordinates, MonitoredLocation, Unit};

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "CRISISCTRL_CONFIG";
/// Environment variable supplying the weather API key.
pub const API_KEY_ENV: &str = "CRISISCTRL_WEATHER_API_KEY";
const SYSTEM_CONFIG_PATH: &str = "/etc/crisisctrl/crisisctrl.toml";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub server: ServerConfig,
    pub detection: DetectionConfig,
    pub provider: ProviderConfig,
    pub broadcast: BroadcastConfig,
    pub assignment: AssignmentConfig,
    pub zones: ZoneConfig,
    pub logging: LoggingConfig,
    pub units: Vec<Unit>,
    pub locations: Vec<MonitoredLocation>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            detection: DetectionConfig::default(),
            provider: ProviderConfig::default(),
            broadcast: BroadcastConfig::default(),
            assignment: AssignmentConfig::default(),
            zones: ZoneConfig::default(),
            logging: LoggingConfig::default(),
            units: default_units(),
            locations: default_locations(),
        }
    }
}

impl DispatchConfig {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let mut config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        config.apply_env();
        config
            .validate()
            .with_context(|| format!("invalid config file: {}", path.display()))?;
        info!(path = %path.display(), "loaded dispatch configuration");
        Ok(config)
    }

    /// Try, in order: `$CRISISCTRL_CONFIG`, `/etc/crisisctrl/crisisctrl.toml`,
    /// compiled-in defaults.
    ///
    /// A file that is named or present but fails to load is an error, not a
    /// silent fallback. This runs before logging is set up.
    pub fn discover() -> Result<Self> {
        let env_path = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
        Self::discover_from(env_path.as_deref(), Path::new(SYSTEM_CONFIG_PATH))
    }

    fn discover_from(env_path: Option<&Path>, system_path: &Path) -> Result<Self> {
        if let Some(path) = env_path {
            return Self::load(path).with_context(|| format!("{CONFIG_ENV} is set"));
        }
        if system_path.exists() {
            return Self::load(system_path);
        }

        debug!("no config file found, using compiled-in defaults");
        let mut cfg = Self::default();
        cfg.apply_env();
        Ok(cfg)
    }

    fn apply_env(&mut self) {
        if self.provider.api_key.is_empty() {
            if let Ok(key) = std::env::var(API_KEY_ENV) {
                self.provider.api_key = key;
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.units.is_empty() {
            bail!("unit registry is empty");
        }
        let mut seen = HashSet::new();
        for unit in &self.units {
            if !seen.insert(unit.id.as_str()) {
                bail!("duplicate unit id: {}", unit.id);
            }
        }
        if !seen.contains(self.assignment.default_unit.as_str()) {
            bail!(
                "default unit {} is not in the unit registry",
                self.assignment.default_unit
            );
        }
        if self.detection.sweep_interval_secs == 0 || self.detection.step_interval_secs == 0 {
            bail!("detection intervals must be positive");
        }
        if self.detection.provider_timeout_secs == 0 {
            bail!("provider timeout must be positive");
        }
        let p = self.detection.security_threat_probability;
        if !(0.0..=1.0).contains(&p) {
            bail!("security_threat_probability must be within [0, 1], got {p}");
        }
        if self.broadcast.subscriber_buffer == 0 {
            bail!("subscriber_buffer must be positive");
        }
        Ok(())
    }

    pub fn assigner(&self) -> UnitAssigner {
        UnitAssigner::new(
            self.units.clone(),
            self.assignment.default_unit.clone(),
            self.assignment.match_mode,
        )
    }

    pub fn zone_rules(&self) -> ZoneRules {
        ZoneRules {
            location_radius_m: self.zones.location_radius_m,
            hotspot_radius_m: self.zones.hotspot_radius_m,
            hotspot_min_neighbors: self.zones.hotspot_min_neighbors,
            hotspot_zone_radius_m: self.zones.hotspot_zone_radius_m,
        }
    }

    pub fn detection_settings(&self) -> DetectionSettings {
        DetectionSettings {
            sweep_interval: Duration::from_secs(self.detection.sweep_interval_secs),
            step_interval: Duration::from_secs(self.detection.step_interval_secs),
            provider_timeout: Duration::from_secs(self.detection.provider_timeout_secs),
            security_threat_probability: self.detection.security_threat_probability,
        }
    }
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:5001".to_string(),
        }
    }
}

/// Detection loop timing and stochastic checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub enabled: bool,
    /// Pause after a full sweep over all locations.
    pub sweep_interval_secs: u64,
    /// Pause between two locations within a sweep.
    pub step_interval_secs: u64,
    pub provider_timeout_secs: u64,
    /// Per-step chance of a synthesized security threat.
    pub security_threat_probability: f64,
    /// Fixed RNG seed; unset means seeded from OS entropy.
    pub seed: Option<u64>,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sweep_interval_secs: 30,
            step_interval_secs: 2,
            provider_timeout_secs: 10,
            security_threat_probability: 0.02,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub base_url: String,
    pub api_key: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openweathermap.org/data/2.5/weather".to_string(),
            api_key: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BroadcastConfig {
    /// Events queued per subscriber before new ones are dropped.
    pub subscriber_buffer: usize,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            subscriber_buffer: 256,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssignmentConfig {
    pub default_unit: String,
    pub match_mode: MatchMode,
}

impl Default for AssignmentConfig {
    fn default() -> Self {
        Self {
            default_unit: "Unit_Charlie".to_string(),
            match_mode: MatchMode::Substring,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoneConfig {
    pub location_radius_m: f64,
    pub hotspot_radius_m: f64,
    pub hotspot_min_neighbors: usize,
    pub hotspot_zone_radius_m: f64,
}

impl Default for ZoneConfig {
    fn default() -> Self {
        Self {
            location_radius_m: 5000.0,
            hotspot_radius_m: 1000.0,
            hotspot_min_neighbors: 2,
            hotspot_zone_radius_m: 1200.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Minimum tracing level (`trace`, `debug`, `info`, `warn`, `error`).
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Built-in registry
// ---------------------------------------------------------------------------

fn unit(id: &str, operation: &str, lat: f64, lng: f64, specialty: &[&str]) -> Unit {
    Unit {
        id: id.to_string(),
        operation: operation.to_string(),
        base: Coordinates::new(lat, lng),
        specialty: specialty.iter().map(|s| s.to_string()).collect(),
    }
}

pub fn default_units() -> Vec<Unit> {
    vec![
        unit(
            "Unit_Alpha",
            "Fire & Rescue",
            13.0827,
            80.2707,
            &["Fire", "Explosion", "Heatwave"],
        ),
        unit(
            "Unit_Bravo",
            "Medical & Flood",
            11.0168,
            76.9558,
            &["Flood", "Flash Flood Alert", "Medical Emergency", "Cyclone Warning"],
        ),
        unit(
            "Unit_Charlie",
            "Security Ops",
            9.9252,
            78.1198,
            &["Terrorism", "Public Order", "Violence", "SOS REPORT", "Security Threat"],
        ),
    ]
}

pub fn default_locations() -> Vec<MonitoredLocation> {
    [
        ("Chennai", 13.0827, 80.2707),
        ("Coimbatore", 11.0168, 76.9558),
        ("Madurai", 9.9252, 78.1198),
        ("Trichy", 10.7905, 78.7047),
        ("Salem", 11.6643, 78.1460),
        ("Tirunelveli", 8.7139, 77.7567),
    ]
    .into_iter()
    .map(|(name, lat, lon)| MonitoredLocation {
        name: name.to_string(),
        lat,
        lon,
    })
    .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
