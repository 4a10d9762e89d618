//! Incident type to responding unit mapping.

use serde::{Deserialize, Serialize};

use super::Unit;

/// How a unit specialty keyword is compared against an incident type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    /// Keyword appears anywhere in the incident type.
    #[default]
    Substring,
    /// Keyword equals the incident type.
    Exact,
}

impl MatchMode {
    fn matches(self, keyword: &str, incident_type: &str) -> bool {
        match self {
            MatchMode::Substring => incident_type.contains(keyword),
            MatchMode::Exact => incident_type == keyword,
        }
    }
}

/// Picks the first unit, in declaration order, whose specialty matches.
#[derive(Debug, Clone)]
pub struct UnitAssigner {
    units: Vec<Unit>,
    default_unit: String,
    mode: MatchMode,
}

impl UnitAssigner {
    pub fn new(units: Vec<Unit>, default_unit: impl Into<String>, mode: MatchMode) -> Self {
        Self {
            units,
            default_unit: default_unit.into(),
            mode,
        }
    }

    pub fn units(&self) -> &[Unit] {
        &self.units
    }

    pub fn default_unit(&self) -> &str {
        &self.default_unit
    }

    pub fn assign(&self, incident_type: &str) -> &str {
        self.units
            .iter()
            .find(|unit| {
                unit.specialty
                    .iter()
                    .any(|kw| self.mode.matches(kw, incident_type))
            })
            .map(|unit| unit.id.as_str())
            .unwrap_or(&self.default_unit)
    }
}
