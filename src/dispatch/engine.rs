//! The dispatcher: every registry mutation runs here as one serialized step.
//!
//! A mutation takes the registry write lock, mutates [`IncidentStore`],
//! updates [`StatsAggregator`], and publishes to the [`BroadcastHub`] before
//! releasing the lock. Nothing after the lock is acquired awaits: publication
//! is synchronous and non-blocking. Dropping a mutation future therefore
//! either cancels it before it touches the registry or not at all, and no
//! subscriber sees a registry change without its event. Readers take the read
//! lock and never see a registry whose stats lag behind.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::assign::UnitAssigner;
use super::stats::StatsAggregator;
use super::store::IncidentStore;
use super::zones::{self, RiskZone, ZoneRules};
use super::{Coordinates, DispatchError, Incident, Severity, Stats, Unit};
use crate::hub::{BroadcastHub, Event};

pub const SOS_DEFAULT_TYPE: &str = "SOS REPORT";
pub const SOS_DEFAULT_DESCRIPTION: &str = "Emergency reported.";

/// Externally submitted incident report. Only `location` is required.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SosReport {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub description: Option<String>,
    pub location: Option<Coordinates>,
    pub severity: Option<Severity>,
}

/// Full resync payload for subscribers.
#[derive(Debug, Clone, Serialize)]
pub struct Overview {
    pub reports: Vec<Incident>,
    pub stats: Stats,
    pub units: Vec<Unit>,
    #[serde(rename = "riskZones")]
    pub risk_zones: Vec<RiskZone>,
}

struct Registry {
    store: IncidentStore,
    stats: StatsAggregator,
    hotspots: Vec<RiskZone>,
}

pub struct Dispatcher {
    registry: RwLock<Registry>,
    assigner: UnitAssigner,
    hub: Arc<BroadcastHub>,
    zone_rules: ZoneRules,
    location_zones: Vec<RiskZone>,
    accepting: AtomicBool,
}

impl Dispatcher {
    pub fn new(
        assigner: UnitAssigner,
        hub: Arc<BroadcastHub>,
        zone_rules: ZoneRules,
        location_zones: Vec<RiskZone>,
    ) -> Self {
        Self {
            registry: RwLock::new(Registry {
                store: IncidentStore::new(),
                stats: StatsAggregator::new(),
                hotspots: Vec::new(),
            }),
            assigner,
            hub,
            zone_rules,
            location_zones,
            accepting: AtomicBool::new(true),
        }
    }

    pub fn hub(&self) -> &Arc<BroadcastHub> {
        &self.hub
    }

    pub fn units(&self) -> &[Unit] {
        self.assigner.units()
    }

    /// Unit id responsible for an incident type.
    pub fn assign(&self, incident_type: &str) -> String {
        self.assigner.assign(incident_type).to_string()
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::SeqCst)
    }

    /// Stop accepting mutations and wait for in-flight ones to finish.
    pub async fn close(&self) {
        self.accepting.store(false, Ordering::SeqCst);
        let _drain = self.registry.write().await;
        info!("dispatcher closed");
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.registry.read().await.store.contains(id)
    }

    pub async fn stats(&self) -> Stats {
        self.registry.read().await.stats.current()
    }

    /// Register a fully-built incident: insert, count, publish.
    pub async fn create(&self, incident: Incident) -> Result<Incident, DispatchError> {
        let mut reg = self.registry.write().await;
        self.ensure_accepting()?;

        // A centre already inside a raised hotspot does not raise another.
        let zone = zones::hotspot(reg.store.iter(), &incident, &self.zone_rules)
            .filter(|z| !reg.hotspots.iter().any(|h| h.contains(z.centre())));
        reg.store.insert(incident.clone())?;
        reg.stats.on_create(&incident);
        let stats = reg.stats.current();

        info!(
            incident_id = %incident.id,
            kind = %incident.kind,
            severity = %incident.severity,
            unit = %incident.assigned_unit,
            "incident created"
        );

        self.hub.publish(Event::NewIncident(incident.clone()));
        self.hub.publish(Event::StatsUpdate(stats));

        if let Some(zone) = zone {
            warn!(lat = zone.lat, lng = zone.lng, "new risk zone detected");
            reg.hotspots.push(zone.clone());
            self.hub.publish(Event::NewRiskZone(zone));
        }

        Ok(incident)
    }

    /// Validate an SOS report, assign a unit and create the incident.
    pub async fn report_sos(&self, report: SosReport) -> Result<Incident, DispatchError> {
        let location = report
            .location
            .ok_or_else(|| DispatchError::Validation("location is required".to_string()))?;
        if !location.is_valid() {
            return Err(DispatchError::Validation(format!(
                "location out of range: ({}, {})",
                location.lat, location.lng
            )));
        }

        let kind = report
            .kind
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .unwrap_or_else(|| SOS_DEFAULT_TYPE.to_string());
        let description = report
            .description
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| SOS_DEFAULT_DESCRIPTION.to_string());
        let severity = report.severity.unwrap_or(Severity::Critical);
        let now = Utc::now();
        let unit = self.assign(&kind);

        let incident = Incident {
            id: sos_id(now),
            kind,
            description,
            location,
            severity,
            timestamp: now,
            ai_recommendation: format!("DISPATCH {} IMMEDIATELY", unit.to_uppercase()),
            assigned_unit: unit,
            is_critical: severity.is_critical(),
        };

        self.create(incident).await
    }

    /// Remove an incident and publish its resolution.
    pub async fn resolve(&self, id: &str) -> Result<Incident, DispatchError> {
        let mut reg = self.registry.write().await;
        self.ensure_accepting()?;

        let incident = reg.store.remove(id).map_err(|e| {
            debug!(incident_id = %id, "resolve of unknown incident");
            e
        })?;
        reg.stats.on_resolve(&incident);
        let stats = reg.stats.current();

        let Registry {
            store, hotspots, ..
        } = &mut *reg;
        let mut cleared = Vec::new();
        hotspots.retain(|zone| {
            let holds = zones::hotspot_holds(zone, store.iter(), &self.zone_rules);
            if !holds {
                cleared.push(zone.clone());
            }
            holds
        });

        info!(incident_id = %id, "incident resolved");
        self.hub.publish(Event::IncidentResolved(incident.id.clone()));
        self.hub.publish(Event::StatsUpdate(stats));
        for zone in cleared {
            info!(lat = zone.lat, lng = zone.lng, "risk zone cleared");
            self.hub.publish(Event::RiskZoneCleared(zone));
        }

        Ok(incident)
    }

    /// Change an incident's severity. A change of critical flag also
    /// republishes stats.
    pub async fn update_threat(
        &self,
        id: &str,
        severity: Severity,
    ) -> Result<Incident, DispatchError> {
        let mut reg = self.registry.write().await;
        self.ensure_accepting()?;

        let was_critical = reg
            .store
            .get(id)
            .map(|i| i.is_critical)
            .ok_or_else(|| DispatchError::NotFound(id.to_string()))?;
        let updated = reg.store.update_severity(id, severity)?;
        reg.stats.on_severity_change(was_critical, updated.is_critical);

        info!(incident_id = %id, severity = %severity, "threat level changed");
        self.hub.publish(Event::IncidentUpdate(updated.clone()));
        if was_critical != updated.is_critical {
            self.hub.publish(Event::StatsUpdate(reg.stats.current()));
        }

        Ok(updated)
    }

    /// Snapshot of incidents, stats, units and risk zones.
    pub async fn list_all(&self) -> Overview {
        let reg = self.registry.read().await;
        let mut risk_zones = self.location_zones.clone();
        risk_zones.extend(reg.hotspots.iter().cloned());

        Overview {
            reports: reg.store.snapshot(),
            stats: reg.stats.current(),
            units: self.assigner.units().to_vec(),
            risk_zones,
        }
    }

    fn ensure_accepting(&self) -> Result<(), DispatchError> {
        if self.is_accepting() {
            Ok(())
        } else {
            Err(DispatchError::ShuttingDown)
        }
    }
}

fn sos_id(now: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("sos-{}-{}", now.timestamp_millis(), &suffix[..8])
}
