//! Detection loop: sweeps monitored locations, turns provider samples into
//! threats, and registers them through the dispatcher.
//!
//! Detections are deduplicated by id, one per location per second.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::provider::SignalProvider;
use super::rules::{self, Threat};
use crate::dispatch::{DispatchError, Dispatcher, Incident, MonitoredLocation};

/// Timing and probability knobs for the detection loop.
#[derive(Debug, Clone, Copy)]
pub struct DetectionSettings {
    pub sweep_interval: Duration,
    pub step_interval: Duration,
    pub provider_timeout: Duration,
    pub security_threat_probability: f64,
}

/// Periodically polls every monitored location and turns threats into incidents.
pub struct DetectionLoop {
    dispatcher: Arc<Dispatcher>,
    provider: Arc<dyn SignalProvider>,
    locations: Arc<[MonitoredLocation]>,
    settings: DetectionSettings,
    rng: StdRng,
}

/// Dedup id for a detection: one per location per second.
pub fn detection_id(location: &str, now: DateTime<Utc>) -> String {
    format!("pred-{}-{}", location, now.timestamp())
}

impl DetectionLoop {
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        provider: Arc<dyn SignalProvider>,
        locations: Vec<MonitoredLocation>,
        settings: DetectionSettings,
        rng: StdRng,
    ) -> Self {
        Self {
            dispatcher,
            provider,
            locations: locations.into(),
            settings,
            rng,
        }
    }

    /// Run sweeps until `cancel` fires. Cancellation is observed between
    /// steps and during every wait, never in the middle of a mutation.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!(locations = self.locations.len(), "detection loop started");

        loop {
            if !self.sweep(&cancel).await {
                break;
            }
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.settings.sweep_interval) => {}
            }
        }

        info!("detection loop stopped");
    }

    /// One pass over all locations. Returns `false` if cancelled part way.
    pub async fn sweep(&mut self, cancel: &CancellationToken) -> bool {
        let locations = Arc::clone(&self.locations);

        for location in locations.iter() {
            if cancel.is_cancelled() {
                return false;
            }

            match self.step(location, Utc::now()).await {
                Ok(created) if !created.is_empty() => {
                    debug!(location = %location.name, created = created.len(), "step raised incidents");
                }
                Ok(_) => {}
                Err(DispatchError::ShuttingDown) => return false,
                Err(e) => {
                    warn!(location = %location.name, error = %e, "detection step failed");
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => return false,
                _ = tokio::time::sleep(self.settings.step_interval) => {}
            }
        }
        true
    }

    /// Poll one location and create incidents for any new threats.
    pub async fn step(
        &mut self,
        location: &MonitoredLocation,
        now: DateTime<Utc>,
    ) -> Result<Vec<Incident>, DispatchError> {
        let sample = tokio::time::timeout(
            self.settings.provider_timeout,
            self.provider.sample(location),
        )
        .await
        .map_err(|_| {
            DispatchError::ProviderUnavailable(format!(
                "timed out after {:?}",
                self.settings.provider_timeout
            ))
        })??;

        let threats = rules::derive_threats(
            &location.name,
            &sample,
            &mut self.rng,
            self.settings.security_threat_probability,
        );

        let mut created = Vec::new();
        // Weather comes before the security roll and both share the step's id,
        // so when both fire only the weather threat is registered.
        for threat in threats {
            let id = detection_id(&location.name, now);
            if self.dispatcher.contains(&id).await {
                debug!(incident_id = %id, kind = threat.kind, "duplicate detection skipped");
                continue;
            }

            let incident = self.build_incident(id, location, threat, now);
            match self.dispatcher.create(incident).await {
                Ok(incident) => created.push(incident),
                Err(DispatchError::DuplicateId(id)) => {
                    debug!(incident_id = %id, "duplicate detection skipped");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(created)
    }

    fn build_incident(
        &self,
        id: String,
        location: &MonitoredLocation,
        threat: Threat,
        now: DateTime<Utc>,
    ) -> Incident {
        Incident {
            id,
            kind: threat.kind.to_string(),
            ai_recommendation: threat.recommendation().to_string(),
            description: threat.description,
            location: location.coordinates(),
            severity: threat.severity,
            timestamp: now,
            assigned_unit: self.dispatcher.assign(threat.kind),
            is_critical: threat.severity.is_critical(),
        }
    }
}
