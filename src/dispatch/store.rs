//! Registry of active incidents, newest first.

use std::collections::VecDeque;

use super::{DispatchError, Incident, Severity};

/// Ordered set of currently active incidents.
///
/// The store is not synchronized on its own; the [`Dispatcher`](super::Dispatcher)
/// owns it behind the lock that serializes every mutation.
#[derive(Debug, Default)]
pub struct IncidentStore {
    incidents: VecDeque<Incident>,
}

impl IncidentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.incidents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.incidents.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.incidents.iter().any(|i| i.id == id)
    }

    pub fn get(&self, id: &str) -> Option<&Incident> {
        self.incidents.iter().find(|i| i.id == id)
    }

    /// Prepend an incident. Fails if the id is already present.
    pub fn insert(&mut self, incident: Incident) -> Result<(), DispatchError> {
        if self.contains(&incident.id) {
            return Err(DispatchError::DuplicateId(incident.id));
        }
        self.incidents.push_front(incident);
        Ok(())
    }

    /// Remove and return the incident with the given id.
    pub fn remove(&mut self, id: &str) -> Result<Incident, DispatchError> {
        let pos = self
            .incidents
            .iter()
            .position(|i| i.id == id)
            .ok_or_else(|| DispatchError::NotFound(id.to_string()))?;
        // position() was just found, so remove() cannot miss
        self.incidents
            .remove(pos)
            .ok_or_else(|| DispatchError::NotFound(id.to_string()))
    }

    /// Set the severity of an incident and recompute its critical flag.
    /// Returns the updated snapshot.
    pub fn update_severity(
        &mut self,
        id: &str,
        severity: Severity,
    ) -> Result<Incident, DispatchError> {
        let incident = self
            .incidents
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or_else(|| DispatchError::NotFound(id.to_string()))?;
        incident.severity = severity;
        incident.is_critical = severity.is_critical();
        Ok(incident.clone())
    }

    /// Copy of the current ordered sequence.
    pub fn snapshot(&self) -> Vec<Incident> {
        self.incidents.iter().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Incident> {
        self.incidents.iter()
    }
}
