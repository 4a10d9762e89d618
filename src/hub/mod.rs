//! BroadcastHub -- fire-and-forget fan-out of dispatch events.
//!
//! Each subscriber gets a bounded queue. Publishing never waits on a
//! subscriber: a full queue drops the event for that subscriber only, and a
//! closed queue unregisters it. There is no replay; late joiners resync
//! through the reports query.
//!
//! None of the hub's methods suspend. The dispatcher publishes while holding
//! its registry lock, so a publish must finish in the same poll that started
//! it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::dispatch::zones::RiskZone;
use crate::dispatch::{Incident, Stats};

/// Outbound event catalog.
///
/// Serializes as `{"event": "<name>", "data": <payload>}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum Event {
    NewIncident(Incident),
    StatsUpdate(Stats),
    IncidentResolved(String),
    IncidentUpdate(Incident),
    NewRiskZone(RiskZone),
    RiskZoneCleared(RiskZone),
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::NewIncident(_) => "new-incident",
            Event::StatsUpdate(_) => "stats-update",
            Event::IncidentResolved(_) => "incident-resolved",
            Event::IncidentUpdate(_) => "incident-update",
            Event::NewRiskZone(_) => "new-risk-zone",
            Event::RiskZoneCleared(_) => "risk-zone-cleared",
        }
    }
}

/// Receiving end handed to a subscriber.
pub struct Subscription {
    pub id: Uuid,
    pub rx: mpsc::Receiver<Arc<Event>>,
}

type SubscriberMap = HashMap<Uuid, mpsc::Sender<Arc<Event>>>;

pub struct BroadcastHub {
    subscribers: RwLock<SubscriberMap>,
    buffer: usize,
    dropped: AtomicU64,
}

impl BroadcastHub {
    /// `buffer` is the per-subscriber queue depth.
    pub fn new(buffer: usize) -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            buffer: buffer.max(1),
            dropped: AtomicU64::new(0),
        }
    }

    // Every write is a single insert or remove; a poisoned map is still whole.
    fn read(&self) -> RwLockReadGuard<'_, SubscriberMap> {
        self.subscribers.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, SubscriberMap> {
        self.subscribers.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn subscribe(&self) -> Subscription {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(self.buffer);
        self.write().insert(id, tx);
        info!(subscriber_id = %id, "subscriber connected");
        Subscription { id, rx }
    }

    pub fn unsubscribe(&self, id: &Uuid) {
        if self.write().remove(id).is_some() {
            info!(subscriber_id = %id, "subscriber disconnected");
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.read().len()
    }

    /// Total events dropped because a subscriber queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Deliver `event` to every subscriber registered at the time of the call.
    /// Returns the number of subscribers the event was queued for.
    pub fn publish(&self, event: Event) -> usize {
        let name = event.name();
        let event = Arc::new(event);
        let mut delivered = 0;
        let mut closed = Vec::new();

        {
            let subscribers = self.read();
            for (id, tx) in subscribers.iter() {
                match tx.try_send(Arc::clone(&event)) {
                    Ok(()) => delivered += 1,
                    Err(TrySendError::Full(_)) => {
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                        warn!(subscriber_id = %id, event = name, "subscriber queue full, event dropped");
                    }
                    Err(TrySendError::Closed(_)) => closed.push(*id),
                }
            }
        }

        if !closed.is_empty() {
            let mut subscribers = self.write();
            for id in &closed {
                subscribers.remove(id);
                debug!(subscriber_id = %id, "pruned closed subscriber");
            }
        }

        debug!(event = name, delivered, "event published");
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_reaches_all_subscribers() {
        let hub = BroadcastHub::new(8);
        let mut a = hub.subscribe();
        let mut b = hub.subscribe();

        let n = hub.publish(Event::IncidentResolved("x".to_string()));
        assert_eq!(n, 2);
        assert_eq!(*a.rx.try_recv().unwrap(), Event::IncidentResolved("x".to_string()));
        assert_eq!(*b.rx.try_recv().unwrap(), Event::IncidentResolved("x".to_string()));
    }

    #[test]
    fn test_late_subscriber_gets_no_replay() {
        let hub = BroadcastHub::new(8);
        hub.publish(Event::StatsUpdate(Stats::default()));

        let mut late = hub.subscribe();
        assert!(late.rx.try_recv().is_err());
    }

    #[test]
    fn test_full_queue_drops_without_blocking() {
        let hub = BroadcastHub::new(1);
        let mut slow = hub.subscribe();

        assert_eq!(hub.publish(Event::IncidentResolved("1".into())), 1);
        assert_eq!(hub.publish(Event::IncidentResolved("2".into())), 0);
        assert_eq!(hub.dropped(), 1);

        assert_eq!(*slow.rx.try_recv().unwrap(), Event::IncidentResolved("1".into()));
        assert!(slow.rx.try_recv().is_err());
    }

    #[test]
    fn test_closed_subscriber_is_pruned() {
        let hub = BroadcastHub::new(4);
        let sub = hub.subscribe();
        drop(sub);

        assert_eq!(hub.publish(Event::StatsUpdate(Stats::default())), 0);
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[test]
    fn test_event_wire_format() {
        let json = serde_json::to_value(Event::IncidentResolved("pred-Salem-1".into())).unwrap();
        assert_eq!(json["event"], "incident-resolved");
        assert_eq!(json["data"], "pred-Salem-1");

        let json = serde_json::to_value(Event::StatsUpdate(Stats::default())).unwrap();
        assert_eq!(json["event"], "stats-update");
        assert_eq!(json["data"]["total"], 0);
    }
}
