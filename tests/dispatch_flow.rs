//! End-to-end dispatch scenarios: detection, concurrent ingest, resolve and
//! severity changes, observed through a live hub subscription.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use crisisctrl::config::DispatchConfig;
use crisisctrl::detect::{DetectionLoop, SignalProvider, WeatherSample};
use crisisctrl::dispatch::engine::SosReport;
use crisisctrl::dispatch::{Coordinates, DispatchError, MonitoredLocation, Severity, Stats};
use crisisctrl::hub::{Event, Subscription};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio_test::{assert_err, assert_ok};

struct StaticWeather(WeatherSample);

#[async_trait]
impl SignalProvider for StaticWeather {
    async fn sample(&self, _: &MonitoredLocation) -> Result<WeatherSample, DispatchError> {
        Ok(self.0)
    }
}

fn drain(sub: &mut Subscription) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(ev) = sub.rx.try_recv() {
        events.push((*ev).clone());
    }
    events
}

fn sos_at(lat: f64, lng: f64) -> SosReport {
    SosReport {
        location: Some(Coordinates::new(lat, lng)),
        ..Default::default()
    }
}

#[tokio::test]
async fn chennai_cyclone_end_to_end() {
    let cfg = DispatchConfig::default();
    let dispatcher = crisisctrl::build_dispatcher(&cfg);
    let mut sub = dispatcher.hub().subscribe();

    let chennai = cfg.locations[0].clone();
    assert_eq!(chennai.name, "Chennai");

    // Keep the stochastic rule out of this scenario.
    let mut settings = cfg.detection_settings();
    settings.security_threat_probability = 0.0;
    let mut detection = DetectionLoop::new(
        dispatcher.clone(),
        Arc::new(StaticWeather(WeatherSample {
            wind_speed_ms: 20.0,
            rain_1h_mm: 0.0,
        })),
        vec![chennai.clone()],
        settings,
        StdRng::seed_from_u64(0),
    );

    let created = assert_ok!(detection.step(&chennai, Utc::now()).await);
    assert_eq!(created.len(), 1);
    let incident = &created[0];
    assert_eq!(incident.kind, "Cyclone Warning");
    assert_eq!(incident.severity, Severity::Critical);
    assert_eq!(incident.assigned_unit, "Unit_Bravo");
    assert!(incident.is_critical);

    let stats = dispatcher.stats().await;
    assert_eq!(stats.total, 1);
    assert_eq!(stats.active, 1);

    let events = drain(&mut sub);
    assert_eq!(events.len(), 2);
    assert_eq!(events[0], Event::NewIncident(incident.clone()));
    assert_eq!(
        events[1],
        Event::StatsUpdate(Stats {
            total: 1,
            active: 1,
            resolved: 0,
            critical: 1
        })
    );
}

#[tokio::test]
async fn concurrent_creates_lose_no_updates() {
    let dispatcher = crisisctrl::build_dispatcher(&DispatchConfig::default());
    const N: usize = 64;

    let mut handles = Vec::new();
    for i in 0..N {
        let d = dispatcher.clone();
        // Spread reports out so no hotspot zones form.
        let lat = -60.0 + i as f64;
        handles.push(tokio::spawn(async move { d.report_sos(sos_at(lat, 10.0)).await }));
    }
    for h in handles {
        assert_ok!(h.await.unwrap());
    }

    let overview = dispatcher.list_all().await;
    assert_eq!(overview.reports.len(), N);
    assert_eq!(overview.stats.total, N as u64);
    assert_eq!(overview.stats.active, N as u64);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn aborted_reports_never_desync_subscribers() {
    let mut cfg = DispatchConfig::default();
    cfg.broadcast.subscriber_buffer = 1024;
    let dispatcher = crisisctrl::build_dispatcher(&cfg);
    let mut sub = dispatcher.hub().subscribe();

    let mut handles = Vec::new();
    for i in 0..200 {
        let d = dispatcher.clone();
        let lat = -80.0 + (i % 160) as f64;
        let lng = -170.0 + (i / 160) as f64 * 10.0;
        handles.push(tokio::spawn(async move { d.report_sos(sos_at(lat, lng)).await }));
    }
    // Abort every other task wherever it happens to be.
    for (i, h) in handles.iter().enumerate() {
        if i % 2 == 0 {
            h.abort();
        }
        if i % 16 == 0 {
            tokio::task::yield_now().await;
        }
    }
    for h in handles {
        let _ = h.await;
    }

    let overview = dispatcher.list_all().await;
    let announced = drain(&mut sub)
        .into_iter()
        .filter(|e| matches!(e, Event::NewIncident(_)))
        .count();
    assert!(overview.reports.len() >= 100);
    assert_eq!(overview.reports.len(), announced);
    assert_eq!(overview.stats.total as usize, announced);
}

#[tokio::test]
async fn concurrent_reads_match_stats() {
    let dispatcher = crisisctrl::build_dispatcher(&DispatchConfig::default());

    let writer = {
        let d = dispatcher.clone();
        tokio::spawn(async move {
            for i in 0..40 {
                let incident = d.report_sos(sos_at(-50.0 + i as f64, 20.0)).await.unwrap();
                if i % 3 == 0 {
                    d.resolve(&incident.id).await.unwrap();
                }
            }
        })
    };

    for _ in 0..200 {
        let overview = dispatcher.list_all().await;
        assert_eq!(overview.stats.active as usize, overview.reports.len());
        assert_eq!(
            overview.stats.active,
            overview.stats.total - overview.stats.resolved
        );
        tokio::task::yield_now().await;
    }
    writer.await.unwrap();
}

#[tokio::test]
async fn double_resolve_counts_once() {
    let dispatcher = crisisctrl::build_dispatcher(&DispatchConfig::default());
    let incident = dispatcher.report_sos(sos_at(13.0, 80.0)).await.unwrap();
    let mut sub = dispatcher.hub().subscribe();

    assert_ok!(dispatcher.resolve(&incident.id).await);
    let err = assert_err!(dispatcher.resolve(&incident.id).await);
    assert_eq!(err, DispatchError::NotFound(incident.id.clone()));

    let stats = dispatcher.stats().await;
    assert_eq!(stats.resolved, 1);
    assert_eq!(stats.active, 0);
    assert_eq!(stats.critical, 0);

    let resolved: Vec<_> = drain(&mut sub)
        .into_iter()
        .filter(|e| matches!(e, Event::IncidentResolved(_)))
        .collect();
    assert_eq!(resolved, vec![Event::IncidentResolved(incident.id)]);
}

#[tokio::test]
async fn severity_round_trip() {
    let dispatcher = crisisctrl::build_dispatcher(&DispatchConfig::default());
    let mut report = sos_at(13.0, 80.0);
    report.severity = Some(Severity::Medium);
    let incident = dispatcher.report_sos(report).await.unwrap();
    assert_eq!(dispatcher.stats().await.critical, 0);

    let up = dispatcher.update_threat(&incident.id, Severity::High).await.unwrap();
    assert!(up.is_critical);
    assert_eq!(dispatcher.stats().await.critical, 1);

    let mut sub = dispatcher.hub().subscribe();
    let down = dispatcher.update_threat(&incident.id, Severity::Low).await.unwrap();
    assert!(!down.is_critical);
    assert_eq!(dispatcher.stats().await.critical, 0);

    let events = drain(&mut sub);
    assert_eq!(events[0], Event::IncidentUpdate(down));
    assert!(matches!(events[1], Event::StatsUpdate(Stats { critical: 0, .. })));

    // Resolving the now non-critical incident leaves critical at zero.
    dispatcher.resolve(&incident.id).await.unwrap();
    assert_eq!(dispatcher.stats().await.critical, 0);
}

#[tokio::test]
async fn detection_loop_sweeps_all_locations_until_cancelled() {
    let mut cfg = DispatchConfig::default();
    cfg.detection.security_threat_probability = 0.0;
    let dispatcher = crisisctrl::build_dispatcher(&cfg);

    let mut settings = cfg.detection_settings();
    settings.step_interval = Duration::from_millis(1);
    settings.sweep_interval = Duration::from_secs(3600);

    let detection = DetectionLoop::new(
        dispatcher.clone(),
        Arc::new(StaticWeather(WeatherSample {
            wind_speed_ms: 0.0,
            rain_1h_mm: 80.0,
        })),
        cfg.locations.clone(),
        settings,
        StdRng::seed_from_u64(3),
    );
    let cancel = tokio_util::sync::CancellationToken::new();
    let handle = tokio::spawn(detection.run(cancel.clone()));

    tokio::time::timeout(Duration::from_secs(5), async {
        while dispatcher.stats().await.total < cfg.locations.len() as u64 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("sweep did not cover every location");

    cancel.cancel();
    handle.await.unwrap();

    let overview = dispatcher.list_all().await;
    assert!(overview.reports.iter().all(|i| i.kind == "Flash Flood Alert"));
    assert!(overview.reports.iter().all(|i| i.assigned_unit == "Unit_Bravo"));
    // Newest first: the last location polled is at the head.
    assert!(overview.reports[0].id.starts_with("pred-Tirunelveli-"));
}
