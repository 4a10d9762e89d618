//! CrisisCtrl -- real-time emergency incident dispatch engine.
//!
//! This crate provides the incident registry, unit assignment, the periodic
//! detection loop over monitored locations, and the broadcast fan-out that
//! keeps live subscribers in step with registry state.

pub mod api;
pub mod config;
pub mod detect;
pub mod dispatch;
pub mod hub;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::api::state::AppState;
use crate::config::DispatchConfig;
use crate::detect::{DetectionLoop, OpenWeatherProvider};
use crate::dispatch::zones::location_zones;
use crate::dispatch::Dispatcher;
use crate::hub::BroadcastHub;

/// Build a dispatcher and its hub from configuration.
pub fn build_dispatcher(config: &DispatchConfig) -> Arc<Dispatcher> {
    let hub = Arc::new(BroadcastHub::new(config.broadcast.subscriber_buffer));
    Arc::new(Dispatcher::new(
        config.assigner(),
        hub,
        config.zone_rules(),
        location_zones(&config.locations, config.zones.location_radius_m),
    ))
}

/// Start the daemon: detection loop and API server. Returns after Ctrl-C
/// once in-flight mutations have completed.
pub async fn serve(config: DispatchConfig) -> Result<()> {
    config.validate().context("invalid configuration")?;

    let dispatcher = build_dispatcher(&config);
    let shutdown = CancellationToken::new();

    // 1. Detection loop (background task)
    let detection = if config.detection.enabled {
        let settings = config.detection_settings();
        let provider = OpenWeatherProvider::new(&config.provider, settings.provider_timeout)
            .context("failed to build weather provider client")?;
        let rng = match config.detection.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let detection = DetectionLoop::new(
            dispatcher.clone(),
            Arc::new(provider),
            config.locations.clone(),
            settings,
            rng,
        );
        Some(tokio::spawn(detection.run(shutdown.clone())))
    } else {
        info!("detection loop disabled by configuration");
        None
    };

    // 2. Shutdown trigger
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_token.cancel();
    });

    // 3. API server
    let addr: SocketAddr = config
        .server
        .bind
        .parse()
        .with_context(|| format!("invalid bind address: {}", config.server.bind))?;
    let app = api::router(AppState {
        dispatcher: dispatcher.clone(),
        shutdown: shutdown.clone(),
    });

    info!(%addr, "CrisisCtrl listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    let server_token = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { server_token.cancelled().await })
        .await?;

    // Make sure everything else stops even if the server exited on its own.
    shutdown.cancel();
    dispatcher.close().await;
    if let Some(handle) = detection {
        if let Err(e) = handle.await {
            error!(error = %e, "detection loop task failed");
        }
    }

    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutting down..."),
        Err(e) => {
            error!(error = %e, "failed to listen for ctrl+c");
            std::future::pending::<()>().await;
        }
    }
}
