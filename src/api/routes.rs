//! API route definitions.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use super::state::AppState;
use super::ws;
use crate::dispatch::engine::{Overview, SosReport};
use crate::dispatch::{DispatchError, Severity};

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/v1/health", get(health))
        .route("/reports", get(list_reports))
        .route("/sos", post(report_sos))
        .route("/incidents/{id}/resolve", post(resolve_incident))
        .route("/incidents/{id}/threat", post(update_threat))
        .route("/ws", get(ws::websocket_handler))
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    let status = if state.dispatcher.is_accepting() {
        "ok"
    } else {
        "shutting_down"
    };
    let subscribers = state.dispatcher.hub().subscriber_count();

    Json(json!({
        "data": {
            "status": status,
            "version": env!("CARGO_PKG_VERSION"),
            "subscribers": subscribers,
        },
        "meta": {
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "version": env!("CARGO_PKG_VERSION")
        }
    }))
}

async fn list_reports(State(state): State<AppState>) -> Json<Overview> {
    Json(state.dispatcher.list_all().await)
}

async fn report_sos(
    State(state): State<AppState>,
    payload: Result<Json<SosReport>, JsonRejection>,
) -> Result<Json<Value>, DispatchError> {
    let Json(report) = payload.map_err(|e| DispatchError::Validation(e.body_text()))?;
    let incident = state.dispatcher.report_sos(report).await?;
    Ok(Json(json!({
        "status": "Alert Received",
        "id": incident.id,
        "assignedUnit": incident.assigned_unit,
    })))
}

async fn resolve_incident(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, DispatchError> {
    let incident = state.dispatcher.resolve(&id).await?;
    Ok(Json(json!({ "status": "resolved", "id": incident.id })))
}

#[derive(Debug, Deserialize)]
struct ThreatBody {
    severity: Severity,
}

async fn update_threat(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<ThreatBody>, JsonRejection>,
) -> Result<Json<Value>, DispatchError> {
    let Json(body) = body.map_err(|e| DispatchError::Validation(e.body_text()))?;
    let incident = state.dispatcher.update_threat(&id, body.severity).await?;
    Ok(Json(json!({ "status": "updated", "incident": incident })))
}
