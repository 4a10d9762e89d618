//! Real-time channel over WebSocket.
//!
//! Outbound frames are hub events (`{"event": .., "data": ..}`). Inbound
//! frames are `resolve-incident` and `update-threat` requests; each one gets
//! an `ack` frame on the same socket saying whether the incident was found.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::state::AppState;
use crate::dispatch::{DispatchError, Dispatcher, Severity};

/// Requests a subscriber may send.
#[derive(Debug, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientRequest {
    ResolveIncident(String),
    UpdateThreat(ThreatUpdate),
}

#[derive(Debug, Deserialize)]
pub struct ThreatUpdate {
    pub id: String,
    pub severity: Severity,
}

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let hub = state.dispatcher.hub().clone();
    let mut subscription = hub.subscribe();
    let subscriber_id = subscription.id;
    let (reply_tx, mut reply_rx) = mpsc::channel::<String>(16);

    let mut send_task = tokio::spawn(async move {
        loop {
            let text = tokio::select! {
                event = subscription.rx.recv() => match event {
                    Some(event) => match serde_json::to_string(&*event) {
                        Ok(text) => text,
                        Err(e) => {
                            warn!(error = %e, "failed to serialize event");
                            continue;
                        }
                    },
                    None => break,
                },
                reply = reply_rx.recv() => match reply {
                    Some(text) => text,
                    None => break,
                },
            };
            if sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
        let _ = sender.send(Message::Close(None)).await;
    });

    let dispatcher = state.dispatcher.clone();
    let shutdown = state.shutdown.clone();
    let mut recv_task = tokio::spawn(async move {
        loop {
            // Shutdown is only observed between frames; a request already
            // read is always applied and acknowledged.
            let result = tokio::select! {
                _ = shutdown.cancelled() => break,
                frame = receiver.next() => match frame {
                    Some(result) => result,
                    None => break,
                },
            };
            match result {
                Ok(Message::Text(text)) => {
                    let reply = handle_client_message(&dispatcher, text.as_str()).await;
                    if reply_tx.send(reply.to_string()).await.is_err() {
                        break;
                    }
                }
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    warn!(subscriber_id = %subscriber_id, error = %e, "websocket error");
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => {
            // The peer is gone; let any request in progress finish.
            if let Err(e) = (&mut recv_task).await {
                warn!(subscriber_id = %subscriber_id, error = %e, "websocket receive task failed");
            }
        }
        _ = &mut recv_task => send_task.abort(),
    }

    hub.unsubscribe(&subscriber_id);
    info!(subscriber_id = %subscriber_id, "websocket session closed");
}

/// Apply one inbound frame and build the reply frame.
pub async fn handle_client_message(dispatcher: &Dispatcher, text: &str) -> Value {
    let request: ClientRequest = match serde_json::from_str(text) {
        Ok(r) => r,
        Err(e) => {
            debug!(error = %e, "unparseable client frame");
            return json!({ "event": "error", "data": { "message": e.to_string() } });
        }
    };

    let (name, id, result) = match request {
        ClientRequest::ResolveIncident(id) => {
            let result = dispatcher.resolve(&id).await;
            ("resolve-incident", id, result)
        }
        ClientRequest::UpdateThreat(update) => {
            let result = dispatcher.update_threat(&update.id, update.severity).await;
            ("update-threat", update.id, result)
        }
    };

    let mut data = json!({ "request": name, "id": id, "found": true });
    match result {
        Ok(_) => {}
        Err(DispatchError::NotFound(_)) => data["found"] = json!(false),
        Err(e) => {
            data["found"] = json!(false);
            data["error"] = json!(e.to_string());
        }
    }
    json!({ "event": "ack", "data": data })
}
