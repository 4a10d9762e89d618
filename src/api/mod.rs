//! API layer -- axum routes, handlers, and the real-time channel.

mod routes;
pub mod state;
pub mod ws;

use self::state::AppState;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::dispatch::DispatchError;

/// Build the application router with all API routes.
pub fn router(state: AppState) -> Router {
    Router::new()
        .nest("/api", routes::api_routes())
        .fallback(fallback)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn fallback() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "not found")
}

impl IntoResponse for DispatchError {
    fn into_response(self) -> Response {
        let status = match &self {
            DispatchError::Validation(_) => StatusCode::BAD_REQUEST,
            DispatchError::NotFound(_) => StatusCode::NOT_FOUND,
            DispatchError::DuplicateId(_) => StatusCode::CONFLICT,
            DispatchError::ProviderUnavailable(_) => StatusCode::BAD_GATEWAY,
            DispatchError::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
