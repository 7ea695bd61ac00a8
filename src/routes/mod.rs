//! HTTP routes — webhook ingestion and the event status API.

pub mod api;
pub mod webhook;

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use uuid::Uuid;

use crate::config::DispatchConfig;
use crate::store::EventStore;

/// Shared state for route handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn EventStore>,
    pub config: DispatchConfig,
}

/// Build the dispatcher's Axum router.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        // Webhook
        .route("/webhook/github", post(webhook_handler))
        // Event API
        .route("/api/events", get(list_events_handler))
        .route("/api/events/{event_id}", get(get_event_handler))
        .with_state(state)
}

// ── Webhook ──

async fn webhook_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, StatusCode> {
    crate::metrics::webhook_received(
        headers
            .get("x-github-event")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown"),
    );

    webhook::handle_webhook(&state.config, &state.store, &headers, body).await
}

// ── Event API ──

#[derive(serde::Deserialize)]
pub struct ListEventsQuery {
    pub limit: Option<usize>,
}

async fn list_events_handler(
    State(state): State<AppState>,
    Query(query): Query<ListEventsQuery>,
) -> Result<Json<Vec<api::EventJson>>, StatusCode> {
    api::list_events(&state.store, query.limit.unwrap_or(20))
        .await
        .map(Json)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

async fn get_event_handler(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
) -> Result<Json<api::EventJson>, StatusCode> {
    match api::get_event(&state.store, event_id).await {
        Ok(Some(event)) => Ok(Json(event)),
        Ok(None) => Err(StatusCode::NOT_FOUND),
        Err(e) => {
            tracing::error!("Event lookup error: {e}");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
