//! HTTP server for meos-live
//!
//! Thin route layer: the SSE stream plus health/status probes. All
//! competition data consumers go through the state store's read
//! accessors, never through anything here.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::State as AxumState;
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use futures::stream::Stream;
use serde_json::json;

use crate::simulation::SimulationAdapter;
use crate::sse::Hub;
use crate::state::State;

/// Application state shared with the route handlers.
#[derive(Clone)]
pub struct AppState {
    pub state: Arc<State>,
    pub hub: Hub,
    pub simulation: Option<Arc<SimulationAdapter>>,
}

pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/events", get(events))
        .with_state(app_state)
}

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn status(AxumState(app): AxumState<AppState>) -> Json<serde_json::Value> {
    let mut body = json!({
        "service": "meos-live",
        "version": env!("CARGO_PKG_VERSION"),
        "mode": if app.simulation.is_some() { "simulation" } else { "meos" },
        "connected_clients": app.hub.connected_clients(),
        "event": app.state.event().map(|e| e.name),
    });

    if let Some(simulation) = &app.simulation {
        if let Some((phase, next_phase_in)) = simulation.status() {
            body["simulation"] = json!({
                "phase": phase,
                "next_phase_in_seconds": next_phase_in.num_seconds(),
            });
        }
    }

    Json(body)
}

async fn events(
    AxumState(app): AxumState<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    app.hub.handle_sse().await
}
