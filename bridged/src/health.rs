//! Minimal `/healthz` surface (spec §6 lists the full HTTP API as out of
//! scope; a health endpoint is the one piece of it this crate keeps).

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
struct HealthSnapshot {
    authenticated: bool,
    paired_device_count: usize,
    last_poll_at: Option<DateTime<Utc>>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new().route("/healthz", get(healthz)).with_state(state)
}

async fn healthz(State(state): State<AppState>) -> Json<HealthSnapshot> {
    let authenticated = state.auth.has_auth().await;
    let paired_device_count = state.coordinator.device_and_state_snapshot().await.len();
    let last_poll_at = *state.last_poll_at.read().await;
    Json(HealthSnapshot { authenticated, paired_device_count, last_poll_at })
}
