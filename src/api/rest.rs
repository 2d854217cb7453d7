// =============================================================================
// REST API Endpoints — Axum 0.7
// =============================================================================
//
// All endpoints live under `/api/v1/`. `health` is public; everything else
// requires a valid Bearer token via the `AuthBearer` extractor. This is a
// read-only inspection surface (§10.4) — there is no control endpoint here
// that can pause, kill, or reconfigure the pipeline, and no endpoint submits
// an order. Feed a `Trigger` to an `OrderSink` outside this process if you
// want one.
//
// CORS is configured permissively for local development.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{Json, State},
    response::IntoResponse,
    routing::get,
    Router,
};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};

use crate::api::auth::AuthBearer;
use crate::app_state::AppState;

/// Build the full REST API router with CORS middleware and shared state.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // ── Public ──────────────────────────────────────────────────
        .route("/api/v1/health", get(health))
        // ── Authenticated, read-only ─────────────────────────────────
        .route("/api/v1/state", get(full_state))
        .route("/api/v1/regime", get(regime))
        .route("/api/v1/decisions", get(decisions))
        .route("/api/v1/events", get(events))
        .route("/api/v1/errors", get(errors))
        .route("/api/v1/risk", get(risk))
        // ── WebSocket (handled separately in ws module but mounted here) ─
        .route("/api/v1/ws", get(crate::api::ws::ws_handler))
        .layer(cors)
        .with_state(state)
}

// =============================================================================
// Health (public)
// =============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    symbol: String,
    state_version: u64,
    server_time: i64,
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        symbol: state.symbol.clone(),
        state_version: state.current_state_version(),
        server_time: chrono::Utc::now().timestamp_millis(),
    })
}

// =============================================================================
// Full state snapshot (authenticated)
// =============================================================================

async fn full_state(_auth: AuthBearer, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.build_snapshot())
}

// =============================================================================
// Current regime per timeframe (authenticated)
// =============================================================================

async fn regime(_auth: AuthBearer, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let regimes = state.pipeline.read().kalman_states();
    Json(regimes)
}

// =============================================================================
// Recent decisions (authenticated)
// =============================================================================

async fn decisions(_auth: AuthBearer, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let decisions = state.pipeline.read().recent_decisions().to_vec();
    Json(decisions)
}

// =============================================================================
// Recent pipeline events — candle closes, gaps, resets, triggers (authenticated)
// =============================================================================

async fn events(_auth: AuthBearer, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let events: Vec<_> = state.event_log.read().recent().cloned().collect();
    Json(events)
}

// =============================================================================
// Recent rejected-tick / sink errors (authenticated)
// =============================================================================

async fn errors(_auth: AuthBearer, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.recent_errors.read().clone())
}

// =============================================================================
// Risk gate state (authenticated)
// =============================================================================

async fn risk(_auth: AuthBearer, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.risk_gate.get_state())
}
