//! Operator REST surface (spec §6 "Operator REST").
//!
//! Grounded on the teacher's `http.rs` router shape (axum `Router` built
//! once in `create_router`, `TraceLayer` for request logging, handlers
//! taking `State<AppState>` + `Path`/`Json` extractors) narrowed to the
//! four endpoints this bridge actually exposes.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use crate::metrics;
use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/call", post(place_call))
        .route("/transfer/:session_id", post(transfer))
        .route("/health", get(health))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// `POST /call` body (spec §6).
#[derive(Debug, Deserialize)]
struct CallRequest {
    to_uri: String,
    #[serde(default)]
    #[allow(dead_code)]
    env_info: Option<serde_json::Value>,
    #[serde(default)]
    #[allow(dead_code)]
    communication_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct CallResponse {
    session_id: String,
}

/// `POST /call` — place an outbound call and open a backend session for
/// it. Returns `{session_id}` on 200; the call-confirmed/media-attach
/// handoff to a `CallDialogEngine` happens once the opaque SIP binding
/// reports the call answered (spec §1 Non-goals: SIP stack out of scope).
async fn place_call(
    State(state): State<AppState>,
    Json(request): Json<CallRequest>,
) -> impl IntoResponse {
    if let Err(e) = state.call_placer.make_call(&request.to_uri).await {
        tracing::warn!(to_uri = %request.to_uri, error = %e, "failed to place outbound call");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": e.to_string() })),
        )
            .into_response();
    }

    match state
        .backend
        .open_session(serde_json::json!({ "to_uri": request.to_uri }), Vec::new())
        .await
    {
        Ok(opened) => {
            metrics::record_call_started();
            (StatusCode::OK, Json(CallResponse { session_id: opened.session_id })).into_response()
        }
        Err(e) => {
            tracing::warn!(to_uri = %request.to_uri, error = %e, "failed to open backend session for outbound call");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

/// `POST /transfer/{session_id}` body (spec §6).
#[derive(Debug, Deserialize)]
struct TransferRequest {
    to_uri: String,
    #[serde(default)]
    transfer_delay: Option<u64>,
}

/// `POST /transfer/{session_id}` — 200/400 (call not confirmed)/404 (no
/// such session)/500.
async fn transfer(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<TransferRequest>,
) -> StatusCode {
    let Some(engine) = state.registry.get(&session_id) else {
        return StatusCode::NOT_FOUND;
    };
    match engine.request_transfer(request.to_uri, request.transfer_delay) {
        Ok(()) => StatusCode::OK,
        Err(callbridge_engine::EngineError::CallNotConfirmed) => StatusCode::BAD_REQUEST,
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// `GET /health` — 200 if UP else 503 (spec §6).
async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let active_calls = state.registry.len();
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "UP",
            "active_calls": active_calls,
        })),
    )
}

/// `GET /metrics` — Prometheus exposition (spec §6).
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    metrics::set_active_calls(state.registry.len());
    state.metrics_handle.render()
}
